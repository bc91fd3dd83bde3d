use chaincore::{Edge, Flow, FlowError, FlowRecord, OperationId, OperationNode, OperationRecord};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::sync::Arc;

/// Turn a flow's flat operation list into a tree rooted at its root operation.
///
/// Every successor reference must point at an operation of the same flow and
/// the operations must not form a cycle; both are checked up front, for all
/// records, before anything is built. A missing root yields a flow that does
/// nothing.
pub fn materialize(record: &FlowRecord) -> Result<Flow, FlowError> {
    let graph = build_graph(record)?;
    let order = toposort(&graph, None).map_err(|_| FlowError::CyclicFlow { flow: record.id })?;

    // Successors sort after their predecessors, so build from the back.
    let mut built: HashMap<OperationId, Arc<OperationNode>> = HashMap::with_capacity(order.len());
    for idx in order.into_iter().rev() {
        let operation = graph[idx];
        let node = OperationNode {
            key: operation.context_key(),
            operation_type: operation.operation_type.clone(),
            options: operation.options.clone(),
            resolve: operation.resolve.and_then(|id| built.get(&id).cloned()),
            reject: operation.reject.and_then(|id| built.get(&id).cloned()),
        };
        built.insert(operation.id, Arc::new(node));
    }

    let root = record.operation.and_then(|id| built.get(&id).cloned());
    if let (Some(id), None) = (record.operation, &root) {
        tracing::warn!("Flow {}: root operation {} not found, flow does nothing", record.id, id);
    }

    Ok(Flow {
        id: record.id,
        name: record.name.clone(),
        trigger: record.trigger,
        options: record.options.clone(),
        root,
    })
}

/// Dependency graph over the flow's operations, one edge per successor reference.
fn build_graph(record: &FlowRecord) -> Result<DiGraph<&OperationRecord, Edge>, FlowError> {
    let mut graph = DiGraph::new();
    let mut index = HashMap::with_capacity(record.operations.len());

    for operation in &record.operations {
        let idx = graph.add_node(operation);
        if index.insert(operation.id, idx).is_some() {
            return Err(FlowError::InvalidFlow(format!(
                "flow {} lists operation {} more than once",
                record.id, operation.id
            )));
        }
    }

    for operation in &record.operations {
        let from = index[&operation.id];
        for edge in Edge::ALL {
            let Some(next) = operation.successor(edge) else {
                continue;
            };
            let to = index.get(&next).ok_or(FlowError::MissingSuccessor {
                flow: record.id,
                operation: operation.id,
                edge,
                missing: next,
            })?;
            graph.add_edge(from, *to, edge);
        }
    }

    Ok(graph)
}
