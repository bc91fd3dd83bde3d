use chaincore::{Operation, OperationMetadata};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry shared between the runtime and the extension lifecycle that fills it.
pub type SharedRegistry = Arc<RwLock<OperationRegistry>>;

/// Registry of available operation types
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register an operation under its own type identifier
    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        let operation_type = operation.operation_type().to_string();
        self.register_as(operation_type, operation);
    }

    /// Register an operation under an explicit type identifier, replacing any previous one
    pub fn register_as(&mut self, operation_type: impl Into<String>, operation: Arc<dyn Operation>) {
        let operation_type = operation_type.into();
        tracing::info!("Registering operation type: {}", operation_type);
        self.operations.insert(operation_type, operation);
    }

    /// Drop every registered operation (before re-registering on reload)
    pub fn clear(&mut self) {
        tracing::debug!("Clearing {} operation types", self.operations.len());
        self.operations.clear();
    }

    pub fn get(&self, operation_type: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(operation_type).cloned()
    }

    pub fn contains(&self, operation_type: &str) -> bool {
        self.operations.contains_key(operation_type)
    }

    /// Get all registered operation types, sorted
    pub fn list_operation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.operations.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, operation_type: &str) -> Option<OperationMetadata> {
        self.operations.get(operation_type).map(|op| op.metadata())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
