// crates/chainruntime/src/loader.rs
use async_trait::async_trait;
use chaincore::{FlowError, FlowRecord, FlowStatus};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Supplies the active flows on load and reload.
#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn active_flows(&self) -> Result<Vec<FlowRecord>, FlowError>;
}

/// Fixed, in-memory set of flows.
#[derive(Debug, Clone, Default)]
pub struct StaticFlowSource {
    flows: Vec<FlowRecord>,
}

impl StaticFlowSource {
    pub fn new(flows: Vec<FlowRecord>) -> Self {
        Self { flows }
    }
}

#[async_trait]
impl FlowSource for StaticFlowSource {
    async fn active_flows(&self) -> Result<Vec<FlowRecord>, FlowError> {
        Ok(only_active(self.flows.clone()))
    }
}

/// Flows read from a JSON file, or from every `*.json` file of a directory.
/// Each file holds a single flow or an array of flows.
#[derive(Debug, Clone)]
pub struct JsonFlowSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlowFile {
    Many(Vec<FlowRecord>),
    One(Box<FlowRecord>),
}

impl JsonFlowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(path: &Path) -> Result<Vec<FlowRecord>, FlowError> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(match serde_json::from_str::<FlowFile>(&text)? {
            FlowFile::Many(flows) => flows,
            FlowFile::One(flow) => vec![*flow],
        })
    }
}

#[async_trait]
impl FlowSource for JsonFlowSource {
    async fn active_flows(&self) -> Result<Vec<FlowRecord>, FlowError> {
        if !tokio::fs::metadata(&self.path).await?.is_dir() {
            return Ok(only_active(Self::read_file(&self.path).await?));
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension() == Some("json".as_ref()) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut flows = Vec::new();
        for path in paths {
            tracing::debug!("Reading flows from {}", path.display());
            flows.extend(Self::read_file(&path).await?);
        }
        Ok(only_active(flows))
    }
}

fn only_active(flows: Vec<FlowRecord>) -> Vec<FlowRecord> {
    flows
        .into_iter()
        .filter(|flow| flow.status == FlowStatus::Active)
        .collect()
}
