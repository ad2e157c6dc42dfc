//! Pipeline catalog interface
//!
//! Consumed collaborator: the catalog only populates pipeline choice and
//! has no streaming dependency.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One selectable backend pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineInfo {
    pub id: String,
    pub name: String,
}

/// Source of the available pipelines
#[async_trait::async_trait]
pub trait PipelineCatalog: Send + Sync {
    async fn list_pipelines(&self) -> Result<Vec<PipelineInfo>>;
}

/// Fixed catalog for demos and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pipelines: Vec<PipelineInfo>,
}

impl StaticCatalog {
    pub fn new(pipelines: Vec<PipelineInfo>) -> Self {
        Self { pipelines }
    }

    /// Convenience constructor from `(id, name)` pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(id, name)| PipelineInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl PipelineCatalog for StaticCatalog {
    async fn list_pipelines(&self) -> Result<Vec<PipelineInfo>> {
        Ok(self.pipelines.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_catalog_lists_in_order() {
        let catalog = StaticCatalog::from_pairs(&[
            ("yolo-v8", "Object detection"),
            ("pose", "Pose estimation"),
        ]);
        let pipelines = catalog.list_pipelines().await.unwrap();
        assert_eq!(pipelines.len(), 2);
        assert_eq!(pipelines[0].id, "yolo-v8");
        assert_eq!(pipelines[1].name, "Pose estimation");
    }
}
