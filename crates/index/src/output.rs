//! Readers for the graph engine's exported output.
//!
//! The engine writes JSON arrays into `<workspace>/output/`. A missing file
//! means "nothing indexed yet" and reads as empty.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

use crate::workspace::WorkspaceRegistry;

pub const ENTITIES_FILE: &str = "entities.json";
pub const RELATIONSHIPS_FILE: &str = "relationships.json";
pub const COMMUNITY_REPORTS_FILE: &str = "community_reports.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityReport {
    pub community: i64,
    #[serde(default)]
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub rank: f32,
    #[serde(default)]
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: BTreeMap<String, usize>,
    pub edge_types: BTreeMap<String, usize>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphVisualization {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let records: Vec<T> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?;

    Ok(records)
}

/// Read-side view over every group's engine output.
pub struct GraphOutput<'a> {
    registry: &'a WorkspaceRegistry,
}

impl<'a> GraphOutput<'a> {
    pub fn new(registry: &'a WorkspaceRegistry) -> Self {
        Self { registry }
    }

    pub async fn entities(&self, group_id: &str) -> Result<Vec<EntityRecord>> {
        match self.registry.existing(group_id) {
            Some(path) => read_records(&path.join("output").join(ENTITIES_FILE)).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn relationships(&self, group_id: &str) -> Result<Vec<RelationshipRecord>> {
        match self.registry.existing(group_id) {
            Some(path) => read_records(&path.join("output").join(RELATIONSHIPS_FILE)).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn community_reports(&self, group_id: &str) -> Result<Vec<CommunityReport>> {
        match self.registry.existing(group_id) {
            Some(path) => read_records(&path.join("output").join(COMMUNITY_REPORTS_FILE)).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn stats(&self, group_id: &str) -> Result<GraphStats> {
        let entities = self.entities(group_id).await?;
        let relationships = self.relationships(group_id).await?;

        let mut node_types = BTreeMap::new();
        for entity in &entities {
            let entity_type = entity
                .entity_type
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Entity".to_string());
            *node_types.entry(entity_type).or_insert(0) += 1;
        }

        let mut edge_types = BTreeMap::new();
        if !relationships.is_empty() {
            edge_types.insert("RELATIONSHIP".to_string(), relationships.len());
        }

        Ok(GraphStats {
            total_nodes: entities.len(),
            total_edges: relationships.len(),
            node_types,
            edge_types,
            groups: self.registry.groups(),
        })
    }

    pub async fn visualization(&self, group_id: &str, limit: usize) -> Result<GraphVisualization> {
        let nodes = self
            .entities(group_id)
            .await?
            .into_iter()
            .take(limit)
            .map(|e| GraphNode {
                id: e.id,
                name: if e.title.is_empty() { "Unknown".to_string() } else { e.title },
                node_type: e.entity_type.unwrap_or_else(|| "Entity".to_string()),
                properties: BTreeMap::from([("description".to_string(), e.description)]),
            })
            .collect();

        let edges = self
            .relationships(group_id)
            .await?
            .into_iter()
            .take(limit)
            .map(|r| GraphEdge {
                id: r.id,
                source: r.source,
                target: r.target,
                relationship: if r.description.is_empty() {
                    "RELATED".to_string()
                } else {
                    r.description.clone()
                },
                properties: BTreeMap::from([("description".to_string(), r.description)]),
            })
            .collect();

        Ok(GraphVisualization { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded_registry(dir: &Path) -> WorkspaceRegistry {
        let registry = WorkspaceRegistry::open(dir).await.unwrap();
        let path = registry.ensure_layout("demo").await.unwrap();
        let output = path.join("output");

        let entities = json!([
            {"id": "e1", "title": "GraphRAG", "type": "TECHNOLOGY", "description": "retrieval"},
            {"id": "e2", "title": "Neo4j", "type": "TECHNOLOGY", "description": "graph db"},
            {"id": "e3", "title": "Microsoft", "type": "ORGANIZATION", "description": ""}
        ]);
        let relationships = json!([
            {"id": "r1", "source": "e1", "target": "e3", "description": "developed by"},
            {"id": "r2", "source": "e1", "target": "e2", "description": ""}
        ]);
        std::fs::write(output.join(ENTITIES_FILE), entities.to_string()).unwrap();
        std::fs::write(output.join(RELATIONSHIPS_FILE), relationships.to_string()).unwrap();

        registry
    }

    #[tokio::test]
    async fn test_stats_counts_types() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path()).await;

        let stats = GraphOutput::new(&registry).stats("demo").await.unwrap();

        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.node_types.get("TECHNOLOGY"), Some(&2));
        assert_eq!(stats.edge_types.get("RELATIONSHIP"), Some(&2));
        assert_eq!(stats.groups, vec!["demo".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_group_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path()).await;
        let output = GraphOutput::new(&registry);

        let stats = output.stats("missing").await.unwrap();
        assert_eq!(stats.total_nodes, 0);
        assert!(output.community_reports("missing").await.unwrap().is_empty());
        assert!(!registry.contains("missing"));
    }

    #[tokio::test]
    async fn test_visualization_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path()).await;

        let viz = GraphOutput::new(&registry).visualization("demo", 1).await.unwrap();

        assert_eq!(viz.nodes.len(), 1);
        assert_eq!(viz.nodes[0].name, "GraphRAG");
        assert_eq!(viz.edges.len(), 1);
        assert_eq!(viz.edges[0].relationship, "developed by");
    }

    #[tokio::test]
    async fn test_malformed_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = seeded_registry(dir.path()).await;
        let path = registry.workspace("demo").unwrap();
        std::fs::write(path.join("output").join(ENTITIES_FILE), "{not json").unwrap();

        assert!(GraphOutput::new(&registry).stats("demo").await.is_err());
    }
}
