//! Workflow row model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use flowhub_graph::{BilingualText, Graph, TriggerType, VersionSnapshot, Workflow};

use crate::db::error::DatabaseError;

/// A workflow as stored in SQLite
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    /// UUID string
    pub id: String,
    /// Human-stable slug, unique
    pub slug: String,
    /// Display name
    pub name: String,
    /// Bilingual description as JSON, when set
    pub description: Option<String>,
    /// SQLite boolean
    pub is_public: i64,
    /// Owning user id
    pub owner_id: String,
    /// Current version
    pub version: i64,
    /// Graph JSON
    pub graph: String,
    /// Version history JSON array
    pub version_history: String,
    /// manual | scheduled | chat
    pub trigger_type: String,
    /// Completed run counter
    pub run_count: i64,
    /// Star counter
    pub star_count: i64,
    /// Lineage pointer for forks
    pub forked_from: Option<String>,
    /// RFC3339
    pub created_at: String,
    /// RFC3339
    pub updated_at: String,
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl WorkflowRow {
    /// Convert a domain workflow into a row
    pub fn from_domain(workflow: &Workflow) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: workflow.id.to_string(),
            slug: workflow.slug.clone(),
            name: workflow.name.clone(),
            description: workflow
                .description
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            is_public: workflow.is_public as i64,
            owner_id: workflow.owner_id.clone(),
            version: workflow.version as i64,
            graph: serde_json::to_string(&workflow.graph)?,
            version_history: serde_json::to_string(&workflow.version_history)?,
            trigger_type: workflow.trigger_type.as_str().to_string(),
            run_count: workflow.run_count as i64,
            star_count: workflow.star_count as i64,
            forked_from: workflow.forked_from.map(|id| id.to_string()),
            created_at: workflow.created_at.to_rfc3339(),
            updated_at: workflow.updated_at.to_rfc3339(),
        })
    }

    /// Convert the row back into a domain workflow
    pub fn into_domain(self) -> Result<Workflow, DatabaseError> {
        let graph: Graph = serde_json::from_str(&self.graph)?;
        let version_history: Vec<VersionSnapshot> = serde_json::from_str(&self.version_history)?;
        let description: Option<BilingualText> = self
            .description
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let trigger_type = match self.trigger_type.as_str() {
            "scheduled" => TriggerType::Scheduled,
            "chat" => TriggerType::Chat,
            _ => TriggerType::Manual,
        };

        Ok(Workflow {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil()),
            slug: self.slug,
            name: self.name,
            description,
            is_public: self.is_public != 0,
            owner_id: self.owner_id,
            version: self.version as u32,
            graph,
            version_history,
            trigger_type,
            run_count: self.run_count as u64,
            star_count: self.star_count as u64,
            forked_from: self
                .forked_from
                .as_deref()
                .and_then(|s| Uuid::parse_str(s).ok()),
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhub_graph::{Node, NodeKind, OutputFormat};

    #[test]
    fn test_domain_round_trip() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("o", NodeKind::Output { format: OutputFormat::Auto }));
        let mut workflow = Workflow::new("demo", "Demo", "alice", graph);
        workflow.is_public = true;
        workflow.description = Some(BilingualText {
            en: Some("A demo".to_string()),
            zh: Some("演示".to_string()),
        });

        let row = WorkflowRow::from_domain(&workflow).unwrap();
        let back = row.into_domain().unwrap();

        assert_eq!(back.id, workflow.id);
        assert_eq!(back.slug, "demo");
        assert!(back.is_public);
        assert_eq!(back.version, 1);
        assert_eq!(back.description, workflow.description);
        assert_eq!(back.graph, workflow.graph);
    }
}
