//! Workflow aggregate with immutable version history
//!
//! Every edit appends a snapshot of the pre-edit graph to the history
//! and bumps `version` by one, so `version == 1 + history.len()` holds
//! at all times. Revert is non-destructive: it records the current
//! state as one more snapshot and installs the target graph at a new
//! version number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::Graph;

/// How a workflow's executions are initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Scheduled,
    Chat,
}

impl TriggerType {
    /// String form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Chat => "chat",
        }
    }
}

/// Name/description pair in the two catalogue languages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BilingualText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<String>,
}

/// Immutable record of a workflow's graph at a past version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// The version number this snapshot preserves
    pub version: u32,
    /// When the snapshot was recorded
    pub timestamp: DateTime<Utc>,
    /// User who made the edit that displaced this version
    pub author_id: String,
    /// Optional edit notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// The graph as of this version
    pub graph: Graph,
}

/// A named, versioned workflow a user composed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Stable identifier
    pub id: Uuid,
    /// Human-stable slug
    pub slug: String,
    /// Display name
    pub name: String,
    /// Optional bilingual description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<BilingualText>,
    /// Whether non-owners may read and run this workflow
    pub is_public: bool,
    /// Owning user id
    pub owner_id: String,
    /// Current version, monotonic from 1
    pub version: u32,
    /// The current graph
    pub graph: Graph,
    /// Snapshots of displaced versions, oldest first
    #[serde(default)]
    pub version_history: Vec<VersionSnapshot>,
    /// How executions are initiated
    #[serde(default)]
    pub trigger_type: TriggerType,
    /// Completed run counter
    #[serde(default)]
    pub run_count: u64,
    /// Star counter
    #[serde(default)]
    pub star_count: u64,
    /// Lineage pointer when this workflow was forked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow at version 1 with an empty history
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
        graph: Graph,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            description: None,
            is_public: false,
            owner_id: owner_id.into(),
            version: 1,
            graph,
            version_history: Vec::new(),
            trigger_type: TriggerType::Manual,
            run_count: 0,
            star_count: 0,
            forked_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `version == 1 + history.len()` must hold at all times
    pub fn check_version_invariant(&self) -> bool {
        self.version as usize == 1 + self.version_history.len()
    }

    /// Find the snapshot recorded for a past version, or the current
    /// graph when `version` is the live one
    pub fn graph_at(&self, version: u32) -> Result<&Graph> {
        if version == self.version {
            return Ok(&self.graph);
        }
        self.version_history
            .iter()
            .find(|s| s.version == version)
            .map(|s| &s.graph)
            .ok_or_else(|| GraphError::UnknownVersion {
                workflow_id: self.id.to_string(),
                version,
            })
    }

    /// Replace the current graph, pushing the displaced graph into
    /// history and bumping the version
    pub fn apply_edit(
        &mut self,
        graph: Graph,
        author_id: impl Into<String>,
        notes: Option<String>,
    ) {
        self.version_history.push(VersionSnapshot {
            version: self.version,
            timestamp: Utc::now(),
            author_id: author_id.into(),
            notes,
            graph: std::mem::take(&mut self.graph),
        });
        self.graph = graph;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Non-destructive revert: install the graph of `target_version` as
    /// a new version, recording the displaced current state in history
    pub fn revert_to(
        &mut self,
        target_version: u32,
        author_id: impl Into<String>,
    ) -> Result<()> {
        let target_graph = self.graph_at(target_version)?.clone();
        self.apply_edit(
            target_graph,
            author_id,
            Some(format!("revert to version {}", target_version)),
        );
        Ok(())
    }
}
