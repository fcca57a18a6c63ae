//! Discovery sources
//!
//! Each source fetches a candidate list from an external service and
//! applies its own quality gate. The pipeline in [`crate::pipeline`]
//! is uniform across sources; only fetching and gating differ.

pub mod arxiv;
pub mod github;
pub mod producthunt;

use async_trait::async_trait;

use crate::catalogue::CandidateTool;
use crate::error::Result;

pub use arxiv::ArxivSource;
pub use github::GithubTrendingSource;
pub use producthunt::ProductHuntSource;

/// A crawlable source of candidate tools
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Source name; becomes `CandidateTool.source`
    fn name(&self) -> &str;

    /// Fetch the current candidate list
    async fn fetch(&self) -> Result<Vec<CandidateTool>>;

    /// Source-specific quality gate
    fn quality_gate(&self, candidate: &CandidateTool) -> bool;
}
