//! Automation task fabric
//!
//! Periodic jobs that discover candidate tools from external sources,
//! enrich them through the LLM, persist catalogue records and chain a
//! search-index sync. Tasks are named handlers resolved from a
//! [`registry::TaskRegistry`], routed to logical queues (`crawlers`,
//! `enrichment`, `indexing`), leased by worker pools with bounded
//! retries, and dead-lettered when exhausted.

pub mod catalogue;
pub mod enrich;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod sources;
pub mod task;
pub mod worker;

pub use catalogue::{CandidateTool, CatalogueRecord, CatalogueStore, InMemoryCatalogueStore};
pub use enrich::EnrichmentHandler;
pub use error::{Result, TaskError};
pub use index::IndexSyncHandler;
pub use pipeline::{DiscoveryHandler, ENRICH_KIND, INDEX_KIND};
pub use queue::{Broker, InMemoryBroker, LeasedTask};
pub use registry::TaskRegistry;
pub use scheduler::{PeriodicScheduler, ScheduleEntry};
pub use sources::{ArxivSource, DiscoverySource, GithubTrendingSource, ProductHuntSource};
pub use task::{queues, TaskContext, TaskHandler, TaskSpec};
pub use worker::{RetryPolicy, WorkerPool};
