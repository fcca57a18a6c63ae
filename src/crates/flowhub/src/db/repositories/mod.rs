//! Repositories: typed database operations per aggregate

pub mod catalogue_repo;
pub mod checkpoint_repo;
pub mod execution_repo;
pub mod quota_repo;
pub mod session_repo;
pub mod workflow_repo;

pub use catalogue_repo::SqliteCatalogueStore;
pub use checkpoint_repo::SqliteCheckpointStore;
pub use execution_repo::ExecutionRepository;
pub use quota_repo::QuotaRepository;
pub use session_repo::SessionRepository;
pub use workflow_repo::{ListScope, WorkflowRepository};
