//! Row models for SQLite persistence
//!
//! Timestamps are RFC3339 strings and structured fields are JSON text;
//! conversion to domain types happens at the repository boundary.

pub mod catalogue;
pub mod execution;
pub mod quota;
pub mod session;
pub mod workflow;

pub use catalogue::CatalogueRow;
pub use execution::ExecutionRow;
pub use quota::QuotaRow;
pub use session::{ChatMessageRow, ChatSessionRow};
pub use workflow::WorkflowRow;
