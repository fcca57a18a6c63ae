//! Domain services: the logic between repositories and handlers

pub mod chat_service;
pub mod execution_service;
pub mod workflow_service;

pub use chat_service::ChatService;
pub use execution_service::ExecutionService;
pub use workflow_service::{CreateWorkflowSpec, UpdateWorkflowPatch, WorkflowService};
