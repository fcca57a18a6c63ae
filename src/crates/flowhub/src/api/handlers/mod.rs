//! Endpoint handlers

pub mod chat;
pub mod executions;
pub mod health;
pub mod usage;
pub mod workflows;

pub use chat::{chat_turn, clear_messages, list_messages};
pub use executions::{cancel_execution, get_execution, list_executions, run_execution};
pub use health::{health, system_info};
pub use usage::my_usage;
pub use workflows::{
    compare_versions, create_workflow, delete_workflow, fork_workflow, get_workflow,
    list_workflow_executions, list_workflows, list_versions, revert_workflow, update_workflow,
};
