// ============================================================================
// Workflow Layer
// ============================================================================
//
// One coordinator operation per workflow step. Each runs
// authorize → load → plan → mutate → diff → commit, then notifies.
//
// ============================================================================

pub mod coordinator;

pub use coordinator::{OperationContext, OrderWorkflowCoordinator};
