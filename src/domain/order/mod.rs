// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderStatus, OrderPriority, ItemType)
// - Aggregate (Order with items, services and motor info)
// - Commands (one request type per workflow operation)
// - Errors (OrderError)
// - Status machine (transition table, guards)
//
// ============================================================================

pub mod value_objects;
pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod state_machine;

pub use value_objects::*;
pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use state_machine::*;
