// ============================================================================
// Service Orders
// ============================================================================
//
// Repair order lifecycle with a typed, field-level audit trail.
//
// - domain: order aggregate, commands, status machine
// - audit: field codecs, change recorder, history rendering
// - store: atomic order + history persistence (memory, PostgreSQL)
// - collaborators: authorization, catalog, notifications, attachments
// - workflow: the coordinator tying them together
//
// ============================================================================

pub mod audit;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod store;
pub mod utils;
pub mod workflow;
