// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Repair orders and the rules that govern how they move through intake,
// budgeting, approval, execution and delivery. Persistence and outside
// collaborators are reached only through the ports in `store` and
// `collaborators`.
//
// ============================================================================

pub mod order;
