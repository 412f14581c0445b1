// ============================================================================
// External Collaborators
// ============================================================================
//
// Narrow ports the workflow coordinator consumes, with stock implementations:
// - AuthorizationGate: consulted before every operation
// - CatalogLookup: service prices for budget submission
// - NotificationSink: fired after commit, never awaited by the caller
// - AttachmentStore: evidence files for orders and history entries
//
// ============================================================================

pub mod attachments;
pub mod authorization;
pub mod catalog;
pub mod notifications;

pub use attachments::{
    AttachableKind, AttachableRef, AttachmentRef, AttachmentStore, InMemoryAttachmentStore,
    NewAttachment,
};
pub use authorization::{Action, AllowAll, AuthorizationGate, Resource, Role, RoleGate};
pub use catalog::{CatalogLookup, CatalogPrice, StaticCatalog};
pub use notifications::{
    GuardedNotificationSink, NotificationError, NotificationSink, TracingNotificationSink,
    WorkflowNotification,
};
