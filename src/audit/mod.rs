// ============================================================================
// Field-Change Audit
// ============================================================================
//
// - TrackedField: the closed set of audited fields, each bound to a codec
// - ValueCodec: canonical string form of typed values
// - ChangeDescriber: human-readable sentences for history
// - FieldChangeRecorder: before/after snapshot diffing
// - AuditEntry / AuditLog: stored rows, paging and rendering
//
// ============================================================================

pub mod codec;
pub mod describer;
pub mod entry;
pub mod field;
pub mod log;
pub mod recorder;

pub use codec::{CodecError, FieldCodec, FieldValue, ValueCodec};
pub use describer::ChangeDescriber;
pub use entry::AuditEntry;
pub use field::{TrackedField, ValueKind};
pub use log::{AuditLog, HistoryPage, HistoryQuery, HistoryView};
pub use recorder::{FieldChangeRecorder, OrderSnapshot, PendingAuditEntry};
