use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::{CodecError, FieldValue, ValueCodec};
use super::describer::ChangeDescriber;
use super::field::TrackedField;
use super::recorder::PendingAuditEntry;

/// One persisted `order_histories` row. Never updated after insert.
///
/// `field_changed` is kept as the stored string; it is only interpreted when
/// the entry is decoded or described.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub field_changed: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_pending(order_id: Uuid, pending: PendingAuditEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            field_changed: pending.field.as_str().to_string(),
            old_value: pending.old_value,
            new_value: pending.new_value,
            comment: pending.comment,
            created_by: pending.created_by,
            created_at: now,
        }
    }

    pub fn field(&self) -> Result<TrackedField, CodecError> {
        self.field_changed.parse()
    }

    pub fn decoded(&self) -> Result<(Option<FieldValue>, Option<FieldValue>), CodecError> {
        let field = self.field()?;
        Ok((
            ValueCodec::decode(field, self.old_value.as_deref())?,
            ValueCodec::decode(field, self.new_value.as_deref())?,
        ))
    }

    /// Rendered on demand from the stored values.
    pub fn describe(&self) -> Result<String, CodecError> {
        ChangeDescriber::describe_encoded(
            self.field()?,
            self.old_value.as_deref(),
            self.new_value.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(field: &str, old: Option<&str>, new: Option<&str>) -> AuditEntry {
        AuditEntry {
            id: Uuid::now_v7(),
            order_id: Uuid::new_v4(),
            field_changed: field.to_string(),
            old_value: old.map(str::to_string),
            new_value: new.map(str::to_string),
            comment: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_pending_keeps_encoded_values() {
        let order_id = Uuid::new_v4();
        let pending = PendingAuditEntry {
            field: TrackedField::Priority,
            old_value: Some("medium".to_string()),
            new_value: Some("high".to_string()),
            comment: Some("customer called".to_string()),
            created_by: Uuid::new_v4(),
        };
        let stored = AuditEntry::from_pending(order_id, pending.clone(), Utc::now());

        assert_eq!(stored.order_id, order_id);
        assert_eq!(stored.field_changed, "priority");
        assert_eq!(stored.old_value, pending.old_value);
        assert_eq!(stored.comment.as_deref(), Some("customer called"));
        assert_eq!(stored.describe().unwrap(), "Priority changed from Medium to High");
    }

    #[test]
    fn test_unknown_stored_field_fails_to_describe() {
        let stored = entry("mileage", None, Some("1000"));
        assert!(matches!(
            stored.describe(),
            Err(CodecError::UnsupportedFieldKind(name)) if name == "mileage"
        ));
    }

    #[test]
    fn test_corrupt_enum_value_fails_to_decode() {
        let stored = entry("status", Some("open"), Some("teleported"));
        assert!(matches!(stored.decoded(), Err(CodecError::InvalidEnumValue { .. })));
    }
}
