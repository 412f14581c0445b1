use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::codec::{CodecError, FieldValue, ValueCodec};
use super::field::TrackedField;
use crate::domain::order::Order;

// ============================================================================
// Snapshots & Diffing
// ============================================================================

/// Encoded values of every tracked field at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    values: BTreeMap<TrackedField, Option<String>>,
}

impl OrderSnapshot {
    pub fn capture(order: &Order) -> Result<Self, CodecError> {
        let motor = order.motor_info.as_ref();
        let mut values = BTreeMap::new();

        for field in TrackedField::ALL {
            let value = match field {
                TrackedField::Status => Some(FieldValue::Status(order.status)),
                TrackedField::Priority => Some(FieldValue::Priority(order.priority)),
                TrackedField::Title => Some(FieldValue::Text(order.title.clone())),
                TrackedField::Description => order.description.clone().map(FieldValue::Text),
                TrackedField::AssignedTo => order.assigned_to.map(FieldValue::Reference),
                TrackedField::EstimatedCompletion => {
                    order.estimated_completion.map(FieldValue::Timestamp)
                }
                TrackedField::ActualCompletion => order.actual_completion.map(FieldValue::Timestamp),
                TrackedField::Notes => order.notes.clone().map(FieldValue::Text),
                TrackedField::Categories => {
                    Some(FieldValue::ReferenceList(order.category_ids.clone()))
                }
                TrackedField::Attachments => {
                    Some(FieldValue::ReferenceList(order.attachment_ids.clone()))
                }
                TrackedField::DownPayment => motor.map(|m| FieldValue::Money(m.down_payment)),
                TrackedField::TotalCost => motor.map(|m| FieldValue::Money(m.total_cost)),
            };
            values.insert(field, ValueCodec::encode(field, value.as_ref())?);
        }

        Ok(Self { values })
    }

    pub fn get(&self, field: TrackedField) -> Option<&str> {
        self.values.get(&field).and_then(|v| v.as_deref())
    }
}

/// A change observed by the recorder, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAuditEntry {
    pub field: TrackedField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_by: Uuid,
}

pub struct FieldChangeRecorder;

impl FieldChangeRecorder {
    /// One entry per tracked field whose decoded value differs. Identical
    /// snapshots produce nothing.
    pub fn diff(
        before: &OrderSnapshot,
        after: &OrderSnapshot,
        actor: Uuid,
        comment: Option<&str>,
    ) -> Result<Vec<PendingAuditEntry>, CodecError> {
        let mut entries = Vec::new();

        for field in TrackedField::ALL {
            let old = before.get(field);
            let new = after.get(field);
            if ValueCodec::equivalent(field, old, new)? {
                continue;
            }

            tracing::debug!(field = %field, old = ?old, new = ?new, "Field changed");
            entries.push(PendingAuditEntry {
                field,
                old_value: old.map(str::to_string),
                new_value: new.map(str::to_string),
                comment: comment.map(str::to_string),
                created_by: actor,
            });
        }

        Ok(entries)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::sample_command;
    use crate::domain::order::{OrderPriority, OrderStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order() -> Order {
        Order::open(&sample_command(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let order = order();
        let snapshot = OrderSnapshot::capture(&order).unwrap();

        let entries = FieldChangeRecorder::diff(&snapshot, &snapshot, Uuid::new_v4(), None).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_batched_update_yields_one_entry_per_field() {
        let mut order = order();
        let before = OrderSnapshot::capture(&order).unwrap();

        order.status = OrderStatus::InProgress;
        order.priority = OrderPriority::Urgent;
        order.title = "Rebuild 2.2L block".to_string();
        let after = OrderSnapshot::capture(&order).unwrap();

        let actor = Uuid::new_v4();
        let entries = FieldChangeRecorder::diff(&before, &after, actor, Some("bulk edit")).unwrap();
        let fields: Vec<_> = entries.iter().map(|e| e.field).collect();

        assert_eq!(
            fields,
            vec![TrackedField::Status, TrackedField::Priority, TrackedField::Title]
        );
        assert!(entries.iter().all(|e| e.created_by == actor));
        assert!(entries.iter().all(|e| e.comment.as_deref() == Some("bulk edit")));
        assert_eq!(entries[0].old_value.as_deref(), Some("open"));
        assert_eq!(entries[0].new_value.as_deref(), Some("in_progress"));
    }

    #[test]
    fn test_clearing_notes_records_null() {
        let mut order = order();
        order.notes = Some("Some important notes".to_string());
        let before = OrderSnapshot::capture(&order).unwrap();

        order.notes = None;
        let after = OrderSnapshot::capture(&order).unwrap();

        let entries = FieldChangeRecorder::diff(&before, &after, Uuid::new_v4(), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, TrackedField::Notes);
        assert_eq!(entries[0].old_value.as_deref(), Some("Some important notes"));
        assert_eq!(entries[0].new_value, None);
    }

    #[test]
    fn test_category_reorder_is_a_change() {
        let mut order = order();
        order.category_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let before = OrderSnapshot::capture(&order).unwrap();

        order.category_ids.reverse();
        let after = OrderSnapshot::capture(&order).unwrap();

        let entries = FieldChangeRecorder::diff(&before, &after, Uuid::new_v4(), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, TrackedField::Categories);
    }

    #[test]
    fn test_money_fields_compare_numerically() {
        let mut order = order();
        let before = OrderSnapshot::capture(&order).unwrap();

        // Same amount at a different scale is not a change
        if let Some(motor) = order.motor_info.as_mut() {
            motor.down_payment = Decimal::new(0, 2);
        }
        let after = OrderSnapshot::capture(&order).unwrap();
        assert!(FieldChangeRecorder::diff(&before, &after, Uuid::new_v4(), None)
            .unwrap()
            .is_empty());

        if let Some(motor) = order.motor_info.as_mut() {
            motor.down_payment = Decimal::new(30000, 2);
        }
        let after = OrderSnapshot::capture(&order).unwrap();
        let entries = FieldChangeRecorder::diff(&before, &after, Uuid::new_v4(), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, TrackedField::DownPayment);
        assert_eq!(entries[0].new_value.as_deref(), Some("300.00"));
    }

    #[test]
    fn test_missing_motor_info_snapshots_as_null() {
        let mut order = order();
        order.motor_info = None;
        let snapshot = OrderSnapshot::capture(&order).unwrap();

        assert_eq!(snapshot.get(TrackedField::DownPayment), None);
        assert_eq!(snapshot.get(TrackedField::TotalCost), None);
        assert_eq!(snapshot.get(TrackedField::Status), Some("open"));
    }
}
