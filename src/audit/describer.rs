use super::codec::{format_money, CodecError, FieldValue, ValueCodec};
use super::field::TrackedField;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Renders one audited change as the sentence shown in order history.
///
/// Pure: the same `(field, old, new)` always yields the same text, so stored
/// entries can be re-described at any time.
pub struct ChangeDescriber;

impl ChangeDescriber {
    pub fn describe(field: TrackedField, old: Option<&FieldValue>, new: Option<&FieldValue>) -> String {
        let label = field.label();
        match (old, new) {
            (Some(old), Some(new)) => {
                format!("{label} changed from {} to {}", render(old), render(new))
            }
            (None, Some(new)) => format!("{label} set to: {}", render(new)),
            (Some(old), None) => format!("{label} removed (was: {})", render(old)),
            (None, None) => format!("{label} unchanged"),
        }
    }

    /// Decode stored values and describe them.
    pub fn describe_encoded(
        field: TrackedField,
        old: Option<&str>,
        new: Option<&str>,
    ) -> Result<String, CodecError> {
        let old = ValueCodec::decode(field, old)?;
        let new = ValueCodec::decode(field, new)?;
        Ok(Self::describe(field, old.as_ref(), new.as_ref()))
    }
}

fn render(value: &FieldValue) -> String {
    match value {
        FieldValue::Status(status) => status.label().to_string(),
        FieldValue::Priority(priority) => priority.label().to_string(),
        FieldValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        FieldValue::Reference(id) => id.to_string(),
        FieldValue::ReferenceList(ids) if ids.is_empty() => "(none)".to_string(),
        FieldValue::ReferenceList(ids) => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Text(text) => text.clone(),
        FieldValue::Money(amount) => format_money(*amount),
    }
}
