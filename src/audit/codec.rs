use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::field::{TrackedField, ValueKind};
use crate::domain::order::{round_money, truncate_timestamp, OrderPriority, OrderStatus};

// ============================================================================
// Value Codec
// ============================================================================
//
// Canonical string form for every audited value. `None` always encodes to
// `None` (a SQL NULL), never to the empty string. Each TrackedField is bound
// to one FieldCodec strategy in `TrackedField::codec`.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid value {value:?} for enum field {field}")]
    InvalidEnumValue { field: TrackedField, value: String },

    #[error("Unsupported field kind: {0}")]
    UnsupportedFieldKind(String),

    #[error("Field {field} expects a {expected} value")]
    KindMismatch {
        field: TrackedField,
        expected: ValueKind,
    },

    #[error("Malformed {kind} value {value:?} for field {field}: {reason}")]
    MalformedValue {
        field: TrackedField,
        kind: ValueKind,
        value: String,
        reason: String,
    },
}

/// A decoded, typed audit value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Status(OrderStatus),
    Priority(OrderPriority),
    Timestamp(DateTime<Utc>),
    Reference(Uuid),
    /// Ordered: two lists with the same members in a different order differ.
    ReferenceList(Vec<Uuid>),
    Text(String),
    Money(Decimal),
}

pub trait FieldCodec: Send + Sync {
    fn kind(&self) -> ValueKind;
    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError>;
    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError>;
}

fn mismatch(field: TrackedField, expected: ValueKind) -> CodecError {
    CodecError::KindMismatch { field, expected }
}

fn malformed(field: TrackedField, kind: ValueKind, raw: &str, reason: impl ToString) -> CodecError {
    CodecError::MalformedValue {
        field,
        kind,
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Two decimal places, rounded half away from zero.
pub(crate) fn format_money(amount: Decimal) -> String {
    let mut cents = round_money(amount);
    cents.rescale(2);
    cents.to_string()
}

pub struct StatusCodec;
pub struct PriorityCodec;
pub struct TimestampCodec;
pub struct ReferenceCodec;
pub struct ReferenceListCodec;
pub struct TextCodec;
pub struct MoneyCodec;

pub static STATUS_CODEC: StatusCodec = StatusCodec;
pub static PRIORITY_CODEC: PriorityCodec = PriorityCodec;
pub static TIMESTAMP_CODEC: TimestampCodec = TimestampCodec;
pub static REFERENCE_CODEC: ReferenceCodec = ReferenceCodec;
pub static REFERENCE_LIST_CODEC: ReferenceListCodec = ReferenceListCodec;
pub static TEXT_CODEC: TextCodec = TextCodec;
pub static MONEY_CODEC: MoneyCodec = MoneyCodec;

impl FieldCodec for StatusCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::Enum
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Status(status) => Ok(status.as_str().to_string()),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        OrderStatus::from_canonical(raw)
            .map(FieldValue::Status)
            .ok_or_else(|| CodecError::InvalidEnumValue {
                field,
                value: raw.to_string(),
            })
    }
}

impl FieldCodec for PriorityCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::Enum
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Priority(priority) => Ok(priority.as_str().to_string()),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        OrderPriority::from_canonical(raw)
            .map(FieldValue::Priority)
            .ok_or_else(|| CodecError::InvalidEnumValue {
                field,
                value: raw.to_string(),
            })
    }
}

impl FieldCodec for TimestampCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::Timestamp
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Timestamp(ts) => {
                Ok(truncate_timestamp(*ts).to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| FieldValue::Timestamp(truncate_timestamp(ts.with_timezone(&Utc))))
            .map_err(|e| malformed(field, self.kind(), raw, e))
    }
}

impl FieldCodec for ReferenceCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::Reference
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Reference(id) => Ok(id.to_string()),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        Uuid::parse_str(raw)
            .map(FieldValue::Reference)
            .map_err(|e| malformed(field, self.kind(), raw, e))
    }
}

impl FieldCodec for ReferenceListCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::ReferenceList
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::ReferenceList(ids) => serde_json::to_string(ids)
                .map_err(|e| malformed(field, self.kind(), "<list>", e)),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        serde_json::from_str::<Vec<Uuid>>(raw)
            .map(FieldValue::ReferenceList)
            .map_err(|e| malformed(field, self.kind(), raw, e))
    }
}

impl FieldCodec for TextCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::PlainText
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Text(text) => Ok(text.clone()),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, _field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        Ok(FieldValue::Text(raw.to_string()))
    }
}

impl FieldCodec for MoneyCodec {
    fn kind(&self) -> ValueKind {
        ValueKind::Money
    }

    fn encode(&self, field: TrackedField, value: &FieldValue) -> Result<String, CodecError> {
        match value {
            FieldValue::Money(amount) => Ok(format_money(*amount)),
            _ => Err(mismatch(field, self.kind())),
        }
    }

    fn decode(&self, field: TrackedField, raw: &str) -> Result<FieldValue, CodecError> {
        Decimal::from_str(raw)
            .map(FieldValue::Money)
            .map_err(|e| malformed(field, self.kind(), raw, e))
    }
}

pub struct ValueCodec;

impl ValueCodec {
    pub fn encode(field: TrackedField, value: Option<&FieldValue>) -> Result<Option<String>, CodecError> {
        value.map(|v| field.codec().encode(field, v)).transpose()
    }

    pub fn decode(field: TrackedField, raw: Option<&str>) -> Result<Option<FieldValue>, CodecError> {
        raw.map(|r| field.codec().decode(field, r)).transpose()
    }

    /// Decode a value stored under a raw `field_changed` name.
    pub fn decode_named(
        field_name: &str,
        raw: Option<&str>,
    ) -> Result<(TrackedField, Option<FieldValue>), CodecError> {
        let field: TrackedField = field_name.parse()?;
        Ok((field, Self::decode(field, raw)?))
    }

    /// Typed equality of two encoded values, so formatting differences
    /// ("300" vs "300.00", "Z" vs "+00:00") do not count as changes.
    pub fn equivalent(field: TrackedField, a: Option<&str>, b: Option<&str>) -> Result<bool, CodecError> {
        Ok(Self::decode(field, a)? == Self::decode(field, b)?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(field: TrackedField, value: Option<FieldValue>) {
        let encoded = ValueCodec::encode(field, value.as_ref()).unwrap();
        let decoded = ValueCodec::decode(field, encoded.as_deref()).unwrap();
        assert_eq!(decoded, value, "round trip failed for {field}");
    }

    #[test]
    fn test_every_kind_round_trips_including_null() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let samples = [
            (TrackedField::Status, FieldValue::Status(OrderStatus::InProgress)),
            (TrackedField::Priority, FieldValue::Priority(OrderPriority::Urgent)),
            (TrackedField::Title, FieldValue::Text("Rebuild head".to_string())),
            (TrackedField::AssignedTo, FieldValue::Reference(Uuid::new_v4())),
            (TrackedField::EstimatedCompletion, FieldValue::Timestamp(ts)),
            (
                TrackedField::Categories,
                FieldValue::ReferenceList(vec![Uuid::new_v4(), Uuid::new_v4()]),
            ),
            (TrackedField::DownPayment, FieldValue::Money(Decimal::new(30000, 2))),
        ];

        for (field, value) in samples {
            round_trip(field, Some(value));
            round_trip(field, None);
        }
    }

    #[test]
    fn test_null_is_not_empty_string() {
        assert_eq!(ValueCodec::encode(TrackedField::Notes, None).unwrap(), None);

        let empty = FieldValue::Text(String::new());
        assert_eq!(
            ValueCodec::encode(TrackedField::Notes, Some(&empty)).unwrap(),
            Some(String::new())
        );
        assert!(!ValueCodec::equivalent(TrackedField::Notes, None, Some("")).unwrap());
    }

    #[test]
    fn test_enum_values_are_validated() {
        let err = ValueCodec::decode(TrackedField::Status, Some("shipped")).unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidEnumValue {
                field: TrackedField::Status,
                value: "shipped".to_string(),
            }
        );

        let decoded = ValueCodec::decode(TrackedField::Status, Some("open")).unwrap();
        assert_eq!(decoded, Some(FieldValue::Status(OrderStatus::Open)));
    }

    #[test]
    fn test_unknown_field_name_is_unsupported() {
        let err = ValueCodec::decode_named("mileage", Some("1000")).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFieldKind(_)));

        let (field, value) = ValueCodec::decode_named("priority", Some("low")).unwrap();
        assert_eq!(field, TrackedField::Priority);
        assert_eq!(value, Some(FieldValue::Priority(OrderPriority::Low)));
    }

    #[test]
    fn test_encode_rejects_wrong_kind() {
        let err = ValueCodec::encode(TrackedField::Status, Some(&FieldValue::Text("open".into())))
            .unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { expected: ValueKind::Enum, .. }));
    }

    #[test]
    fn test_timestamp_encoding_is_iso8601_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let encoded = ValueCodec::encode(TrackedField::EstimatedCompletion, Some(&FieldValue::Timestamp(ts)))
            .unwrap()
            .unwrap();
        assert_eq!(encoded, "2024-01-15T10:30:00Z");

        assert!(ValueCodec::equivalent(
            TrackedField::EstimatedCompletion,
            Some("2024-01-15T10:30:00Z"),
            Some("2024-01-15T12:30:00+02:00"),
        )
        .unwrap());
    }

    #[test]
    fn test_timestamps_compare_at_microsecond_precision() {
        let precise = DateTime::parse_from_rfc3339("2024-01-15T10:30:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let encoded = ValueCodec::encode(
            TrackedField::EstimatedCompletion,
            Some(&FieldValue::Timestamp(precise)),
        )
        .unwrap();
        assert_eq!(encoded.as_deref(), Some("2024-01-15T10:30:00.123456Z"));

        assert!(ValueCodec::equivalent(
            TrackedField::EstimatedCompletion,
            Some("2024-01-15T10:30:00.123456789Z"),
            Some("2024-01-15T10:30:00.123456Z"),
        )
        .unwrap());
        assert!(!ValueCodec::equivalent(
            TrackedField::EstimatedCompletion,
            Some("2024-01-15T10:30:00.123456Z"),
            Some("2024-01-15T10:30:00.123457Z"),
        )
        .unwrap());
    }

    #[test]
    fn test_reference_list_equality_is_order_sensitive() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let forward = serde_json::to_string(&vec![a, b]).unwrap();
        let backward = serde_json::to_string(&vec![b, a]).unwrap();

        assert!(!ValueCodec::equivalent(TrackedField::Categories, Some(&forward), Some(&backward)).unwrap());
        assert!(ValueCodec::equivalent(TrackedField::Categories, Some(&forward), Some(&forward)).unwrap());
    }

    #[test]
    fn test_money_compares_numerically() {
        assert!(ValueCodec::equivalent(TrackedField::DownPayment, Some("300"), Some("300.00")).unwrap());

        let encoded = ValueCodec::encode(TrackedField::DownPayment, Some(&FieldValue::Money(Decimal::new(300, 0))))
            .unwrap();
        assert_eq!(encoded.as_deref(), Some("300.00"));
    }

    #[test]
    fn test_malformed_values_fail_to_decode() {
        assert!(matches!(
            ValueCodec::decode(TrackedField::AssignedTo, Some("not-a-uuid")),
            Err(CodecError::MalformedValue { kind: ValueKind::Reference, .. })
        ));
        assert!(matches!(
            ValueCodec::decode(TrackedField::Categories, Some("1,2,3")),
            Err(CodecError::MalformedValue { kind: ValueKind::ReferenceList, .. })
        ));
        assert!(ValueCodec::decode(TrackedField::ActualCompletion, Some("yesterday")).is_err());
    }
}
