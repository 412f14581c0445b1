use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::codec::{
    CodecError, FieldCodec, MONEY_CODEC, PRIORITY_CODEC, REFERENCE_CODEC, REFERENCE_LIST_CODEC,
    STATUS_CODEC, TEXT_CODEC, TIMESTAMP_CODEC,
};

/// Declared value type of a trackable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Enum,
    Timestamp,
    Reference,
    ReferenceList,
    PlainText,
    Money,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Enum => "enum",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Reference => "reference",
            ValueKind::ReferenceList => "reference list",
            ValueKind::PlainText => "plain text",
            ValueKind::Money => "money",
        };
        f.write_str(name)
    }
}

/// The closed set of order fields whose changes are audited. The stored
/// `field_changed` column holds `as_str()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedField {
    Status,
    Priority,
    Title,
    Description,
    AssignedTo,
    EstimatedCompletion,
    ActualCompletion,
    Notes,
    Categories,
    Attachments,
    DownPayment,
    TotalCost,
}

impl TrackedField {
    pub const ALL: [TrackedField; 12] = [
        TrackedField::Status,
        TrackedField::Priority,
        TrackedField::Title,
        TrackedField::Description,
        TrackedField::AssignedTo,
        TrackedField::EstimatedCompletion,
        TrackedField::ActualCompletion,
        TrackedField::Notes,
        TrackedField::Categories,
        TrackedField::Attachments,
        TrackedField::DownPayment,
        TrackedField::TotalCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::Status => "status",
            TrackedField::Priority => "priority",
            TrackedField::Title => "title",
            TrackedField::Description => "description",
            TrackedField::AssignedTo => "assigned_to",
            TrackedField::EstimatedCompletion => "estimated_completion",
            TrackedField::ActualCompletion => "actual_completion",
            TrackedField::Notes => "notes",
            TrackedField::Categories => "categories",
            TrackedField::Attachments => "attachments",
            TrackedField::DownPayment => "down_payment",
            TrackedField::TotalCost => "total_cost",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackedField::Status => "Status",
            TrackedField::Priority => "Priority",
            TrackedField::Title => "Title",
            TrackedField::Description => "Description",
            TrackedField::AssignedTo => "Assigned to",
            TrackedField::EstimatedCompletion => "Estimated completion",
            TrackedField::ActualCompletion => "Actual completion",
            TrackedField::Notes => "Notes",
            TrackedField::Categories => "Categories",
            TrackedField::Attachments => "Attachments",
            TrackedField::DownPayment => "Down payment",
            TrackedField::TotalCost => "Total cost",
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        self.codec().kind()
    }

    /// The codec strategy bound to this field.
    pub fn codec(&self) -> &'static dyn FieldCodec {
        match self {
            TrackedField::Status => &STATUS_CODEC,
            TrackedField::Priority => &PRIORITY_CODEC,
            TrackedField::Title | TrackedField::Description | TrackedField::Notes => &TEXT_CODEC,
            TrackedField::AssignedTo => &REFERENCE_CODEC,
            TrackedField::EstimatedCompletion | TrackedField::ActualCompletion => &TIMESTAMP_CODEC,
            TrackedField::Categories | TrackedField::Attachments => &REFERENCE_LIST_CODEC,
            TrackedField::DownPayment | TrackedField::TotalCost => &MONEY_CODEC,
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackedField {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CodecError::UnsupportedFieldKind(s.to_string()))
    }
}

impl Serialize for TrackedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_parse_back() {
        for field in TrackedField::ALL {
            assert_eq!(field.as_str().parse::<TrackedField>().unwrap(), field);
        }
    }

    #[test]
    fn test_unknown_field_is_unsupported() {
        let err = "odometer".parse::<TrackedField>().unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFieldKind(name) if name == "odometer"));
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(TrackedField::Status.value_kind(), ValueKind::Enum);
        assert_eq!(TrackedField::Priority.value_kind(), ValueKind::Enum);
        assert_eq!(TrackedField::Title.value_kind(), ValueKind::PlainText);
        assert_eq!(TrackedField::AssignedTo.value_kind(), ValueKind::Reference);
        assert_eq!(TrackedField::Categories.value_kind(), ValueKind::ReferenceList);
        assert_eq!(TrackedField::ActualCompletion.value_kind(), ValueKind::Timestamp);
        assert_eq!(TrackedField::DownPayment.value_kind(), ValueKind::Money);
    }
}
