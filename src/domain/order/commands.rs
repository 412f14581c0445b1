use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{ItemType, OrderPriority, OrderStatus};

// ============================================================================
// Order Commands - one request type per workflow operation
// ============================================================================
//
// Each command validates its own shape before it reaches the coordinator.
// Guard conditions that depend on the stored order live in the status machine.
//
// ============================================================================

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub customer_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<OrderPriority>,
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub motor_info: Option<NewMotorInfo>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub item_type: ItemType,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMotorInfo {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub displacement: Option<String>,
    pub cylinders: Option<String>,
    pub down_payment: Option<Decimal>,
    pub total_cost: Option<Decimal>,
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_title(&self.title)?;

        if self.assigned_to.is_none() {
            return Err(OrderError::validation("assigned_to", "is required"));
        }

        for item in &self.items {
            if item.components.iter().any(|name| name.trim().is_empty()) {
                return Err(OrderError::validation(
                    "items.components",
                    "component names cannot be empty",
                ));
            }
        }

        if let Some(motor) = &self.motor_info {
            validate_amount("motor_info.down_payment", motor.down_payment)?;
            validate_amount("motor_info.total_cost", motor.total_cost)?;
        }

        Ok(())
    }
}

/// Partial update. Absent keys leave the field alone; for nullable fields an
/// explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrder {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub priority: Option<OrderPriority>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub estimated_completion: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default)]
    pub category_ids: Option<Vec<Uuid>>,
}

impl UpdateOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }

        if matches!(self.assigned_to, Some(None)) {
            return Err(OrderError::validation("assigned_to", "must never be set to null"));
        }

        Ok(())
    }
}

/// Receive the parts physically. Empty lists receive everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiveItems {
    #[serde(default)]
    pub item_ids: Vec<Uuid>,
    #[serde(default)]
    pub component_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetLine {
    pub order_item_id: Uuid,
    pub service_key: String,
    #[serde(default)]
    pub measurement: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBudget {
    pub services: Vec<BudgetLine>,
}

impl SubmitBudget {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.services.iter().any(|line| line.service_key.trim().is_empty()) {
            return Err(OrderError::validation("services.service_key", "cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerApproval {
    pub authorized_service_ids: Vec<Uuid>,
    #[serde(default)]
    pub down_payment: Option<Decimal>,
}

impl CustomerApproval {
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_amount("down_payment", self.down_payment)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkCompleted {
    pub completed_service_ids: Vec<Uuid>,
}

impl WorkCompleted {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.completed_service_ids.is_empty() {
            return Err(OrderError::validation(
                "completed_service_ids",
                "at least one service id is required",
            ));
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), OrderError> {
    if title.trim().is_empty() {
        return Err(OrderError::validation("title", "cannot be empty"));
    }
    if title.chars().count() > 255 {
        return Err(OrderError::validation("title", "cannot exceed 255 characters"));
    }
    Ok(())
}

fn validate_amount(field: &'static str, amount: Option<Decimal>) -> Result<(), OrderError> {
    match amount {
        Some(value) if value.is_sign_negative() => {
            Err(OrderError::validation(field, "cannot be negative"))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: UpdateOrder = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        assert_eq!(update.notes, Some(None));
        assert_eq!(update.description, None);

        let update: UpdateOrder = serde_json::from_str(r#"{"notes": "call first"}"#).unwrap();
        assert_eq!(update.notes, Some(Some("call first".to_string())));
    }

    #[test]
    fn test_assigned_to_null_is_rejected() {
        let update: UpdateOrder = serde_json::from_str(r#"{"assigned_to": null}"#).unwrap();
        let err = update.validate().unwrap_err();

        assert!(matches!(err, OrderError::Validation { field: "assigned_to", .. }));
        assert!(err.to_string().contains("assigned_to"));
    }

    #[test]
    fn test_update_status_parses_canonical_value() {
        let update: UpdateOrder = serde_json::from_str(r#"{"status": "in_progress"}"#).unwrap();
        assert_eq!(update.status, Some(OrderStatus::InProgress));
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_create_requires_title_and_assignee() {
        let json = r#"{
            "customer_id": "9b2f3c1e-8d4a-4c6b-9f0e-1a2b3c4d5e6f",
            "title": "  ",
            "assigned_to": null
        }"#;
        let command: CreateOrder = serde_json::from_str(json).unwrap();
        assert!(matches!(
            command.validate(),
            Err(OrderError::Validation { field: "title", .. })
        ));

        let command = CreateOrder {
            title: "Head gasket".to_string(),
            ..command
        };
        assert!(matches!(
            command.validate(),
            Err(OrderError::Validation { field: "assigned_to", .. })
        ));
    }

    #[test]
    fn test_negative_down_payment_is_rejected() {
        let approval = CustomerApproval {
            authorized_service_ids: vec![Uuid::new_v4()],
            down_payment: Some(Decimal::new(-1, 0)),
        };
        assert!(matches!(
            approval.validate(),
            Err(OrderError::Validation { field: "down_payment", .. })
        ));
    }

    #[test]
    fn test_work_completed_requires_ids() {
        let command = WorkCompleted {
            completed_service_ids: vec![],
        };
        assert!(command.validate().is_err());
    }

    #[test]
    fn test_budget_line_requires_service_key() {
        let command = SubmitBudget {
            services: vec![BudgetLine {
                order_item_id: Uuid::new_v4(),
                service_key: "".to_string(),
                measurement: None,
            }],
        };
        assert!(command.validate().is_err());
    }
}
