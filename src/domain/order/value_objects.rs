use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Lifecycle status of a repair order.
///
/// The canonical (stored) form is the snake_case name; `label()` is the
/// human-readable form used in history descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    AwaitingReview,
    AwaitingCustomerApproval,
    ReadyForWork,
    InProgress,
    ReadyForDelivery,
    Delivered,
    Completed,
    Paid,
    NotPaid,
    Returned,
    Cancelled,
    OnHold,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 13] = [
        OrderStatus::Open,
        OrderStatus::AwaitingReview,
        OrderStatus::AwaitingCustomerApproval,
        OrderStatus::ReadyForWork,
        OrderStatus::InProgress,
        OrderStatus::ReadyForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Paid,
        OrderStatus::NotPaid,
        OrderStatus::Returned,
        OrderStatus::Cancelled,
        OrderStatus::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::AwaitingReview => "awaiting_review",
            OrderStatus::AwaitingCustomerApproval => "awaiting_customer_approval",
            OrderStatus::ReadyForWork => "ready_for_work",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Paid => "paid",
            OrderStatus::NotPaid => "not_paid",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::OnHold => "on_hold",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Open => "Open",
            OrderStatus::AwaitingReview => "Awaiting Review",
            OrderStatus::AwaitingCustomerApproval => "Awaiting Customer Approval",
            OrderStatus::ReadyForWork => "Ready for Work",
            OrderStatus::InProgress => "In Progress",
            OrderStatus::ReadyForDelivery => "Ready for Delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Completed => "Completed",
            OrderStatus::Paid => "Paid",
            OrderStatus::NotPaid => "Not Paid",
            OrderStatus::Returned => "Returned",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::OnHold => "On Hold",
        }
    }

    /// Parse the canonical stored form. Returns `None` for anything outside
    /// the enum's value set.
    pub fn from_canonical(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// No workflow transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Paid
                | OrderStatus::Returned
                | OrderStatus::Cancelled
        )
    }

    /// Statuses that mean the work was handed over successfully.
    /// Reaching one of these stamps `actual_completion`.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Paid
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl OrderPriority {
    pub const ALL: [OrderPriority; 4] = [
        OrderPriority::Low,
        OrderPriority::Medium,
        OrderPriority::High,
        OrderPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPriority::Low => "low",
            OrderPriority::Medium => "medium",
            OrderPriority::High => "high",
            OrderPriority::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderPriority::Low => "Low",
            OrderPriority::Medium => "Medium",
            OrderPriority::High => "High",
            OrderPriority::Urgent => "Urgent",
        }
    }

    pub fn from_canonical(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of engine part brought in for repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    EngineBlock,
    CylinderHead,
    Crankshaft,
    ConnectingRod,
    Camshaft,
    Other,
}

impl ItemType {
    pub const ALL: [ItemType; 6] = [
        ItemType::EngineBlock,
        ItemType::CylinderHead,
        ItemType::Crankshaft,
        ItemType::ConnectingRod,
        ItemType::Camshaft,
        ItemType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::EngineBlock => "engine_block",
            ItemType::CylinderHead => "cylinder_head",
            ItemType::Crankshaft => "crankshaft",
            ItemType::ConnectingRod => "connecting_rod",
            ItemType::Camshaft => "camshaft",
            ItemType::Other => "other",
        }
    }

    pub fn from_canonical(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }
}

/// Round a monetary amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate a timestamp to microseconds, the precision `TIMESTAMPTZ` keeps.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

// ============================================================================
// Unit Tests
// ============================================================================
