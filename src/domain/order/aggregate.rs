use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{CreateOrder, NewItem, NewMotorInfo};
use super::errors::OrderError;
use super::value_objects::{round_money, truncate_timestamp, ItemType, OrderPriority, OrderStatus};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The order plus everything it transactionally owns: items, their components
// and services, and the optional motor metadata. Mutated only through the
// workflow coordinator.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,

    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: OrderStatus,
    pub priority: OrderPriority,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub actual_completion: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    // People
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub assigned_to: Option<Uuid>,

    // Ordered reference lists; order is significant for auditing
    pub category_ids: Vec<Uuid>,
    pub attachment_ids: Vec<Uuid>,

    pub motor_info: Option<OrderMotorInfo>,
    pub items: Vec<OrderItem>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub item_type: ItemType,
    pub received: bool,
    pub components: Vec<ItemComponent>,
    pub services: Vec<OrderService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemComponent {
    pub id: Uuid,
    pub name: String,
    pub received: bool,
}

/// A catalog service budgeted against one item.
///
/// Flags only move forward: budgeted, then authorized, then completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderService {
    pub id: Uuid,
    pub service_key: String,
    pub measurement: Option<String>,
    pub budgeted: bool,
    pub authorized: bool,
    pub completed: bool,
    pub base_price: Decimal,
    pub net_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderMotorInfo {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub displacement: Option<String>,
    pub cylinders: Option<String>,
    pub down_payment: Decimal,
    pub total_cost: Decimal,
    pub fully_paid: bool,
}

impl OrderMotorInfo {
    pub fn remaining_balance(&self) -> Decimal {
        (self.total_cost - self.down_payment).max(Decimal::ZERO)
    }

    fn refresh_paid_flag(&mut self) {
        self.fully_paid = self.total_cost > Decimal::ZERO && self.down_payment >= self.total_cost;
    }
}

impl From<&NewMotorInfo> for OrderMotorInfo {
    fn from(info: &NewMotorInfo) -> Self {
        let mut motor = Self {
            brand: info.brand.clone(),
            model: info.model.clone(),
            year: info.year.clone(),
            displacement: info.displacement.clone(),
            cylinders: info.cylinders.clone(),
            down_payment: round_money(info.down_payment.unwrap_or_default()),
            total_cost: round_money(info.total_cost.unwrap_or_default()),
            fully_paid: false,
        };
        motor.refresh_paid_flag();
        motor
    }
}

impl OrderItem {
    fn from_new(item: &NewItem) -> Self {
        Self {
            id: Uuid::now_v7(),
            item_type: item.item_type,
            received: false,
            components: item
                .components
                .iter()
                .map(|name| ItemComponent {
                    id: Uuid::now_v7(),
                    name: name.clone(),
                    received: false,
                })
                .collect(),
            services: Vec::new(),
        }
    }
}

impl Order {
    /// Build a fresh order in the initial `Open` status.
    pub fn open(command: &CreateOrder, actor: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            version: 0,
            customer_id: command.customer_id,
            title: command.title.trim().to_string(),
            description: command.description.clone(),
            status: OrderStatus::Open,
            priority: command.priority.unwrap_or_default(),
            estimated_completion: command.estimated_completion.map(truncate_timestamp),
            actual_completion: None,
            notes: command.notes.clone(),
            created_by: actor,
            updated_by: actor,
            assigned_to: command.assigned_to,
            category_ids: command.category_ids.clone(),
            attachment_ids: Vec::new(),
            motor_info: command.motor_info.as_ref().map(OrderMotorInfo::from),
            items: command.items.iter().map(OrderItem::from_new).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_item(&self, item_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn find_service(&self, service_id: Uuid) -> Option<&OrderService> {
        self.services().find(|service| service.id == service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &OrderService> {
        self.items.iter().flat_map(|item| item.services.iter())
    }

    fn services_mut(&mut self) -> impl Iterator<Item = &mut OrderService> {
        self.items.iter_mut().flat_map(|item| item.services.iter_mut())
    }

    /// Mark items and components as physically received.
    /// Empty selections mean "everything on the order".
    pub fn mark_received(
        &mut self,
        item_ids: &[Uuid],
        component_ids: &[Uuid],
    ) -> Result<(), OrderError> {
        if item_ids.is_empty() && component_ids.is_empty() {
            for item in &mut self.items {
                item.received = true;
                item.components.iter_mut().for_each(|c| c.received = true);
            }
            return Ok(());
        }

        for item_id in item_ids {
            let item = self
                .items
                .iter_mut()
                .find(|item| item.id == *item_id)
                .ok_or_else(|| OrderError::not_found("order item", item_id))?;
            item.received = true;
        }

        for component_id in component_ids {
            let component = self
                .items
                .iter_mut()
                .flat_map(|item| item.components.iter_mut())
                .find(|c| c.id == *component_id)
                .ok_or_else(|| OrderError::not_found("item component", component_id))?;
            component.received = true;
        }

        Ok(())
    }

    pub fn add_budgeted_service(
        &mut self,
        item_id: Uuid,
        service: OrderService,
    ) -> Result<(), OrderError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| OrderError::not_found("order item", item_id))?;
        item.services.push(service);
        Ok(())
    }

    /// Authorize the named services. Callers check membership first.
    pub fn authorize_services(&mut self, service_ids: &[Uuid]) -> usize {
        let mut count = 0;
        for service in self.services_mut() {
            if service_ids.contains(&service.id) && service.budgeted && !service.authorized {
                service.authorized = true;
                count += 1;
            }
        }
        count
    }

    pub fn complete_services(&mut self, service_ids: &[Uuid]) -> usize {
        let mut count = 0;
        for service in self.services_mut() {
            if service_ids.contains(&service.id) && service.authorized && !service.completed {
                service.completed = true;
                count += 1;
            }
        }
        count
    }

    pub fn budget_total(&self) -> Decimal {
        self.services()
            .filter(|s| s.budgeted)
            .map(|s| s.net_price)
            .sum()
    }

    pub fn authorized_total(&self) -> Decimal {
        self.services()
            .filter(|s| s.authorized)
            .map(|s| s.net_price)
            .sum()
    }

    /// Record the customer's approval in the motor info: the down payment and
    /// the total of every authorized service. Creates the record if missing.
    pub fn record_payment_terms(&mut self, down_payment: Option<Decimal>) {
        let total = round_money(self.authorized_total());
        let motor = self.motor_info.get_or_insert_with(OrderMotorInfo::default);
        if let Some(amount) = down_payment {
            motor.down_payment = round_money(amount);
        }
        motor.total_cost = total;
        motor.refresh_paid_flag();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::order::commands::{CreateOrder, NewItem, NewMotorInfo};

    pub(crate) fn sample_command() -> CreateOrder {
        CreateOrder {
            customer_id: Uuid::new_v4(),
            title: "Rebuild 2.0L block".to_string(),
            description: Some("Customer reports overheating".to_string()),
            priority: Some(OrderPriority::High),
            assigned_to: Some(Uuid::new_v4()),
            estimated_completion: None,
            notes: None,
            category_ids: vec![Uuid::new_v4()],
            motor_info: Some(NewMotorInfo {
                brand: Some("Toyota".to_string()),
                model: Some("3S-GE".to_string()),
                year: Some("1998".to_string()),
                displacement: Some("2.0".to_string()),
                cylinders: Some("4".to_string()),
                down_payment: None,
                total_cost: None,
            }),
            items: vec![
                NewItem {
                    item_type: ItemType::EngineBlock,
                    components: vec!["pistons".to_string(), "bearings".to_string()],
                },
                NewItem {
                    item_type: ItemType::CylinderHead,
                    components: vec![],
                },
            ],
        }
    }

    pub(crate) fn service(key: &str, net: i64) -> OrderService {
        OrderService {
            id: Uuid::new_v4(),
            service_key: key.to_string(),
            measurement: None,
            budgeted: true,
            authorized: false,
            completed: false,
            base_price: Decimal::new(net, 0),
            net_price: Decimal::new(net, 0),
        }
    }

    #[test]
    fn test_open_order_starts_in_open_status() {
        let actor = Uuid::new_v4();
        let order = Order::open(&sample_command(), actor, Utc::now());

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.version, 0);
        assert_eq!(order.priority, OrderPriority::High);
        assert_eq!(order.created_by, actor);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].components.len(), 2);
        assert!(order.actual_completion.is_none());
        assert!(order.items.iter().all(|i| !i.received));
    }

    #[test]
    fn test_mark_received_defaults_to_everything() {
        let mut order = Order::open(&sample_command(), Uuid::new_v4(), Utc::now());
        order.mark_received(&[], &[]).unwrap();

        assert!(order.items.iter().all(|i| i.received));
        assert!(order.items[0].components.iter().all(|c| c.received));
    }

    #[test]
    fn test_mark_received_unknown_item_is_not_found() {
        let mut order = Order::open(&sample_command(), Uuid::new_v4(), Utc::now());
        let result = order.mark_received(&[Uuid::new_v4()], &[]);

        assert!(matches!(result, Err(OrderError::NotFound { entity: "order item", .. })));
    }

    #[test]
    fn test_service_flags_only_move_forward() {
        let mut order = Order::open(&sample_command(), Uuid::new_v4(), Utc::now());
        let item_id = order.items[0].id;
        let svc = service("boring", 100);
        let svc_id = svc.id;
        order.add_budgeted_service(item_id, svc).unwrap();

        // Completing before authorization does nothing
        assert_eq!(order.complete_services(&[svc_id]), 0);
        assert_eq!(order.authorize_services(&[svc_id]), 1);
        assert_eq!(order.authorize_services(&[svc_id]), 0);
        assert_eq!(order.complete_services(&[svc_id]), 1);

        let stored = order.find_service(svc_id).unwrap();
        assert!(stored.budgeted && stored.authorized && stored.completed);
    }

    #[test]
    fn test_payment_terms_and_remaining_balance() {
        let mut order = Order::open(&sample_command(), Uuid::new_v4(), Utc::now());
        let item_id = order.items[0].id;
        let a = service("boring", 400);
        let b = service("honing", 200);
        let (a_id, b_id) = (a.id, b.id);
        order.add_budgeted_service(item_id, a).unwrap();
        order.add_budgeted_service(item_id, b).unwrap();
        order.authorize_services(&[a_id]);

        order.record_payment_terms(Some(Decimal::new(30000, 2)));
        let motor = order.motor_info.as_ref().unwrap();

        assert_eq!(motor.down_payment, Decimal::new(30000, 2));
        assert_eq!(motor.total_cost, Decimal::new(400, 0));
        assert_eq!(motor.remaining_balance(), Decimal::new(100, 0));
        assert!(!motor.fully_paid);
        assert_eq!(order.budget_total(), Decimal::new(600, 0));
        assert!(order.find_service(b_id).map(|s| !s.authorized).unwrap());
    }

    #[test]
    fn test_remaining_balance_never_negative() {
        let motor = OrderMotorInfo {
            down_payment: Decimal::new(500, 0),
            total_cost: Decimal::new(200, 0),
            ..Default::default()
        };
        assert_eq!(motor.remaining_balance(), Decimal::ZERO);
    }
}
