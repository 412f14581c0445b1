use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{OrderRepository, StoreError};
use crate::audit::{AuditEntry, CodecError, HistoryQuery, TrackedField};
use crate::domain::order::{
    ItemComponent, ItemType, Order, OrderItem, OrderMotorInfo, OrderPriority, OrderService,
    OrderStatus,
};

// ============================================================================
// PostgreSQL Order Repository
// ============================================================================
//
// Tables: orders, order_motor_info, order_items, order_item_components,
// order_services, order_histories (see sql/schema.sql).
//
// A commit runs in one transaction:
// 1. Versioned INSERT / UPDATE of the order row (0 rows => conflict)
// 2. Replace nested items, components, services and motor info
// 3. Append audit entries
//
// ============================================================================

const SCHEMA: &str = include_str!("../../sql/schema.sql");

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(backend)?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }

    async fn write_order_row(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError> {
        match expected_version {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO orders (
                        id, version, customer_id, title, description, status, priority,
                        estimated_completion, actual_completion, notes,
                        created_by, updated_by, assigned_to,
                        category_ids, attachment_ids, created_at, updated_at
                    ) VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                    "#,
                )
                .bind(order.id)
                .bind(order.customer_id)
                .bind(&order.title)
                .bind(&order.description)
                .bind(order.status.as_str())
                .bind(order.priority.as_str())
                .bind(order.estimated_completion)
                .bind(order.actual_completion)
                .bind(&order.notes)
                .bind(order.created_by)
                .bind(order.updated_by)
                .bind(order.assigned_to)
                .bind(Json(&order.category_ids))
                .bind(Json(&order.attachment_ids))
                .bind(order.created_at)
                .bind(order.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| classify(order.id, e))?;

                Ok(1)
            }
            Some(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE orders SET
                        version = $2 + 1,
                        title = $3,
                        description = $4,
                        status = $5,
                        priority = $6,
                        estimated_completion = $7,
                        actual_completion = $8,
                        notes = $9,
                        updated_by = $10,
                        assigned_to = $11,
                        category_ids = $12,
                        attachment_ids = $13,
                        updated_at = $14
                    WHERE id = $1 AND version = $2
                    "#,
                )
                .bind(order.id)
                .bind(expected)
                .bind(&order.title)
                .bind(&order.description)
                .bind(order.status.as_str())
                .bind(order.priority.as_str())
                .bind(order.estimated_completion)
                .bind(order.actual_completion)
                .bind(&order.notes)
                .bind(order.updated_by)
                .bind(order.assigned_to)
                .bind(Json(&order.category_ids))
                .bind(Json(&order.attachment_ids))
                .bind(order.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| classify(order.id, e))?;

                if result.rows_affected() == 0 {
                    let exists = sqlx::query_scalar::<_, i64>("SELECT version FROM orders WHERE id = $1")
                        .bind(order.id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(backend)?;

                    return Err(match exists {
                        Some(_) => StoreError::Conflict { order_id: order.id },
                        None => StoreError::order_not_found(order.id),
                    });
                }

                Ok(expected + 1)
            }
        }
    }

    async fn write_children(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), StoreError> {
        // Components and services cascade from their item
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await
            .map_err(backend)?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, position, item_type, received) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(position as i32)
            .bind(item.item_type.as_str())
            .bind(item.received)
            .execute(&mut **tx)
            .await
            .map_err(backend)?;

            for (position, component) in item.components.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO order_item_components (id, order_item_id, position, name, received)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(component.id)
                .bind(item.id)
                .bind(position as i32)
                .bind(&component.name)
                .bind(component.received)
                .execute(&mut **tx)
                .await
                .map_err(backend)?;
            }

            for (position, service) in item.services.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO order_services (
                        id, order_item_id, position, service_key, measurement,
                        budgeted, authorized, completed, base_price, net_price
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(service.id)
                .bind(item.id)
                .bind(position as i32)
                .bind(&service.service_key)
                .bind(&service.measurement)
                .bind(service.budgeted)
                .bind(service.authorized)
                .bind(service.completed)
                .bind(service.base_price)
                .bind(service.net_price)
                .execute(&mut **tx)
                .await
                .map_err(backend)?;
            }
        }

        match &order.motor_info {
            Some(motor) => {
                sqlx::query(
                    r#"
                    INSERT INTO order_motor_info (
                        order_id, brand, model, year, displacement, cylinders,
                        down_payment, total_cost, fully_paid
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (order_id) DO UPDATE SET
                        brand = EXCLUDED.brand,
                        model = EXCLUDED.model,
                        year = EXCLUDED.year,
                        displacement = EXCLUDED.displacement,
                        cylinders = EXCLUDED.cylinders,
                        down_payment = EXCLUDED.down_payment,
                        total_cost = EXCLUDED.total_cost,
                        fully_paid = EXCLUDED.fully_paid
                    "#,
                )
                .bind(order.id)
                .bind(&motor.brand)
                .bind(&motor.model)
                .bind(&motor.year)
                .bind(&motor.displacement)
                .bind(&motor.cylinders)
                .bind(motor.down_payment)
                .bind(motor.total_cost)
                .bind(motor.fully_paid)
                .execute(&mut **tx)
                .await
                .map_err(backend)?;
            }
            None => {
                sqlx::query("DELETE FROM order_motor_info WHERE order_id = $1")
                    .bind(order.id)
                    .execute(&mut **tx)
                    .await
                    .map_err(backend)?;
            }
        }

        Ok(())
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let item_rows = sqlx::query(
            "SELECT id, item_type, received FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let component_rows = sqlx::query(
            r#"
            SELECT c.id, c.order_item_id, c.name, c.received
            FROM order_item_components c
            JOIN order_items i ON i.id = c.order_item_id
            WHERE i.order_id = $1
            ORDER BY c.position
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let service_rows = sqlx::query(
            r#"
            SELECT s.id, s.order_item_id, s.service_key, s.measurement,
                   s.budgeted, s.authorized, s.completed, s.base_price, s.net_price
            FROM order_services s
            JOIN order_items i ON i.id = s.order_item_id
            WHERE i.order_id = $1
            ORDER BY s.position
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut components: HashMap<Uuid, Vec<ItemComponent>> = HashMap::new();
        for row in &component_rows {
            let item_id: Uuid = row.try_get("order_item_id").map_err(backend)?;
            components.entry(item_id).or_default().push(ItemComponent {
                id: row.try_get("id").map_err(backend)?,
                name: row.try_get("name").map_err(backend)?,
                received: row.try_get("received").map_err(backend)?,
            });
        }

        let mut services: HashMap<Uuid, Vec<OrderService>> = HashMap::new();
        for row in &service_rows {
            let item_id: Uuid = row.try_get("order_item_id").map_err(backend)?;
            services.entry(item_id).or_default().push(OrderService {
                id: row.try_get("id").map_err(backend)?,
                service_key: row.try_get("service_key").map_err(backend)?,
                measurement: row.try_get("measurement").map_err(backend)?,
                budgeted: row.try_get("budgeted").map_err(backend)?,
                authorized: row.try_get("authorized").map_err(backend)?,
                completed: row.try_get("completed").map_err(backend)?,
                base_price: row.try_get("base_price").map_err(backend)?,
                net_price: row.try_get("net_price").map_err(backend)?,
            });
        }

        item_rows
            .iter()
            .map(|row| -> Result<OrderItem, StoreError> {
                let id: Uuid = row.try_get("id").map_err(backend)?;
                let raw_type: String = row.try_get("item_type").map_err(backend)?;
                Ok(OrderItem {
                    id,
                    item_type: parse_item_type(&raw_type)?,
                    received: row.try_get("received").map_err(backend)?,
                    components: components.remove(&id).unwrap_or_default(),
                    services: services.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn load_motor_info(&self, order_id: Uuid) -> Result<Option<OrderMotorInfo>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT brand, model, year, displacement, cylinders, down_payment, total_cost, fully_paid
            FROM order_motor_info WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|row| -> Result<OrderMotorInfo, StoreError> {
            Ok(OrderMotorInfo {
                brand: row.try_get("brand").map_err(backend)?,
                model: row.try_get("model").map_err(backend)?,
                year: row.try_get("year").map_err(backend)?,
                displacement: row.try_get("displacement").map_err(backend)?,
                cylinders: row.try_get("cylinders").map_err(backend)?,
                down_payment: row.try_get("down_payment").map_err(backend)?,
                total_cost: row.try_get("total_cost").map_err(backend)?,
                fully_paid: row.try_get("fully_paid").map_err(backend)?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl OrderRepository for PgOrderStore {
    async fn load(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, version, customer_id, title, description, status, priority,
                   estimated_completion, actual_completion, notes,
                   created_by, updated_by, assigned_to,
                   category_ids, attachment_ids, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::order_not_found(order_id))?;

        let raw_status: String = row.try_get("status").map_err(backend)?;
        let raw_priority: String = row.try_get("priority").map_err(backend)?;
        let category_ids: Json<Vec<Uuid>> = row.try_get("category_ids").map_err(backend)?;
        let attachment_ids: Json<Vec<Uuid>> = row.try_get("attachment_ids").map_err(backend)?;

        Ok(Order {
            id: row.try_get("id").map_err(backend)?,
            version: row.try_get("version").map_err(backend)?,
            customer_id: row.try_get("customer_id").map_err(backend)?,
            title: row.try_get("title").map_err(backend)?,
            description: row.try_get("description").map_err(backend)?,
            status: parse_status(&raw_status)?,
            priority: parse_priority(&raw_priority)?,
            estimated_completion: row.try_get("estimated_completion").map_err(backend)?,
            actual_completion: row.try_get("actual_completion").map_err(backend)?,
            notes: row.try_get("notes").map_err(backend)?,
            created_by: row.try_get("created_by").map_err(backend)?,
            updated_by: row.try_get("updated_by").map_err(backend)?,
            assigned_to: row.try_get("assigned_to").map_err(backend)?,
            category_ids: category_ids.0,
            attachment_ids: attachment_ids.0,
            motor_info: self.load_motor_info(order_id).await?,
            items: self.load_items(order_id).await?,
            created_at: row.try_get("created_at").map_err(backend)?,
            updated_at: row.try_get("updated_at").map_err(backend)?,
        })
    }

    async fn commit(
        &self,
        order: &Order,
        expected_version: Option<i64>,
        entries: &[AuditEntry],
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Dropping `tx` on any early return rolls everything back
        let new_version = Self::write_order_row(&mut tx, order, expected_version).await?;
        Self::write_children(&mut tx, order).await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO order_histories (
                    id, order_id, field_changed, old_value, new_value, comment, created_by, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.id)
            .bind(entry.order_id)
            .bind(&entry.field_changed)
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(&entry.comment)
            .bind(entry.created_by)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(|e| classify(order.id, e))?;

        tracing::debug!(
            order_id = %order.id,
            version = new_version,
            audit_entries = entries.len(),
            "Committed order"
        );

        Ok(new_version)
    }

    async fn history(
        &self,
        order_id: Uuid,
        field: Option<TrackedField>,
        query: &HistoryQuery,
    ) -> Result<(Vec<AuditEntry>, u64), StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        if !exists {
            return Err(StoreError::order_not_found(order_id));
        }

        let field_name = field.map(|f| f.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM order_histories
            WHERE order_id = $1 AND ($2::TEXT IS NULL OR field_changed = $2)
            "#,
        )
        .bind(order_id)
        .bind(field_name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let rows = sqlx::query(
            r#"
            SELECT id, order_id, field_changed, old_value, new_value, comment, created_by, created_at
            FROM order_histories
            WHERE order_id = $1 AND ($2::TEXT IS NULL OR field_changed = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(order_id)
        .bind(field_name)
        .bind(i64::from(query.per_page()))
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total.max(0) as u64))
    }

    async fn find_history_entry(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, field_changed, old_value, new_value, comment, created_by, created_at
            FROM order_histories WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(entry_from_row).transpose()
    }
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, StoreError> {
    Ok(AuditEntry {
        id: row.try_get("id").map_err(backend)?,
        order_id: row.try_get("order_id").map_err(backend)?,
        field_changed: row.try_get("field_changed").map_err(backend)?,
        old_value: row.try_get("old_value").map_err(backend)?,
        new_value: row.try_get("new_value").map_err(backend)?,
        comment: row.try_get("comment").map_err(backend)?,
        created_by: row.try_get("created_by").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.into())
}

/// Serialization failures and duplicate inserts mean another writer won.
fn classify(order_id: Uuid, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.code().as_deref() == Some("40001") {
            return StoreError::Conflict { order_id };
        }
    }
    backend(err)
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::from_canonical(raw).ok_or_else(|| {
        StoreError::Codec(CodecError::InvalidEnumValue {
            field: TrackedField::Status,
            value: raw.to_string(),
        })
    })
}

fn parse_priority(raw: &str) -> Result<OrderPriority, StoreError> {
    OrderPriority::from_canonical(raw).ok_or_else(|| {
        StoreError::Codec(CodecError::InvalidEnumValue {
            field: TrackedField::Priority,
            value: raw.to_string(),
        })
    })
}

fn parse_item_type(raw: &str) -> Result<ItemType, StoreError> {
    ItemType::from_canonical(raw)
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("unknown item type {raw:?}")))
}
