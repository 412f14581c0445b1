use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::{
    AuditEntry, AuditLog, FieldChangeRecorder, HistoryPage, HistoryQuery, OrderSnapshot,
    PendingAuditEntry,
};
use crate::collaborators::{
    Action, AllowAll, AttachableKind, AttachableRef, AttachmentRef, AttachmentStore,
    AuthorizationGate, CatalogLookup, InMemoryAttachmentStore, NewAttachment, NotificationSink,
    Resource, WorkflowNotification,
};
use crate::domain::order::{
    truncate_timestamp, CreateOrder, CustomerApproval, GuardFailure, Order, OrderError,
    OrderService, OrderStatusMachine, ReceiveItems, SubmitBudget, TransitionPlan,
    TransitionRequest, UpdateOrder, WorkCompleted,
};
use crate::metrics::Metrics;
use crate::store::OrderRepository;

// ============================================================================
// Order Workflow Coordinator
// ============================================================================
//
// Orchestrates: authorize → load → plan → mutate → diff → commit → notify
//
// The status machine is consulted before anything is mutated, so a rejected
// request never reaches the repository. The order, its nested entities and
// the audit entries are committed in one call; notifications go out after
// the commit and are never awaited.
//
// ============================================================================

/// Who is acting, plus an optional comment copied onto every audit entry the
/// operation produces.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub actor: Uuid,
    pub comment: Option<String>,
}

impl OperationContext {
    pub fn new(actor: Uuid) -> Self {
        Self {
            actor,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

pub struct OrderWorkflowCoordinator {
    repository: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogLookup>,
    notifications: Arc<dyn NotificationSink>,
    gate: Arc<dyn AuthorizationGate>,
    attachments: Arc<dyn AttachmentStore>,
    metrics: Arc<Metrics>,
}

impl OrderWorkflowCoordinator {
    /// Permits every action and keeps attachments in memory until told
    /// otherwise.
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogLookup>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repository,
            catalog,
            notifications,
            gate: Arc::new(AllowAll),
            attachments: Arc::new(InMemoryAttachmentStore::new()),
            metrics,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = attachments;
        self
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Create an order in `Open` with its items. Writes no audit entries.
    pub async fn create_order(
        &self,
        ctx: &OperationContext,
        command: &CreateOrder,
    ) -> Result<Order, OrderError> {
        self.observed("create_order", None, async {
            let resource = Resource::NewOrder {
                customer_id: command.customer_id,
            };
            self.authorize(ctx, Action::CreateOrder, resource).await?;
            command.validate()?;

            let now = stored_now();
            let order = Order::open(command, ctx.actor, now);
            self.persist(ctx, "create_order", order, Vec::new(), now).await
        })
        .await
    }

    /// Partial update of the directly editable fields, including the
    /// administrative status override. An update that changes no tracked
    /// field commits nothing.
    pub async fn update_fields(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        update: &UpdateOrder,
    ) -> Result<Order, OrderError> {
        self.observed("update_fields", Some(order_id), async {
            self.authorize(ctx, Action::UpdateOrder, Resource::Order(order_id)).await?;
            update.validate()?;

            let (mut order, before, _) = self
                .prepare(order_id, &TransitionRequest::AdministrativeUpdate)
                .await?;
            let now = stored_now();
            apply_update(&mut order, update, now);

            let after = OrderSnapshot::capture(&order)?;
            let pending =
                FieldChangeRecorder::diff(&before, &after, ctx.actor, ctx.comment.as_deref())?;
            if pending.is_empty() {
                tracing::debug!(order_id = %order_id, "Update changed no tracked field, nothing to commit");
                return Ok(order);
            }

            order.updated_by = ctx.actor;
            order.updated_at = now;
            self.persist(ctx, "update_fields", order, pending, now).await
        })
        .await
    }

    /// Mark parts received and send the order for review.
    pub async fn receive_items(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        command: &ReceiveItems,
    ) -> Result<Order, OrderError> {
        self.observed("receive_items", Some(order_id), async {
            self.authorize(ctx, Action::ReceiveItems, Resource::Order(order_id)).await?;

            let (mut order, before, plan) = self
                .prepare(order_id, &TransitionRequest::SubmitForReview)
                .await?;
            order.mark_received(&command.item_ids, &command.component_ids)?;
            if !order.items.iter().any(|item| item.received) {
                return Err(plan.reject(GuardFailure::NoItemReceived));
            }
            self.commit(ctx, "receive_items", &before, order, plan).await
        })
        .await
    }

    /// Price each budget line through the catalog and attach it to its item.
    pub async fn submit_budget(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        command: &SubmitBudget,
    ) -> Result<Order, OrderError> {
        self.observed("submit_budget", Some(order_id), async {
            self.authorize(ctx, Action::SubmitBudget, Resource::Order(order_id)).await?;
            command.validate()?;

            let request = TransitionRequest::SubmitBudget(&command.services);
            let (mut order, before, plan) = self.prepare(order_id, &request).await?;

            for line in &command.services {
                let price = self
                    .catalog
                    .price_for(&line.service_key)
                    .await
                    .map_err(|source| OrderError::Collaborator {
                        collaborator: "catalog",
                        source,
                    })?
                    .ok_or_else(|| OrderError::not_found("catalog service", &line.service_key))?;

                order.add_budgeted_service(
                    line.order_item_id,
                    OrderService {
                        id: Uuid::now_v7(),
                        service_key: line.service_key.clone(),
                        measurement: line.measurement.clone(),
                        budgeted: true,
                        authorized: false,
                        completed: false,
                        base_price: price.base,
                        net_price: price.net_with_tax,
                    },
                )?;
            }

            self.commit(ctx, "submit_budget", &before, order, plan).await
        })
        .await
    }

    /// Authorize the approved services and record the payment terms.
    pub async fn customer_approval(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        command: &CustomerApproval,
    ) -> Result<Order, OrderError> {
        self.observed("customer_approval", Some(order_id), async {
            self.authorize(ctx, Action::RecordCustomerApproval, Resource::Order(order_id))
                .await?;
            command.validate()?;

            let request = TransitionRequest::ApproveBudget(&command.authorized_service_ids);
            let (mut order, before, plan) = self.prepare(order_id, &request).await?;
            order.authorize_services(&command.authorized_service_ids);
            order.record_payment_terms(command.down_payment);
            self.commit(ctx, "customer_approval", &before, order, plan).await
        })
        .await
    }

    /// Mark services completed. The first call moves the order into
    /// `InProgress`; later calls keep it there.
    pub async fn work_completed(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        command: &WorkCompleted,
    ) -> Result<Order, OrderError> {
        self.observed("work_completed", Some(order_id), async {
            self.authorize(ctx, Action::CompleteWork, Resource::Order(order_id)).await?;
            command.validate()?;

            let request = TransitionRequest::CompleteWork(&command.completed_service_ids);
            let (mut order, before, plan) = self.prepare(order_id, &request).await?;
            let completed = order.complete_services(&command.completed_service_ids);
            tracing::debug!(order_id = %order_id, completed, "Services completed");
            self.commit(ctx, "work_completed", &before, order, plan).await
        })
        .await
    }

    pub async fn ready_for_delivery(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
    ) -> Result<Order, OrderError> {
        self.observed("ready_for_delivery", Some(order_id), async {
            self.authorize(ctx, Action::MarkReadyForDelivery, Resource::Order(order_id))
                .await?;

            let (order, before, plan) = self
                .prepare(order_id, &TransitionRequest::MarkReadyForDelivery)
                .await?;
            self.commit(ctx, "ready_for_delivery", &before, order, plan).await
        })
        .await
    }

    pub async fn deliver(&self, ctx: &OperationContext, order_id: Uuid) -> Result<Order, OrderError> {
        self.observed("deliver", Some(order_id), async {
            self.authorize(ctx, Action::Deliver, Resource::Order(order_id)).await?;

            let (order, before, plan) = self.prepare(order_id, &TransitionRequest::Deliver).await?;
            self.commit(ctx, "deliver", &before, order, plan).await
        })
        .await
    }

    /// Store an evidence file against the order or one of its history
    /// entries. Files attached to the order are listed in its `attachments`
    /// field and audited; if that commit fails the file is removed again.
    pub async fn attach_evidence(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        target: AttachableRef,
        file: NewAttachment,
    ) -> Result<AttachmentRef, OrderError> {
        self.observed("attach_evidence", Some(order_id), async {
            self.authorize(ctx, Action::AttachEvidence, Resource::Order(order_id)).await?;

            let mut order = self.repository.load(order_id).await?;
            match target.kind {
                AttachableKind::Order => {
                    if target.id != order.id {
                        return Err(OrderError::validation("target", "must reference this order"));
                    }
                }
                AttachableKind::OrderHistory => {
                    let belongs = self
                        .repository
                        .find_history_entry(target.id)
                        .await?
                        .is_some_and(|entry| entry.order_id == order.id);
                    if !belongs {
                        return Err(OrderError::not_found("order history entry", target.id));
                    }
                }
            }

            let attachment = self
                .attachments
                .attach(file, target, ctx.actor)
                .await
                .map_err(|source| OrderError::Collaborator {
                    collaborator: "attachment store",
                    source,
                })?;

            if target.kind == AttachableKind::OrderHistory {
                tracing::info!(
                    order_id = %order_id,
                    entry_id = %target.id,
                    attachment_id = %attachment.id,
                    "Evidence attached to history entry"
                );
                return Ok(attachment);
            }

            let before = OrderSnapshot::capture(&order)?;
            order.attachment_ids.push(attachment.id);

            match self.record(ctx, "attach_evidence", &before, order, stored_now()).await {
                Ok(_) => Ok(attachment),
                Err(err) => {
                    match self.attachments.detach(attachment.id).await {
                        Ok(_) => tracing::warn!(
                            order_id = %order_id,
                            attachment_id = %attachment.id,
                            "Commit failed, attachment removed"
                        ),
                        Err(e) => tracing::error!(
                            order_id = %order_id,
                            attachment_id = %attachment.id,
                            error = %e,
                            "Commit failed and the orphaned attachment could not be removed"
                        ),
                    }
                    Err(err)
                }
            }
        })
        .await
    }

    /// One page of the order's audit history, newest first.
    pub async fn history(
        &self,
        ctx: &OperationContext,
        order_id: Uuid,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, OrderError> {
        self.observed("history", Some(order_id), async {
            self.authorize(ctx, Action::ViewHistory, Resource::Order(order_id)).await?;

            let field = query
                .field_filter()
                .map_err(|e| OrderError::validation("field", e.to_string()))?;
            let (entries, total) = self.repository.history(order_id, field, query).await?;
            AuditLog::render_page(entries, total, query).map_err(OrderError::from)
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    async fn authorize(
        &self,
        ctx: &OperationContext,
        action: Action,
        resource: Resource,
    ) -> Result<(), OrderError> {
        if self.gate.can(ctx.actor, action, &resource).await {
            return Ok(());
        }
        Err(OrderError::Forbidden {
            user: ctx.actor,
            action,
        })
    }

    /// Load the order, check the transition, snapshot the current values.
    async fn prepare(
        &self,
        order_id: Uuid,
        request: &TransitionRequest<'_>,
    ) -> Result<(Order, OrderSnapshot, TransitionPlan), OrderError> {
        let order = self.repository.load(order_id).await?;
        let plan = OrderStatusMachine::plan(&order, request)?;
        let before = OrderSnapshot::capture(&order)?;
        Ok((order, before, plan))
    }

    async fn commit(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        before: &OrderSnapshot,
        mut order: Order,
        plan: TransitionPlan,
    ) -> Result<Order, OrderError> {
        let now = stored_now();
        plan.apply(&mut order, now);
        if plan.changes_status() {
            tracing::debug!(order_id = %order.id, from = %plan.from, to = %plan.to, event = %plan.event, "Status transition");
        }
        self.record(ctx, operation, before, order, now).await
    }

    async fn record(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        before: &OrderSnapshot,
        mut order: Order,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        order.updated_by = ctx.actor;
        order.updated_at = now;

        let after = OrderSnapshot::capture(&order)?;
        let pending = FieldChangeRecorder::diff(before, &after, ctx.actor, ctx.comment.as_deref())?;
        self.persist(ctx, operation, order, pending, now).await
    }

    /// Commit the order and its audit entries. A version of 0 means the
    /// order has never been stored.
    async fn persist(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        mut order: Order,
        pending: Vec<PendingAuditEntry>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let entries: Vec<AuditEntry> = pending
            .into_iter()
            .map(|p| AuditEntry::from_pending(order.id, p, now))
            .collect();
        let expected_version = (order.version > 0).then_some(order.version);

        order.version = self
            .repository
            .commit(&order, expected_version, &entries)
            .await?;

        for entry in &entries {
            self.metrics.record_audit_entry(&entry.field_changed);
        }
        tracing::info!(
            order_id = %order.id,
            operation,
            version = order.version,
            status = %order.status,
            audit_entries = entries.len(),
            "Order committed"
        );

        self.notify_assignee(ctx, operation, &order);
        Ok(order)
    }

    /// Fire-and-forget. Failures are logged and counted, never returned.
    fn notify_assignee(&self, ctx: &OperationContext, operation: &'static str, order: &Order) {
        let Some(assignee) = order.assigned_to else {
            return;
        };

        let event = WorkflowNotification {
            order_id: order.id,
            operation,
            status: order.status,
            actor: ctx.actor,
            occurred_at: order.updated_at,
        };
        let sink = Arc::clone(&self.notifications);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            if let Err(e) = sink.notify(assignee, &event).await {
                metrics.record_notification_failure();
                tracing::warn!(
                    order_id = %event.order_id,
                    operation = event.operation,
                    user_id = %assignee,
                    error = %e,
                    "Notification failed"
                );
            }
        });
    }

    /// Time the operation and classify its outcome for metrics and logs.
    async fn observed<T>(
        &self,
        operation: &'static str,
        order_id: Option<Uuid>,
        work: impl Future<Output = Result<T, OrderError>>,
    ) -> Result<T, OrderError> {
        let started = Instant::now();
        let result = work.await;

        let outcome = match &result {
            Ok(_) => "succeeded",
            Err(OrderError::InvalidTransition { from, event, guard }) => {
                self.metrics.record_rejection(event.as_str());
                tracing::warn!(
                    operation,
                    order_id = ?order_id,
                    from = %from,
                    event = %event,
                    guard = %guard,
                    "Transition rejected"
                );
                "rejected"
            }
            Err(OrderError::ConcurrencyConflict(id)) => {
                tracing::warn!(operation, order_id = %id, "Concurrent modification detected");
                "conflict"
            }
            Err(e) if e.is_user_correctable() => {
                tracing::warn!(operation, order_id = ?order_id, error = %e, "Operation rejected");
                "rejected"
            }
            Err(e) => {
                tracing::error!(operation, order_id = ?order_id, error = ?e, "Operation failed");
                "failed"
            }
        };

        self.metrics
            .record_operation(operation, outcome, started.elapsed().as_secs_f64());
        result
    }
}

/// Current time at the precision the store keeps.
fn stored_now() -> DateTime<Utc> {
    truncate_timestamp(Utc::now())
}

fn apply_update(order: &mut Order, update: &UpdateOrder, now: DateTime<Utc>) {
    if let Some(title) = &update.title {
        order.title = title.trim().to_string();
    }
    if let Some(description) = &update.description {
        order.description = description.clone();
    }
    if let Some(priority) = update.priority {
        order.priority = priority;
    }
    if let Some(estimated) = update.estimated_completion {
        order.estimated_completion = estimated.map(truncate_timestamp);
    }
    if let Some(notes) = &update.notes {
        order.notes = notes.clone();
    }
    // Clearing the assignee is rejected by validation
    if let Some(Some(assignee)) = update.assigned_to {
        order.assigned_to = Some(assignee);
    }
    if let Some(categories) = &update.category_ids {
        order.category_ids = categories.clone();
    }
    if let Some(status) = update.status {
        OrderStatusMachine::override_status(order, status, now);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
