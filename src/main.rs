use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use service_orders::audit::HistoryQuery;
use service_orders::collaborators::{
    AttachableRef, GuardedNotificationSink, NewAttachment, NotificationSink, TracingNotificationSink,
};
use service_orders::config::{AppConfig, NotificationSettings};
use service_orders::domain::order::{
    BudgetLine, CreateOrder, CustomerApproval, ItemType, NewItem, NewMotorInfo, OrderError,
    OrderPriority, ReceiveItems, SubmitBudget, UpdateOrder, WorkCompleted,
};
use service_orders::metrics::{self, Metrics};
use service_orders::store::{InMemoryOrderStore, OrderRepository, PgOrderStore};
use service_orders::utils::{retry_on_transient, RetryConfig};
use service_orders::workflow::{OperationContext, OrderWorkflowCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,service_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting service order workflow");

    let config = AppConfig::load()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if config.metrics.enabled {
        let registry = Arc::new(metrics.registry().clone());
        let port = config.metrics.port;
        std::thread::spawn(move || {
            let served = actix_web::rt::System::new()
                .block_on(metrics::start_metrics_server(registry, port));
            if let Err(e) = served {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    // === 2. Order repository ===
    let repository: Arc<dyn OrderRepository> = match &config.database.url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = PgOrderStore::connect(url, config.database.max_connections).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::info!("No database configured, using the in-memory store");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    // === 3. Collaborators ===
    let notifications = notification_sink(&config.notifications)?;
    let coordinator = OrderWorkflowCoordinator::new(
        repository,
        Arc::new(config.catalog.build_catalog()),
        notifications,
        metrics.clone(),
    );

    // === 4. Demonstrate the full lifecycle ===
    let mut service_keys: Vec<String> = config.catalog.services.keys().cloned().collect();
    service_keys.sort();
    run_lifecycle(&coordinator, &config.retry.retry_config(), &service_keys).await?;

    if config.metrics.enabled {
        tracing::info!(port = config.metrics.port, "Serving metrics, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("🎉 Done");
    Ok(())
}

fn notification_sink(settings: &NotificationSettings) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let breaker = settings.breaker_config();
    if let Some(sink) = broker_sink(settings, &breaker)? {
        return Ok(sink);
    }
    Ok(Arc::new(GuardedNotificationSink::new(TracingNotificationSink, breaker)))
}

#[cfg(feature = "redpanda")]
fn broker_sink(
    settings: &NotificationSettings,
    breaker: &service_orders::utils::CircuitBreakerConfig,
) -> anyhow::Result<Option<Arc<dyn NotificationSink>>> {
    use service_orders::messaging::RedpandaNotificationSink;

    let Some(redpanda) = &settings.redpanda else {
        return Ok(None);
    };
    tracing::info!(brokers = %redpanda.brokers, topic = %redpanda.topic, "Publishing notifications to Redpanda");
    let sink = RedpandaNotificationSink::new(&redpanda.brokers, &redpanda.topic)?;
    Ok(Some(Arc::new(GuardedNotificationSink::new(sink, breaker.clone()))))
}

#[cfg(not(feature = "redpanda"))]
fn broker_sink(
    settings: &NotificationSettings,
    _breaker: &service_orders::utils::CircuitBreakerConfig,
) -> anyhow::Result<Option<Arc<dyn NotificationSink>>> {
    if settings.redpanda.is_some() {
        tracing::warn!("Redpanda is configured but this build lacks the `redpanda` feature");
    }
    Ok(None)
}

/// Re-run an operation while it keeps hitting concurrent modifications.
async fn retrying<T, F, Fut>(retry: &RetryConfig, operation: F) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, OrderError>>,
{
    Ok(retry_on_transient(retry, operation).await.into_result()?)
}

async fn run_lifecycle(
    coordinator: &OrderWorkflowCoordinator,
    retry: &RetryConfig,
    service_keys: &[String],
) -> anyhow::Result<()> {
    let ctx = OperationContext::new(Uuid::new_v4());

    let create = CreateOrder {
        customer_id: Uuid::new_v4(),
        title: "Rebuild 1.8L engine".to_string(),
        description: Some("Loss of compression on cylinder 3".to_string()),
        priority: Some(OrderPriority::High),
        assigned_to: Some(Uuid::new_v4()),
        estimated_completion: None,
        notes: None,
        category_ids: vec![Uuid::new_v4()],
        motor_info: Some(NewMotorInfo {
            brand: Some("Nissan".to_string()),
            model: Some("GA16DE".to_string()),
            year: Some("2001".to_string()),
            cylinders: Some("4".to_string()),
            ..Default::default()
        }),
        items: vec![
            NewItem {
                item_type: ItemType::EngineBlock,
                components: vec!["pistons".to_string(), "main bearings".to_string()],
            },
            NewItem {
                item_type: ItemType::CylinderHead,
                components: vec!["valves".to_string()],
            },
        ],
    };
    let order = coordinator.create_order(&ctx, &create).await?;
    let id = order.id;
    tracing::info!(order_id = %id, "✅ Order created");

    let update = UpdateOrder {
        priority: Some(OrderPriority::Urgent),
        notes: Some(Some("Customer needs it by Friday".to_string())),
        ..Default::default()
    };
    let noted = ctx.clone().with_comment("customer called");
    retrying(retry, |_| coordinator.update_fields(&noted, id, &update)).await?;

    let receive = ReceiveItems::default();
    let order = retrying(retry, |_| coordinator.receive_items(&ctx, id, &receive)).await?;
    tracing::info!(order_id = %id, status = %order.status, "✅ Items received");

    if service_keys.is_empty() {
        tracing::warn!("No catalog services configured, stopping after intake");
        return print_history(coordinator, &ctx, id).await;
    }

    let budget = SubmitBudget {
        services: order
            .items
            .iter()
            .zip(service_keys.iter().cycle())
            .map(|(item, key)| BudgetLine {
                order_item_id: item.id,
                service_key: key.clone(),
                measurement: None,
            })
            .collect(),
    };
    let order = retrying(retry, |_| coordinator.submit_budget(&ctx, id, &budget)).await?;
    tracing::info!(order_id = %id, total = %order.budget_total(), "✅ Budget submitted");

    let services: Vec<Uuid> = order.services().map(|s| s.id).collect();
    let approval = CustomerApproval {
        authorized_service_ids: services.clone(),
        down_payment: Some(order.budget_total() / Decimal::TWO),
    };
    retrying(retry, |_| coordinator.customer_approval(&ctx, id, &approval)).await?;

    let completed = WorkCompleted {
        completed_service_ids: services,
    };
    retrying(retry, |_| coordinator.work_completed(&ctx, id, &completed)).await?;
    retrying(retry, |_| coordinator.ready_for_delivery(&ctx, id)).await?;
    let order = retrying(retry, |_| coordinator.deliver(&ctx, id)).await?;
    tracing::info!(order_id = %id, status = %order.status, "✅ Order delivered");

    let evidence = NewAttachment {
        file_name: "delivery-receipt.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: b"%PDF-1.7".to_vec(),
    };
    match coordinator
        .attach_evidence(&ctx, id, AttachableRef::order(id), evidence)
        .await
    {
        Ok(attachment) => tracing::info!(attachment_id = %attachment.id, "📎 Evidence attached"),
        Err(e) => tracing::warn!(error = %e, "Could not attach evidence"),
    }

    print_history(coordinator, &ctx, id).await
}

async fn print_history(
    coordinator: &OrderWorkflowCoordinator,
    ctx: &OperationContext,
    order_id: Uuid,
) -> anyhow::Result<()> {
    let query = HistoryQuery {
        per_page: Some(100),
        ..Default::default()
    };
    let page = coordinator.history(ctx, order_id, &query).await?;

    tracing::info!(order_id = %order_id, total = page.total, "📜 Order history");
    for entry in page.entries.iter().rev() {
        tracing::info!(
            at = %entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            field = %entry.field_changed,
            "{}",
            entry.description
        );
    }
    Ok(())
}
