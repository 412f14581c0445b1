use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use uuid::Uuid;

use crate::collaborators::{NotificationError, NotificationSink, WorkflowNotification};

/// Publishes workflow notifications to a Redpanda topic, keyed by order id so
/// every notification for one order lands on the same partition.
///
/// Wrap in `GuardedNotificationSink` to get circuit breaking.
pub struct RedpandaNotificationSink {
    producer: FutureProducer,
    topic: String,
}

impl RedpandaNotificationSink {
    pub fn new(brokers: &str, topic: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        tracing::info!(brokers, topic, "Redpanda notification sink ready");
        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for RedpandaNotificationSink {
    async fn notify(&self, user_id: Uuid, event: &WorkflowNotification) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "recipient": user_id,
            "notification": event,
        })
        .to_string();
        let key = event.order_id.to_string();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(e, _)| NotificationError::Delivery(e.to_string()))?;

        tracing::debug!(topic = %self.topic, order_id = %event.order_id, "Published notification");
        Ok(())
    }
}
