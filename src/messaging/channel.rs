use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::models::OrderCreatedEvent;
use crate::utils::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitState, RetryConfig, RetryResult};

pub const ORDER_EVENTS_TOPIC: &str = "order_events";
pub const STOCK_EVENTS_TOPIC: &str = "stock_events";

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub brokers: String,
    pub consumer_group: String,
    /// Startup probe attempts before the broker is declared unreachable
    pub connect_attempts: u32,
    /// Fixed delay between startup probe attempts
    pub connect_delay: Duration,
    pub publish_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".to_string(),
            consumer_group: "order-reconciler".to_string(),
            connect_attempts: 5,
            connect_delay: Duration::from_secs(3),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Event Channel
// ============================================================================
//
// One shared handle serves both directions: the producer publishes
// order_created envelopes, the consumer feeds the stock-event loop.
// Delivery is at-least-once on both sides - the producer may retry a send
// internally, and a consumed message is only committed after its handler
// finished. librdkafka re-establishes broker connections itself and keeps
// the subscription registered across reconnects.
//
// ============================================================================

pub struct EventChannel {
    producer: FutureProducer,
    consumer: StreamConsumer,
    breaker: CircuitBreaker,
    publish_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl EventChannel {
    /// Build the full channel lifecycle in one step: probe the broker with a
    /// bounded fixed-backoff retry, declare both queues idempotently,
    /// register the consumer. A returned channel is connected and ready.
    pub async fn connect(config: &ChannelConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.consumer_group)
            .set("bootstrap.servers", &config.brokers)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        let retry = RetryConfig::fixed(config.connect_attempts, config.connect_delay);
        let probe = retry_with_backoff(retry, |attempt| {
            let consumer = &consumer;
            let brokers = &config.brokers;
            async move {
                tracing::debug!(attempt = attempt, brokers = %brokers, "Probing broker");
                consumer
                    .fetch_metadata(None, Duration::from_secs(5))
                    .map(|_| ())
                    .map_err(|e| anyhow::anyhow!("broker metadata probe failed: {e}"))
            }
        })
        .await;

        if let RetryResult::Failed(err) = probe {
            anyhow::bail!(
                "broker {} unreachable after {} attempts: {err}",
                config.brokers,
                config.connect_attempts
            );
        }

        Self::declare_topics(config).await?;

        consumer.subscribe(&[STOCK_EVENTS_TOPIC])?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            )
            .create()?;

        tracing::info!(
            brokers = %config.brokers,
            group = %config.consumer_group,
            "Event channel connected"
        );

        Ok(Self {
            producer,
            consumer,
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_secs(30),
                success_threshold: 3,
            }),
            publish_timeout: config.publish_timeout,
            metrics,
        })
    }

    /// Queue declaration is a no-op when the topic already exists.
    async fn declare_topics(config: &ChannelConfig) -> anyhow::Result<()> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .create()?;

        let topics = [
            NewTopic::new(ORDER_EVENTS_TOPIC, 1, TopicReplication::Fixed(1)),
            NewTopic::new(STOCK_EVENTS_TOPIC, 1, TopicReplication::Fixed(1)),
        ];

        let results = admin.create_topics(&topics, &AdminOptions::new()).await?;
        for result in results {
            match result {
                Ok(topic) => tracing::debug!(topic = %topic, "Declared queue"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %topic, "Queue already declared");
                }
                Err((topic, code)) => {
                    anyhow::bail!("failed to declare queue {topic}: {code}");
                }
            }
        }

        Ok(())
    }

    /// Publish an order_created envelope, keyed by order id, as canonical
    /// JSON. Failures surface to the caller; the circuit breaker keeps a
    /// dead broker from stalling every creation request behind a timeout.
    pub async fn publish_order_created(&self, event: &OrderCreatedEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        let key = event.data.order_id.to_string();

        let result = self
            .breaker
            .call(async {
                let record = FutureRecord::to(ORDER_EVENTS_TOPIC)
                    .key(&key)
                    .payload(&payload);

                self.producer
                    .send(record, Timeout::After(self.publish_timeout))
                    .await
                    .map_err(|(e, _)| anyhow::anyhow!("broker send error: {e}"))?;

                Ok::<(), anyhow::Error>(())
            })
            .await;

        self.metrics
            .update_circuit_breaker_state(match self.breaker.get_state().await {
                CircuitState::Closed => 0,
                CircuitState::Open => 1,
                CircuitState::HalfOpen => 2,
            });

        match result {
            Ok(()) => {
                tracing::info!(
                    order_id = %key,
                    topic = ORDER_EVENTS_TOPIC,
                    "Published order_created event"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    order_id = %key,
                    topic = ORDER_EVENTS_TOPIC,
                    "Publish rejected, circuit breaker open"
                );
                Err(anyhow::anyhow!("event channel circuit open"))
            }
            Err(CircuitBreakerError::OperationFailed(err)) => {
                tracing::error!(
                    order_id = %key,
                    error = %err,
                    "Failed to publish order_created event"
                );
                Err(err)
            }
        }
    }

    /// Pull the next message from the stock_events queue.
    pub async fn recv(&self) -> KafkaResult<BorrowedMessage<'_>> {
        self.consumer.recv().await
    }

    /// Acknowledge a handled message by committing its offset. Called only
    /// after the handler succeeded; a crash before this point redelivers.
    pub fn ack(&self, message: &BorrowedMessage<'_>) -> KafkaResult<()> {
        self.consumer.commit_message(message, CommitMode::Async)
    }

    /// Put a message back: seek the partition to the failed offset so the
    /// next poll delivers it again.
    pub fn requeue(&self, message: &BorrowedMessage<'_>) -> KafkaResult<()> {
        self.consumer.seek(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset()),
            Duration::from_secs(5),
        )
    }
}
