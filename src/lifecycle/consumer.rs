use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration;

use super::service::{Disposition, OrderService};
use crate::messaging::EventChannel;

// ============================================================================
// Stock Event Consumption Loop
// ============================================================================
//
// One dedicated task pulls messages and runs the lifecycle handler
// synchronously per message, then acknowledges or requeues explicitly.
// Each handler invocation runs under its own deadline so a stalled catalog
// or store call cannot block the queue indefinitely; the deadline is
// independent of the broker's own redelivery mechanics.
//
// ============================================================================

/// Pause after a requeue so a persistently failing message cannot spin the
/// loop hot while the store recovers.
const REQUEUE_PAUSE: Duration = Duration::from_secs(1);

/// Pause after a receive error before polling again.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

pub async fn run_stock_consumer(
    channel: Arc<EventChannel>,
    service: Arc<OrderService>,
    handler_deadline: Duration,
) {
    tracing::info!("Stock event consumer started");

    loop {
        let message = match channel.recv().await {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "Failed to receive from stock_events");
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                continue;
            }
        };

        let payload = message.payload().unwrap_or_default();

        let disposition =
            match tokio::time::timeout(handler_deadline, service.handle_stock_event(payload)).await
            {
                Ok(disposition) => disposition,
                Err(_) => {
                    tracing::warn!(
                        offset = message.offset(),
                        deadline_ms = handler_deadline.as_millis(),
                        "Stock event handler exceeded its deadline"
                    );
                    Disposition::Requeue
                }
            };

        match disposition {
            Disposition::Ack => {
                if let Err(err) = channel.ack(&message) {
                    // The handler finished; a failed commit only means the
                    // message may be seen again, which the handler tolerates.
                    tracing::error!(error = %err, offset = message.offset(), "Offset commit failed");
                }
            }
            Disposition::Requeue => {
                if let Err(err) = channel.requeue(&message) {
                    tracing::error!(error = %err, offset = message.offset(), "Requeue seek failed");
                }
                tokio::time::sleep(REQUEUE_PAUSE).await;
            }
        }
    }
}
