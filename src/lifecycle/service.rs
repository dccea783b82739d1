use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::transition::{plan_transition, ConflictPolicy, TransitionPlan};
use crate::enrichment::{EnrichedOrder, Enricher};
use crate::errors::ServiceError;
use crate::messaging::EventChannel;
use crate::metrics::Metrics;
use crate::models::{
    AuthContext, CreateOrderRequest, NewOrder, Order, OrderCreatedEvent, OrderStatus,
    StockEventEnvelope, StockEventKind, UpdateOrderRequest,
};
use crate::store::{OrderPatch, OrderStore, StoreError};

// ============================================================================
// Order Service
// ============================================================================
//
// Creation persists first and publishes second: the store write is the
// source of truth, the order_created event is a best-effort notification.
// The stock-event path is the other half of the protocol - it must only
// acknowledge a message once the store reflects it, because the
// non-acknowledged redelivery is what makes queue and store converge.
//
// ============================================================================

/// Explicit accept/reject decision for one consumed stock event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished (or the message is poison); commit the offset
    Ack,
    /// Processing must happen again; leave the message for redelivery
    Requeue,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    channel: Option<Arc<EventChannel>>,
    enricher: Enricher,
    metrics: Arc<Metrics>,
    conflict_policy: ConflictPolicy,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        channel: Option<Arc<EventChannel>>,
        enricher: Enricher,
        metrics: Arc<Metrics>,
        conflict_policy: ConflictPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            enricher,
            metrics,
            conflict_policy,
        }
    }

    // ------------------------------------------------------------------------
    // Creation flow
    // ------------------------------------------------------------------------

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        Self::validate_request(&request)?;

        let new_order = NewOrder {
            client_id: request.client_id,
            products: request.products,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };

        let order = self
            .store
            .insert(new_order)
            .await
            .map_err(|err| match err {
                StoreError::Backend(cause) => ServiceError::Store(cause),
                // Insert has no document to miss; treat it as a backend fault.
                StoreError::NotFound => ServiceError::Store(anyhow::anyhow!(
                    "store reported not-found during insert"
                )),
            })?;

        self.metrics.orders_created.inc();
        tracing::info!(
            order_id = %order.id,
            client_id = %order.client_id,
            item_count = order.products.len(),
            "Order created"
        );

        self.publish_created(&order).await;

        Ok(order)
    }

    fn validate_request(request: &CreateOrderRequest) -> Result<(), ServiceError> {
        if request.client_id.trim().is_empty() {
            return Err(ServiceError::Validation("clientId must not be empty".into()));
        }
        if request.products.is_empty() {
            return Err(ServiceError::Validation(
                "an order needs at least one line item".into(),
            ));
        }
        for item in &request.products {
            if item.product_id.trim().is_empty() {
                return Err(ServiceError::Validation("productId must not be empty".into()));
            }
            if item.quantity <= 0 {
                return Err(ServiceError::Validation(format!(
                    "invalid quantity {} for product {}",
                    item.quantity, item.product_id
                )));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(ServiceError::Validation(format!(
                    "invalid price {} for product {}",
                    item.price, item.product_id
                )));
            }
        }
        Ok(())
    }

    /// Publication happens after persistence and never fails the request.
    /// Losing the event starves the downstream stock check of this order,
    /// so every failure path here must stay observable.
    async fn publish_created(&self, order: &Order) {
        match &self.channel {
            None => {
                tracing::error!(
                    order_id = %order.id,
                    "No live event channel, order_created event was not published"
                );
                self.metrics.record_publish_failure("no_channel");
            }
            Some(channel) => {
                let event = OrderCreatedEvent::for_order(order);
                match channel.publish_order_created(&event).await {
                    Ok(()) => self.metrics.order_events_published.inc(),
                    Err(err) => {
                        tracing::error!(
                            order_id = %order.id,
                            error = %err,
                            "order_created event lost; order stays pending until reconciled"
                        );
                        self.metrics.record_publish_failure("publish_error");
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads (enriched)
    // ------------------------------------------------------------------------

    pub async fn get_order(
        &self,
        id: Uuid,
        auth: &AuthContext,
    ) -> Result<EnrichedOrder, ServiceError> {
        let order = self
            .store
            .get(id)
            .await
            .map_err(|err| ServiceError::from_store(err, id))?;

        Ok(self.enricher.enrich_one(&order, auth).await)
    }

    pub async fn list_orders(&self, auth: &AuthContext) -> Result<Vec<EnrichedOrder>, ServiceError> {
        let orders = self
            .store
            .list_all()
            .await
            .map_err(|err| match err {
                StoreError::NotFound => ServiceError::Store(anyhow::anyhow!(
                    "store reported not-found while listing"
                )),
                StoreError::Backend(cause) => ServiceError::Store(cause),
            })?;

        Ok(self.enricher.enrich_many(&orders, auth).await)
    }

    // ------------------------------------------------------------------------
    // Administrative update / delete
    // ------------------------------------------------------------------------

    pub async fn update_order(
        &self,
        id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<Order, ServiceError> {
        let Some(status) = request.order_status else {
            return Err(ServiceError::Validation(
                "update carries no patchable field".into(),
            ));
        };

        let order = self
            .store
            .update(id, OrderPatch::status(status))
            .await
            .map_err(|err| ServiceError::from_store(err, id))?;

        tracing::info!(order_id = %id, status = status.as_str(), "Order patched");
        Ok(order)
    }

    pub async fn delete_order(&self, id: Uuid) -> Result<Order, ServiceError> {
        let order = self
            .store
            .delete(id)
            .await
            .map_err(|err| ServiceError::from_store(err, id))?;

        tracing::info!(order_id = %id, "Order deleted");
        Ok(order)
    }

    // ------------------------------------------------------------------------
    // Stock event handling
    // ------------------------------------------------------------------------

    /// Drive the transition function with one raw message from the
    /// stock_events queue and decide its fate explicitly.
    ///
    /// Poison messages (unparseable, unrecognized kind) are acknowledged so
    /// they cannot loop forever; a missing order or a failing store keeps
    /// the message unacknowledged so redelivery retries it.
    pub async fn handle_stock_event(&self, payload: &[u8]) -> Disposition {
        let started = Instant::now();

        let envelope: StockEventEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "Unparseable stock event, dropping as poison");
                self.record("unknown", "poison", started);
                return Disposition::Ack;
            }
        };

        let Some(kind) = StockEventKind::from_event_name(&envelope.event) else {
            tracing::warn!(
                event = %envelope.event,
                order_id = %envelope.data.order_id,
                "Unrecognized stock event kind, acknowledging without transition"
            );
            self.record(&envelope.event, "unknown_kind", started);
            return Disposition::Ack;
        };

        let order_id = envelope.data.order_id;
        let order = match self.store.get(order_id).await {
            Ok(order) => order,
            Err(StoreError::NotFound) => {
                tracing::warn!(
                    order_id = %order_id,
                    event = %envelope.event,
                    "Stock event references an unknown order, leaving it for redelivery"
                );
                self.record(&envelope.event, "missing_order", started);
                return Disposition::Requeue;
            }
            Err(StoreError::Backend(err)) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %err,
                    "Store unavailable while handling stock event"
                );
                self.record(&envelope.event, "store_error", started);
                return Disposition::Requeue;
            }
        };

        match plan_transition(order.status, kind, self.conflict_policy) {
            TransitionPlan::Apply(next) => {
                match self.store.update(order_id, OrderPatch::status(next)).await {
                    Ok(_) => {
                        tracing::info!(
                            order_id = %order_id,
                            from = order.status.as_str(),
                            to = next.as_str(),
                            "Order status reconciled"
                        );
                        self.record(&envelope.event, "applied", started);
                        Disposition::Ack
                    }
                    Err(StoreError::NotFound) => {
                        tracing::warn!(
                            order_id = %order_id,
                            "Order vanished between read and status write"
                        );
                        self.record(&envelope.event, "missing_order", started);
                        Disposition::Requeue
                    }
                    Err(StoreError::Backend(err)) => {
                        tracing::error!(
                            order_id = %order_id,
                            error = %err,
                            "Status write failed, leaving message for redelivery"
                        );
                        self.record(&envelope.event, "store_error", started);
                        Disposition::Requeue
                    }
                }
            }
            TransitionPlan::AlreadyApplied => {
                tracing::debug!(
                    order_id = %order_id,
                    status = order.status.as_str(),
                    "Stock event redelivered after terminal status, no-op"
                );
                self.record(&envelope.event, "noop", started);
                Disposition::Ack
            }
            TransitionPlan::Rejected { current } => {
                tracing::warn!(
                    order_id = %order_id,
                    current = current.as_str(),
                    event = %envelope.event,
                    "Conflicting terminal stock event, keeping stored status"
                );
                self.record(&envelope.event, "conflict", started);
                Disposition::Ack
            }
        }
    }

    fn record(&self, event: &str, outcome: &str, started: Instant) {
        self.metrics
            .record_stock_event(event, outcome, started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProductSnapshot, ProductSource};
    use crate::models::LineItem;
    use crate::store::MemoryOrderStore;
    use async_trait::async_trait;

    struct EmptyCatalog;

    #[async_trait]
    impl ProductSource for EmptyCatalog {
        async fn fetch_catalog(&self, _auth: &AuthContext) -> Vec<ProductSnapshot> {
            Vec::new()
        }
    }

    fn service() -> OrderService {
        service_with_policy(ConflictPolicy::KeepFirst)
    }

    fn service_with_policy(policy: ConflictPolicy) -> OrderService {
        OrderService::new(
            Arc::new(MemoryOrderStore::new()),
            None,
            Enricher::new(Arc::new(EmptyCatalog)),
            Arc::new(Metrics::new().unwrap()),
            policy,
        )
    }

    fn request(client_id: &str, products: Vec<LineItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            client_id: client_id.to_string(),
            products,
        }
    }

    fn item(product_id: &str, quantity: i32, price: f64) -> LineItem {
        LineItem {
            product_id: product_id.to_string(),
            quantity,
            price,
        }
    }

    fn stock_event(event: &str, order_id: Uuid) -> Vec<u8> {
        format!(r#"{{"event":"{event}","data":{{"orderId":"{order_id}"}}}}"#).into_bytes()
    }

    #[tokio::test]
    async fn test_creation_yields_pending_order_with_unmodified_items() {
        let svc = service();

        let order = svc
            .create_order(request(
                "c1",
                vec![item("p1", 2, 10.0), item("p2", 1, 3.5)],
            ))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.products.len(), 2);
        assert_eq!(order.products[0], item("p1", 2, 10.0));
        assert_eq!(order.products[1], item("p2", 1, 3.5));
    }

    #[tokio::test]
    async fn test_creation_rejects_malformed_requests() {
        let svc = service();

        let empty_items = svc.create_order(request("c1", vec![])).await.unwrap_err();
        assert!(matches!(empty_items, ServiceError::Validation(_)));

        let zero_quantity = svc
            .create_order(request("c1", vec![item("p1", 0, 10.0)]))
            .await
            .unwrap_err();
        assert!(matches!(zero_quantity, ServiceError::Validation(_)));

        let negative_price = svc
            .create_order(request("c1", vec![item("p1", 1, -1.0)]))
            .await
            .unwrap_err();
        assert!(matches!(negative_price, ServiceError::Validation(_)));

        let blank_client = svc
            .create_order(request("  ", vec![item("p1", 1, 1.0)]))
            .await
            .unwrap_err();
        assert!(matches!(blank_client, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_order_distinguishes_not_found() {
        let svc = service();
        let err = svc
            .get_order(Uuid::new_v4(), &AuthContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_patch_and_unknown_id() {
        let svc = service();

        let empty = svc
            .update_order(Uuid::new_v4(), UpdateOrderRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(empty, ServiceError::Validation(_)));

        let missing = svc
            .update_order(
                Uuid::new_v4(),
                UpdateOrderRequest {
                    order_status: Some(OrderStatus::Failed),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_administrative_status_patch() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 1.0)]))
            .await
            .unwrap();

        let updated = svc
            .update_order(
                order.id,
                UpdateOrderRequest {
                    order_status: Some(OrderStatus::Failed),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_delete_then_lookup_is_not_found() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 1.0)]))
            .await
            .unwrap();

        svc.delete_order(order.id).await.unwrap();

        let err = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = svc.delete_order(order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stock_validated_transitions_pending_order() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 2, 10.0)]))
            .await
            .unwrap();

        let disposition = svc
            .handle_stock_event(&stock_event("stock_validated", order.id))
            .await;
        assert_eq!(disposition, Disposition::Ack);

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Validated);
    }

    #[tokio::test]
    async fn test_stock_failed_transitions_pending_order() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 5.0)]))
            .await
            .unwrap();

        let disposition = svc
            .handle_stock_event(&stock_event("stock_failed", order.id))
            .await;
        assert_eq!(disposition, Disposition::Ack);

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_redelivered_terminal_event_is_acked_noop() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 5.0)]))
            .await
            .unwrap();

        let payload = stock_event("stock_validated", order.id);
        assert_eq!(svc.handle_stock_event(&payload).await, Disposition::Ack);
        assert_eq!(svc.handle_stock_event(&payload).await, Disposition::Ack);

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Validated);
    }

    #[tokio::test]
    async fn test_conflicting_terminal_event_keeps_first_outcome() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 5.0)]))
            .await
            .unwrap();

        svc.handle_stock_event(&stock_event("stock_validated", order.id))
            .await;
        let disposition = svc
            .handle_stock_event(&stock_event("stock_failed", order.id))
            .await;

        // Acked (the message is processed), but the stored status survives.
        assert_eq!(disposition, Disposition::Ack);
        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Validated);
    }

    #[tokio::test]
    async fn test_conflicting_terminal_event_flips_under_overwrite() {
        let svc = service_with_policy(ConflictPolicy::Overwrite);
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 5.0)]))
            .await
            .unwrap();

        svc.handle_stock_event(&stock_event("stock_validated", order.id))
            .await;
        svc.handle_stock_event(&stock_event("stock_failed", order.id))
            .await;

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_event_for_unknown_order_is_requeued() {
        let svc = service();
        let disposition = svc
            .handle_stock_event(&stock_event("stock_validated", Uuid::new_v4()))
            .await;
        assert_eq!(disposition, Disposition::Requeue);
    }

    #[tokio::test]
    async fn test_poison_payload_is_acked() {
        let svc = service();
        assert_eq!(
            svc.handle_stock_event(b"not json at all").await,
            Disposition::Ack
        );
        assert_eq!(
            svc.handle_stock_event(br#"{"event":"stock_validated"}"#).await,
            Disposition::Ack
        );
    }

    #[tokio::test]
    async fn test_unrecognized_kind_is_acked_without_transition() {
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 5.0)]))
            .await
            .unwrap();

        let disposition = svc
            .handle_stock_event(&stock_event("stock_reserved", order.id))
            .await;
        assert_eq!(disposition, Disposition::Ack);

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_end_to_end_create_validate_read() {
        let svc = service();

        let order = svc
            .create_order(request("c1", vec![item("p1", 2, 10.0)]))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let payload =
            format!(r#"{{"event":"stock_validated","data":{{"orderId":"{}"}}}}"#, order.id);
        assert_eq!(
            svc.handle_stock_event(payload.as_bytes()).await,
            Disposition::Ack
        );

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Validated);
        assert_eq!(read.products.len(), 1);
        assert_eq!(read.products[0].quantity, 2);
        assert_eq!(read.products[0].price, 10.0);
    }

    #[tokio::test]
    async fn test_creation_without_channel_still_persists() {
        // Test mode runs without a broker; the order must exist regardless,
        // and the dropped event is counted.
        let svc = service();
        let order = svc
            .create_order(request("c1", vec![item("p1", 1, 2.0)]))
            .await
            .unwrap();

        let read = svc
            .get_order(order.id, &AuthContext::anonymous())
            .await
            .unwrap();
        assert_eq!(read.status, OrderStatus::Pending);
    }
}
