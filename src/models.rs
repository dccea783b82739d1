use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

/// A persisted order, tracked through the fulfillment status lifecycle.
///
/// Line items are fixed at creation time; only `status` changes afterwards,
/// and only through the lifecycle transition path or an administrative patch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub client_id: String,
    pub products: Vec<LineItem>,
    #[serde(rename = "orderStatus")]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// One product entry within an order. The price is captured at order time so
/// later catalog price changes never rewrite what the client agreed to pay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Foreign reference into the external product catalog. The catalog keys
    /// products numerically, so comparisons are done on normalized strings.
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Validated,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Validated => "validated",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(OrderStatus::Pending),
            "validated" => Some(OrderStatus::Validated),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// `validated` and `failed` are terminal: no automatic transition leads
    /// out of them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// An order as handed to the store for insertion; the store assigns identity.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub client_id: String,
    pub products: Vec<LineItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request Payloads
// ============================================================================

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub client_id: String,
    pub products: Vec<LineItem>,
}

/// Administrative partial update. Line items are immutable after creation,
/// so status is the only patchable field.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub order_status: Option<OrderStatus>,
}

// ============================================================================
// Wire Events
// ============================================================================

pub const ORDER_CREATED_EVENT: &str = "order_created";
pub const STOCK_VALIDATED_EVENT: &str = "stock_validated";
pub const STOCK_FAILED_EVENT: &str = "stock_failed";

/// Outbound `order_events` envelope, published once per successful creation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCreatedEvent {
    pub event: String,
    pub data: OrderCreatedData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedData {
    pub order_id: Uuid,
    pub client_id: String,
    pub products: Vec<LineItem>,
    pub order_status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub fn for_order(order: &Order) -> Self {
        Self {
            event: ORDER_CREATED_EVENT.to_string(),
            data: OrderCreatedData {
                order_id: order.id,
                client_id: order.client_id.clone(),
                products: order.products.clone(),
                order_status: order.status,
                created_at: order.created_at,
            },
        }
    }
}

/// Inbound `stock_events` envelope. The stock service may attach extra
/// fields (clientId and friends); only the order reference matters here.
#[derive(Deserialize, Clone, Debug)]
pub struct StockEventEnvelope {
    pub event: String,
    pub data: StockEventData,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StockEventData {
    pub order_id: Uuid,
}

/// The recognized stock validation outcomes. Anything else on the queue is
/// treated as an anomaly, not a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockEventKind {
    Validated,
    Failed,
}

impl StockEventKind {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            STOCK_VALIDATED_EVENT => Some(StockEventKind::Validated),
            STOCK_FAILED_EVENT => Some(StockEventKind::Failed),
            _ => None,
        }
    }

    pub fn target_status(&self) -> OrderStatus {
        match self {
            StockEventKind::Validated => OrderStatus::Validated,
            StockEventKind::Failed => OrderStatus::Failed,
        }
    }
}

// ============================================================================
// Request Authentication Context
// ============================================================================

/// Principal attached by the upstream capability gate. This service never
/// verifies credentials itself; it only forwards the bearer token to the
/// external catalog when the configured policy asks for it.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    pub bearer_token: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { bearer_token: None }
    }

    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Validated,
            OrderStatus::Failed,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            let back: OrderStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, back);
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn test_order_status_wire_format_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Validated.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_order_created_event_wire_shape() {
        let order = Order {
            id: Uuid::new_v4(),
            client_id: "c1".to_string(),
            products: vec![LineItem {
                product_id: "p1".to_string(),
                quantity: 2,
                price: 10.0,
            }],
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };

        let event = OrderCreatedEvent::for_order(&order);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["event"], "order_created");
        assert_eq!(json["data"]["orderId"], order.id.to_string());
        assert_eq!(json["data"]["clientId"], "c1");
        assert_eq!(json["data"]["orderStatus"], "pending");
        assert_eq!(json["data"]["products"][0]["productId"], "p1");
        assert_eq!(json["data"]["products"][0]["quantity"], 2);
        assert_eq!(json["data"]["products"][0]["price"], 10.0);
    }

    #[test]
    fn test_stock_event_envelope_parses_with_extra_fields() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"event":"stock_validated","data":{{"orderId":"{id}","clientId":"c1"}}}}"#
        );

        let envelope: StockEventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.data.order_id, id);
        assert_eq!(
            StockEventKind::from_event_name(&envelope.event),
            Some(StockEventKind::Validated)
        );
    }

    #[test]
    fn test_unrecognized_stock_event_kind() {
        assert_eq!(StockEventKind::from_event_name("stock_reserved"), None);
    }

    #[test]
    fn test_stock_event_targets() {
        assert_eq!(
            StockEventKind::Validated.target_status(),
            OrderStatus::Validated
        );
        assert_eq!(StockEventKind::Failed.target_status(), OrderStatus::Failed);
    }
}
