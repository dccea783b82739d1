// ============================================================================
// Order Store Adapter
// ============================================================================
//
// Keyed CRUD over persisted orders; no business logic lives here. Both the
// HTTP-facing request path and the stock-event consumer share one store
// handle, so every operation must be atomic at single-document granularity.
//
// Implementations:
// - scylla::ScyllaOrderStore - production store over ScyllaDB, conditional
//   writes (LWT) for the single-document atomicity guarantee
// - memory::MemoryOrderStore  - in-process store for tests and broker-less
//   smoke runs
//
// ============================================================================

mod memory;
mod scylla;

pub use self::memory::MemoryOrderStore;
pub use self::scylla::ScyllaOrderStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderStatus};

/// Not-found is a first-class outcome here, kept apart from backend failures
/// (timeouts, lost connections) so callers can map each to the right
/// outward response.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

/// Partial update applied to the mutable fields of an order.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and assign its identity.
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Order, StoreError>;

    /// Apply a patch as one atomic read-modify-write on a single document.
    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError>;

    /// Remove an order, returning the removed record.
    async fn delete(&self, id: Uuid) -> Result<Order, StoreError>;

    async fn list_all(&self) -> Result<Vec<Order>, StoreError>;
}
