use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderPatch, OrderStore, StoreError};
use crate::models::{NewOrder, Order};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Same contract as the ScyllaDB store, held in a map behind a write lock.
// The lock scopes every read-modify-write, which is the in-process
// equivalent of the conditional single-row write the production store uses.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let stored = Order {
            id: Uuid::new_v4(),
            client_id: order.client_id,
            products: order.products,
            status: order.status,
            created_at: order.created_at,
        };

        self.orders
            .write()
            .await
            .insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(status) = patch.status {
            order.status = status;
        }

        Ok(order.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by_key(|order| order.created_at);
        Ok(all)
    }
}
