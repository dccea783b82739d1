use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;
use uuid::Uuid;

use super::{OrderPatch, OrderStore, StoreError};
use crate::models::{NewOrder, Order, OrderStatus};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// One row per order. Line items are a JSON text column; the document never
// spans partitions, so single-row writes give the atomicity the lifecycle
// path depends on. Update and delete use lightweight transactions
// (IF EXISTS) so a missing row surfaces as NotFound from the [applied]
// flag instead of silently upserting.
//
// ============================================================================

type OrderRow = (Uuid, String, String, String, DateTime<Utc>);

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Idempotent keyspace and table setup, run once at startup.
    pub async fn init_schema(session: &Session, keyspace: &str) -> anyhow::Result<()> {
        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                &[],
            )
            .await?;

        session.use_keyspace(keyspace, false).await?;

        session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS orders (
                    id uuid PRIMARY KEY,
                    client_id text,
                    items text,
                    status text,
                    created_at timestamp
                )",
                &[],
            )
            .await?;

        Ok(())
    }

    fn decode_row(row: OrderRow) -> Result<Order, StoreError> {
        let (id, client_id, items_json, status_raw, created_at) = row;

        let products = serde_json::from_str(&items_json).map_err(StoreError::backend)?;
        let status = OrderStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::Backend(anyhow::anyhow!(
                "order {id} carries unknown status {status_raw:?}"
            ))
        })?;

        Ok(Order {
            id,
            client_id,
            products,
            status,
            created_at,
        })
    }

    /// Read the [applied] flag of a lightweight-transaction result.
    fn lwt_applied(result: QueryResult) -> Result<bool, StoreError> {
        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let mut rows = rows_result.rows::<Row>().map_err(StoreError::backend)?;

        match rows.next() {
            Some(row) => {
                let row = row.map_err(StoreError::backend)?;
                Ok(matches!(
                    row.columns.first(),
                    Some(Some(CqlValue::Boolean(true)))
                ))
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, StoreError> {
        let id = Uuid::new_v4();
        let items_json = serde_json::to_string(&order.products).map_err(StoreError::backend)?;

        self.session
            .query_unpaged(
                "INSERT INTO orders (id, client_id, items, status, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                (
                    id,
                    &order.client_id,
                    &items_json,
                    order.status.as_str(),
                    order.created_at,
                ),
            )
            .await
            .map_err(StoreError::backend)?;

        tracing::debug!(order_id = %id, client_id = %order.client_id, "Order row inserted");

        Ok(Order {
            id,
            client_id: order.client_id,
            products: order.products,
            status: order.status,
            created_at: order.created_at,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT id, client_id, items, status, created_at FROM orders WHERE id = ?",
                (id,),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let mut rows = rows_result
            .rows::<OrderRow>()
            .map_err(StoreError::backend)?;

        match rows.next() {
            Some(row) => Self::decode_row(row.map_err(StoreError::backend)?),
            None => Err(StoreError::NotFound),
        }
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        let Some(status) = patch.status else {
            // Nothing to change; still distinguish a missing order.
            return self.get(id).await;
        };

        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET status = ? WHERE id = ? IF EXISTS",
                (status.as_str(), id),
            )
            .await
            .map_err(StoreError::backend)?;

        if !Self::lwt_applied(result)? {
            return Err(StoreError::NotFound);
        }

        self.get(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<Order, StoreError> {
        let existing = self.get(id).await?;

        let result = self
            .session
            .query_unpaged("DELETE FROM orders WHERE id = ? IF EXISTS", (id,))
            .await
            .map_err(StoreError::backend)?;

        if !Self::lwt_applied(result)? {
            return Err(StoreError::NotFound);
        }

        Ok(existing)
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT id, client_id, items, status, created_at FROM orders",
                &[],
            )
            .await
            .map_err(StoreError::backend)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let rows = rows_result
            .rows::<OrderRow>()
            .map_err(StoreError::backend)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(Self::decode_row(row.map_err(StoreError::backend)?)?);
        }

        Ok(orders)
    }
}
