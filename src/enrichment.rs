use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{ProductSnapshot, ProductSource};
use crate::models::{AuthContext, Order, OrderStatus};

// ============================================================================
// Order Enrichment Engine
// ============================================================================
//
// Read-time join of stored line items against a catalog snapshot. The
// catalog is fetched once per enrichment call, never once per line item, so
// external calls stay O(1) per request. Enrichment produces a derived view
// and never writes back to the store.
//
// Projection policy: the order's captured price and quantity are audit
// fields and pass through untouched; the catalog contributes descriptive
// metadata (name, description) and its current price as a separate field.
//
// ============================================================================

pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown product";
pub const UNKNOWN_PRODUCT_DESCRIPTION: &str = "Product description unavailable";

/// Read-model order with resolved product metadata.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedOrder {
    pub id: Uuid,
    pub client_id: String,
    #[serde(rename = "orderStatus")]
    pub status: OrderStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub products: Vec<EnrichedLineItem>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedLineItem {
    pub product_id: String,
    pub quantity: i32,
    /// Unit price captured at order time; never replaced by catalog data.
    pub price: f64,
    pub name: String,
    pub description: String,
    /// Current catalog price, when the product resolved. Informational only.
    pub catalog_price: Option<f64>,
}

/// Product ids may be stored as "7" on one side and 7 on the other; the
/// catalog boundary already stringifies numbers, so a trimmed compare is
/// all that is left to do.
fn normalize_product_id(raw: &str) -> String {
    raw.trim().to_string()
}

pub struct Enricher {
    source: Arc<dyn ProductSource>,
}

impl Enricher {
    pub fn new(source: Arc<dyn ProductSource>) -> Self {
        Self { source }
    }

    pub async fn enrich_one(&self, order: &Order, auth: &AuthContext) -> EnrichedOrder {
        let catalog = self.source.fetch_catalog(auth).await;
        let index = Self::index_catalog(&catalog);
        Self::project(order, &index)
    }

    pub async fn enrich_many(&self, orders: &[Order], auth: &AuthContext) -> Vec<EnrichedOrder> {
        let catalog = self.source.fetch_catalog(auth).await;
        let index = Self::index_catalog(&catalog);
        orders
            .iter()
            .map(|order| Self::project(order, &index))
            .collect()
    }

    fn index_catalog(catalog: &[ProductSnapshot]) -> HashMap<String, &ProductSnapshot> {
        catalog
            .iter()
            .map(|product| (normalize_product_id(&product.id), product))
            .collect()
    }

    fn project(order: &Order, index: &HashMap<String, &ProductSnapshot>) -> EnrichedOrder {
        let products = order
            .products
            .iter()
            .map(|item| match index.get(&normalize_product_id(&item.product_id)) {
                Some(snapshot) => EnrichedLineItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price,
                    name: snapshot.name.clone(),
                    description: snapshot.description.clone(),
                    catalog_price: Some(snapshot.price),
                },
                None => EnrichedLineItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price,
                    name: UNKNOWN_PRODUCT_NAME.to_string(),
                    description: UNKNOWN_PRODUCT_DESCRIPTION.to_string(),
                    catalog_price: None,
                },
            })
            .collect();

        EnrichedOrder {
            id: order.id,
            client_id: order.client_id.clone(),
            status: order.status,
            created_at: order.created_at,
            products,
        }
    }
}
