use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::models::AuthContext;

// ============================================================================
// Product Lookup Client
// ============================================================================
//
// Fetches the full external catalog in one GET. The contract is infallible:
// network failure, a non-2xx status, a malformed payload, or a fail-closed
// credential policy all resolve to an empty snapshot list. Callers treat
// "no catalog data" as a degraded but valid outcome.
//
// ============================================================================

/// Ephemeral view of one catalog product, held only for the duration of a
/// single enrichment call.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ProductSnapshot {
    /// The catalog keys products numerically; order line items carry string
    /// ids. Normalized to a string at the boundary so the join compares
    /// like with like.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    /// Available stock, carried for completeness; enrichment does not
    /// project it.
    #[allow(dead_code)]
    #[serde(default)]
    pub quantity: i32,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "product id must be a string or number, got {other}"
        ))),
    }
}

/// Whether the catalog call forwards the caller's credential.
///
/// `ForwardRequired` fails closed: a request with no inbound bearer token
/// gets an empty catalog rather than an unauthenticated upstream call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogAuthPolicy {
    ForwardRequired,
    Anonymous,
}

impl std::str::FromStr for CatalogAuthPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "forward" => Ok(CatalogAuthPolicy::ForwardRequired),
            "anonymous" => Ok(CatalogAuthPolicy::Anonymous),
            other => Err(format!(
                "unknown catalog auth policy {other:?} (expected \"forward\" or \"anonymous\")"
            )),
        }
    }
}

/// Seam between the enrichment engine and the remote catalog, so enrichment
/// is testable without a network.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_catalog(&self, auth: &AuthContext) -> Vec<ProductSnapshot>;
}

pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    policy: CatalogAuthPolicy,
    metrics: Arc<Metrics>,
}

impl CatalogClient {
    pub fn new(
        url: String,
        timeout: Duration,
        policy: CatalogAuthPolicy,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url,
            policy,
            metrics,
        })
    }
}

#[async_trait]
impl ProductSource for CatalogClient {
    async fn fetch_catalog(&self, auth: &AuthContext) -> Vec<ProductSnapshot> {
        let mut request = self.http.get(&self.url);

        match (self.policy, &auth.bearer_token) {
            (CatalogAuthPolicy::ForwardRequired, Some(token)) => {
                request = request.bearer_auth(token);
            }
            (CatalogAuthPolicy::ForwardRequired, None) => {
                tracing::warn!(
                    url = %self.url,
                    "No inbound credential to forward to the catalog, failing closed"
                );
                self.metrics.record_catalog_failure("missing_credential");
                return Vec::new();
            }
            (CatalogAuthPolicy::Anonymous, _) => {}
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %self.url, error = %err, "Catalog fetch failed");
                self.metrics.record_catalog_failure("network");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                url = %self.url,
                status = %response.status(),
                "Catalog responded with an error status"
            );
            self.metrics.record_catalog_failure("status");
            return Vec::new();
        }

        match response.json::<Vec<ProductSnapshot>>().await {
            Ok(products) => {
                tracing::debug!(count = products.len(), "Fetched catalog snapshot");
                products
            }
            Err(err) => {
                tracing::warn!(url = %self.url, error = %err, "Catalog payload did not decode");
                self.metrics.record_catalog_failure("decode");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accepts_numeric_and_string_ids() {
        let numeric: ProductSnapshot = serde_json::from_str(
            r#"{"id": 7, "name": "Widget", "description": "A widget", "price": 3.5, "quantity": 12}"#,
        )
        .unwrap();
        assert_eq!(numeric.id, "7");
        assert_eq!(numeric.quantity, 12);

        let textual: ProductSnapshot =
            serde_json::from_str(r#"{"id": "p1", "name": "Gadget"}"#).unwrap();
        assert_eq!(textual.id, "p1");
        assert_eq!(textual.description, "");
        assert_eq!(textual.price, 0.0);
    }

    #[test]
    fn test_snapshot_rejects_non_scalar_id() {
        let result = serde_json::from_str::<ProductSnapshot>(r#"{"id": [1], "name": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_policy_parsing() {
        assert_eq!(
            "forward".parse::<CatalogAuthPolicy>().unwrap(),
            CatalogAuthPolicy::ForwardRequired
        );
        assert_eq!(
            "anonymous".parse::<CatalogAuthPolicy>().unwrap(),
            CatalogAuthPolicy::Anonymous
        );
        assert!("bearer".parse::<CatalogAuthPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_degrades_to_empty() {
        let metrics = Arc::new(Metrics::new().unwrap());
        // Nothing listens on port 1; the connection is refused immediately.
        let client = CatalogClient::new(
            "http://127.0.0.1:1/api/product/all".to_string(),
            Duration::from_millis(500),
            CatalogAuthPolicy::Anonymous,
            metrics,
        )
        .unwrap();

        let products = client.fetch_catalog(&AuthContext::anonymous()).await;
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_forward_required_fails_closed_without_credential() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let client = CatalogClient::new(
            "http://127.0.0.1:1/api/product/all".to_string(),
            Duration::from_millis(500),
            CatalogAuthPolicy::ForwardRequired,
            metrics,
        )
        .unwrap();

        let products = client.fetch_catalog(&AuthContext::anonymous()).await;
        assert!(products.is_empty());
    }
}
