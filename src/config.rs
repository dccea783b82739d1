use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::CatalogAuthPolicy;
use crate::lifecycle::ConflictPolicy;
use crate::messaging::ChannelConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything comes from the environment (with a .env file picked up at
// startup). Policy choices that the design leaves to the deployment -
// catalog credential forwarding and conflicting-terminal handling - are
// explicit options here, not call-site accidents.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct Config {
    pub scylla_node: String,
    pub keyspace: String,
    pub channel: ChannelConfig,
    /// Deadline for handling one consumed stock event
    pub handler_deadline: Duration,
    pub catalog_url: String,
    pub catalog_timeout: Duration,
    pub catalog_auth: CatalogAuthPolicy,
    pub conflict_policy: ConflictPolicy,
    pub http_port: u16,
    /// In test mode a missing broker is an observable skip, not a fatal
    /// startup failure.
    pub test_mode: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let channel = ChannelConfig {
            brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
            consumer_group: env_or("CONSUMER_GROUP", "order-reconciler"),
            connect_attempts: env_parse("BROKER_CONNECT_ATTEMPTS", "5")?,
            connect_delay: Duration::from_millis(env_parse("BROKER_CONNECT_DELAY_MS", "3000")?),
            publish_timeout: Duration::from_millis(env_parse("PUBLISH_TIMEOUT_MS", "5000")?),
        };

        Ok(Self {
            scylla_node: env_or("SCYLLA_NODE", "127.0.0.1:9042"),
            keyspace: env_or("ORDER_KEYSPACE", "orders_ks"),
            channel,
            handler_deadline: Duration::from_millis(env_parse(
                "STOCK_HANDLER_DEADLINE_MS",
                "10000",
            )?),
            catalog_url: env_or(
                "PRODUCT_CATALOG_URL",
                "http://127.0.0.1:8089/api/product/all",
            ),
            catalog_timeout: Duration::from_millis(env_parse("CATALOG_TIMEOUT_MS", "5000")?),
            catalog_auth: env_parse("CATALOG_AUTH_POLICY", "forward")?,
            conflict_policy: env_parse("STOCK_CONFLICT_POLICY", "keep-first")?,
            http_port: env_parse("HTTP_PORT", "3000")?,
            test_mode: env_or("APP_ENV", "production") == "test",
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env_or(key, default);
    raw.parse::<T>()
        .map_err(|err| anyhow::anyhow!("invalid {key}={raw:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.channel.connect_attempts, 5);
        assert_eq!(config.channel.connect_delay, Duration::from_secs(3));
        assert_eq!(config.catalog_auth, CatalogAuthPolicy::ForwardRequired);
        assert_eq!(config.conflict_policy, ConflictPolicy::KeepFirst);
        assert!(!config.test_mode);
    }

    #[test]
    fn test_env_parse_reports_the_offending_key() {
        std::env::set_var("BROKER_CONNECT_ATTEMPTS_TEST_KEY", "not-a-number");
        let err = env_parse::<u32>("BROKER_CONNECT_ATTEMPTS_TEST_KEY", "5").unwrap_err();
        assert!(err.to_string().contains("BROKER_CONNECT_ATTEMPTS_TEST_KEY"));
        std::env::remove_var("BROKER_CONNECT_ATTEMPTS_TEST_KEY");
    }
}
