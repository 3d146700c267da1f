//! Application configuration management.
//!
//! Configuration is loaded from environment variables via the `envy` crate
//! and validated once at startup. Gateway credentials are carried as an
//! explicit, injected object rather than being read ad hoc from the process
//! environment at call sites.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `GATEWAY_SERVER_KEY` (required): payment gateway server key
/// - `GATEWAY_BASE_URL` (optional): gateway API base URL, defaults to the
///   Midtrans sandbox
/// - `SHIPPING_FLAT_CENTS` (optional): flat shipping cost in minor units
/// - `SERVICE_FEE_CENTS` (optional): flat service fee in minor units
/// - `PAYMENT_PENDING_HOURS` (optional): window before an unpaid order with
///   no gateway expiry may be treated as abandoned, defaults to 24
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub gateway_server_key: String,

    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    #[serde(default = "default_shipping_flat_cents")]
    pub shipping_flat_cents: i64,

    #[serde(default)]
    pub service_fee_cents: i64,

    #[serde(default = "default_pending_hours")]
    pub payment_pending_hours: i64,
}

fn default_port() -> u16 {
    3000
}

fn default_gateway_base_url() -> String {
    "https://api.sandbox.midtrans.com".to_string()
}

fn default_shipping_flat_cents() -> i64 {
    15_000
}

fn default_pending_hours() -> i64 {
    24
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then deserializes the
    /// environment into a `Config` and validates the gateway settings.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate fields that envy cannot check structurally.
    ///
    /// A misconfigured gateway should fail startup, not the first charge.
    fn validate(&self) -> anyhow::Result<()> {
        let parsed = url::Url::parse(&self.gateway_base_url)
            .map_err(|e| anyhow::anyhow!("GATEWAY_BASE_URL is not a valid URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("GATEWAY_BASE_URL must use http or https");
        }
        if self.gateway_server_key.trim().is_empty() {
            anyhow::bail!("GATEWAY_SERVER_KEY must not be empty");
        }
        if self.shipping_flat_cents < 0 || self.service_fee_cents < 0 {
            anyhow::bail!("fees must not be negative");
        }
        if self.payment_pending_hours <= 0 {
            anyhow::bail!("PAYMENT_PENDING_HOURS must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "postgres://localhost/orders".to_string(),
            server_port: 3000,
            gateway_server_key: "SB-Mid-server-abc123".to_string(),
            gateway_base_url: default_gateway_base_url(),
            shipping_flat_cents: default_shipping_flat_cents(),
            service_fee_cents: 0,
            payment_pending_hours: default_pending_hours(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_bad_gateway_url() {
        let mut config = base_config();
        config.gateway_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.gateway_base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_server_key() {
        let mut config = base_config();
        config.gateway_server_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_fees() {
        let mut config = base_config();
        config.service_fee_cents = -1;
        assert!(config.validate().is_err());
    }
}
