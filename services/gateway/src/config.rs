use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracking::hub::LagPolicy;

/// Gateway configuration. Every flag falls back to an environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway")]
#[command(about = "Driver tracking and payments gateway", long_about = None)]
pub struct GatewayConfig {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// HS256 secret used to verify bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: String,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: String,

    #[arg(long, env = "STRIPE_API_BASE", default_value = payments::stripe::DEFAULT_API_BASE)]
    pub stripe_api_base: String,

    /// Base for the success, cancel and onboarding redirect URLs
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:8080")]
    pub public_base_url: String,

    #[arg(long, env = "CURRENCY", default_value = "usd")]
    pub currency: String,

    /// Journal directory; stores are in-memory when unset
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON file seeding the user and driver directories
    #[arg(long, env = "DIRECTORY_FILE")]
    pub directory_file: Option<PathBuf>,

    #[arg(long, env = "OBSERVER_QUEUE_CAPACITY", default_value_t = 256)]
    pub observer_queue_capacity: usize,

    /// `disconnect` or `drop_newest`
    #[arg(long, env = "OBSERVER_LAG_POLICY", default_value = "disconnect")]
    pub observer_lag_policy: LagPolicy,
}

impl GatewayConfig {
    /// Absolute URL for a path on this service.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url.trim_end_matches('/'), path)
    }

    /// Configuration for tests: in-memory stores, local URLs.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.to_string(),
            stripe_secret_key: "sk_test".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_api_base: payments::stripe::DEFAULT_API_BASE.to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            currency: "usd".to_string(),
            data_dir: None,
            directory_file: None,
            observer_queue_capacity: 256,
            observer_lag_policy: LagPolicy::Disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let config = GatewayConfig::try_parse_from([
            "gateway",
            "--jwt-secret",
            "s",
            "--stripe-secret-key",
            "sk",
            "--stripe-webhook-secret",
            "wh",
            "--observer-lag-policy",
            "drop_newest",
            "--public-base-url",
            "https://rides.example.com/",
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.currency, "usd");
        assert_eq!(config.observer_queue_capacity, 256);
        assert_eq!(config.observer_lag_policy, LagPolicy::DropNewest);
        assert!(config.data_dir.is_none());
        assert_eq!(
            config.public_url("/success/"),
            "https://rides.example.com/success/"
        );
    }

    #[test]
    fn test_unknown_lag_policy_rejected() {
        let result = GatewayConfig::try_parse_from([
            "gateway",
            "--jwt-secret",
            "s",
            "--stripe-secret-key",
            "sk",
            "--stripe-webhook-secret",
            "wh",
            "--observer-lag-policy",
            "block",
        ]);
        assert!(result.is_err());
    }
}
