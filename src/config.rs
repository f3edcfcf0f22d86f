use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PAYMENT_EXPIRY_MINUTES: i64 = 15;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Credentials and endpoints for one redirect/callback payment provider.
/// One instance per provider, injected into the gateway at construction.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RedirectGatewayConfig {
    /// Provider identifier used in payment method names and callback paths
    #[validate(length(min = 1))]
    pub name: String,

    /// Merchant code issued by the provider
    #[validate(length(min = 1))]
    pub merchant_code: String,

    /// Shared secret for HMAC signing of requests and callbacks
    #[validate(length(min = 8))]
    pub hash_secret: String,

    /// Hosted payment page the customer is redirected to
    pub pay_url: String,

    /// Server-to-server transaction status endpoint
    pub query_url: String,

    /// URL the provider redirects the customer back to
    pub return_url: String,
}

/// Payment subsystem configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    /// Minutes a redirect-gateway payment may stay pending before the
    /// sweeper force-cancels the order
    #[serde(default = "default_payment_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Interval between expiry sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Configured redirect/callback providers
    #[serde(default)]
    pub gateways: Vec<RedirectGatewayConfig>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_payment_expiry_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            gateways: Vec::new(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (notification store, callback dedup)
    pub redis_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Payment subsystem settings
    #[serde(default)]
    pub payment: PaymentConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_payment_expiry_minutes() -> i64 {
    DEFAULT_PAYMENT_EXPIRY_MINUTES
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl AppConfig {
    /// Construct a minimal configuration programmatically (test harnesses).
    pub fn new(database_url: String, redis_url: String, environment: String) -> Self {
        Self {
            database_url,
            redis_url,
            host: default_host(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            payment: PaymentConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from layered sources: `config/default.toml`, the
/// environment-specific file, then `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;
    Ok(app_config)
}

/// Initializes the global tracing subscriber. JSON output is opt-in via
/// config for structured log shipping.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_config_uses_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            "test".into(),
        );
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.payment.expiry_minutes, DEFAULT_PAYMENT_EXPIRY_MINUTES);
        assert!(cfg.payment.gateways.is_empty());
        assert!(cfg.is_development());
    }

    #[test]
    fn gateway_config_validates_secret_length() {
        let gw = RedirectGatewayConfig {
            name: "vnpay".into(),
            merchant_code: "DEMO".into(),
            hash_secret: "short".into(),
            pay_url: "https://sandbox.example/pay".into(),
            query_url: "https://sandbox.example/query".into(),
            return_url: "http://localhost:8080/return".into(),
        };
        assert!(gw.validate().is_err());
    }
}
