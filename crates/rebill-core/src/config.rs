//! Environment-driven configuration.
//!
//! Per-app PSP credentials and entitlement maps are discovered at startup by
//! scanning the environment for `_<APP>`-suffixed keys. Apps are immutable
//! until restart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration for the billing service
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub idempotency: IdempotencyConfig,
    pub webhook: WebhookConfig,
    pub psp: PspConfig,
    /// Tenant applications keyed by lowercase app_id
    pub apps: HashMap<String, AppConfig>,
    /// Production flag; 500 bodies are stripped when set
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Cached responses expire after this many days (default 30)
    pub ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Maximum accepted skew between the signature timestamp and now
    pub timestamp_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct PspConfig {
    pub sandbox: bool,
    /// Upper bound on concurrent outbound PSP calls
    pub max_concurrency: usize,
    /// Per-call deadline in seconds
    pub request_timeout_secs: u64,
}

/// Per-tenant credentials and entitlements
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_id: String,
    pub psp_secret_key: String,
    pub psp_account_id: String,
    pub psp_webhook_secret: String,
    /// plan_id -> feature list, parsed from ENTITLEMENTS_JSON_<APP>
    pub entitlements: HashMap<String, Vec<String>>,
}

/// Entitlements env payload shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntitlementsJson(HashMap<String, Vec<String>>);

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .map_err(|_| Error::Config("DATABASE_URL is required".to_string()))?,
            pool_size: env_parse("DATABASE_POOL_SIZE", 10u32)?,
        };

        let server = ServerConfig {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080u16)?,
        };

        let idempotency = IdempotencyConfig {
            ttl_days: env_parse("IDEMPOTENCY_TTL_DAYS", 30i64)?,
        };

        let webhook = WebhookConfig {
            timestamp_tolerance_secs: env_parse("WEBHOOK_TIMESTAMP_TOLERANCE_SEC", 300i64)?,
        };

        let psp = PspConfig {
            sandbox: env_parse("PSP_SANDBOX", false)?,
            max_concurrency: env_parse("PSP_MAX_CONCURRENCY", 16usize)?,
            request_timeout_secs: env_parse("PSP_REQUEST_TIMEOUT_SECS", 30u64)?,
        };

        let production = matches!(
            std::env::var("ENV").or_else(|_| std::env::var("NODE_ENV")).as_deref(),
            Ok("production")
        );

        let apps = discover_apps(std::env::vars())?;

        let config = Self {
            server,
            database,
            idempotency,
            webhook,
            psp,
            apps,
            production,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(Error::Config("Database pool size must be > 0".to_string()));
        }
        if self.idempotency.ttl_days < 1 {
            return Err(Error::Config(
                "IDEMPOTENCY_TTL_DAYS must be at least 1".to_string(),
            ));
        }
        if self.webhook.timestamp_tolerance_secs <= 0 {
            return Err(Error::Config(
                "WEBHOOK_TIMESTAMP_TOLERANCE_SEC must be positive".to_string(),
            ));
        }
        if self.psp.max_concurrency == 0 {
            return Err(Error::Config("PSP_MAX_CONCURRENCY must be > 0".to_string()));
        }
        Ok(())
    }

    /// Look up a tenant application. Lookup is case-insensitive on app_id.
    pub fn app(&self, app_id: &str) -> Option<&AppConfig> {
        self.apps.get(&app_id.to_lowercase())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Scan the environment for `PSP_SECRET_KEY_<APP>` keys and assemble the
/// per-app credential set. An app with a secret key but missing account id
/// or webhook secret is a configuration error.
fn discover_apps(vars: impl Iterator<Item = (String, String)>) -> Result<HashMap<String, AppConfig>> {
    let env: HashMap<String, String> = vars.collect();
    let mut apps = HashMap::new();

    for key in env.keys() {
        let Some(app_suffix) = key.strip_prefix("PSP_SECRET_KEY_") else {
            continue;
        };
        let app_id = app_suffix.to_lowercase();

        let psp_secret_key = env[key].clone();
        let psp_account_id = env
            .get(&format!("PSP_ACCOUNT_ID_{}", app_suffix))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("PSP_ACCOUNT_ID_{} is required", app_suffix))
            })?;
        let psp_webhook_secret = env
            .get(&format!("PSP_WEBHOOK_SECRET_{}", app_suffix))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("PSP_WEBHOOK_SECRET_{} is required", app_suffix))
            })?;

        let entitlements = match env.get(&format!("ENTITLEMENTS_JSON_{}", app_suffix)) {
            Some(raw) => {
                let parsed: EntitlementsJson = serde_json::from_str(raw).map_err(|e| {
                    Error::Config(format!(
                        "ENTITLEMENTS_JSON_{} is not valid JSON: {}",
                        app_suffix, e
                    ))
                })?;
                parsed.0
            }
            None => HashMap::new(),
        };

        apps.insert(
            app_id.clone(),
            AppConfig {
                app_id,
                psp_secret_key,
                psp_account_id,
                psp_webhook_secret,
                entitlements,
            },
        );
    }

    Ok(apps)
}
