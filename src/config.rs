//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Run against the embedded in-memory store instead of Postgres
    pub skip_externals: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Hosted payment page gateway (PayTabs) configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub profile_id: String,
    pub server_key: String,
    pub currency: String,
    pub timeout_secs: u64,
    /// Retries applied to status queries only; transaction creation is never retried
    pub max_query_retries: u32,
}

/// Checkout behaviour shared by the purchase services
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Public base URL used to build gateway callback and return URLs
    pub app_base_url: String,
    /// Age after which a PENDING purchase is replaced by a fresh initiation
    pub pending_expiry: Duration,
    /// Header carrying the caller id resolved by the upstream identity provider
    pub identity_header: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            app_base_url: "http://localhost:8000".to_string(),
            pending_expiry: Duration::from_secs(30 * 60),
            identity_header: "x-user-id".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.server.skip_externals {
            self.database.validate()?;
        }
        self.logging.validate()?;
        self.gateway.validate()?;
        self.checkout.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            skip_externals: env::var("SKIP_EXTERNALS")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                == "true",
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT cannot be 0".to_string()));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("HOST cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL").ok(),
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.url.as_deref() {
            None => return Err(ConfigError::MissingVariable("DATABASE_URL".to_string())),
            Some(url) if url.is_empty() => {
                return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()))
            }
            Some(_) => {}
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            base_url: env::var("PAYTABS_BASE_URL")
                .unwrap_or_else(|_| "https://secure-egypt.paytabs.com".to_string()),
            profile_id: env::var("PAYTABS_PROFILE_ID")
                .map_err(|_| ConfigError::MissingVariable("PAYTABS_PROFILE_ID".to_string()))?,
            server_key: env::var("PAYTABS_SERVER_KEY")
                .map_err(|_| ConfigError::MissingVariable("PAYTABS_SERVER_KEY".to_string()))?,
            currency: env::var("PAYTABS_CURRENCY").unwrap_or_else(|_| "EGP".to_string()),
            timeout_secs: env::var("PAYTABS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYTABS_TIMEOUT_SECS".to_string()))?,
            max_query_retries: env::var("PAYTABS_MAX_QUERY_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYTABS_MAX_QUERY_RETRIES".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYTABS_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.profile_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("PAYTABS_PROFILE_ID".to_string()));
        }

        if self.server_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("PAYTABS_SERVER_KEY".to_string()));
        }

        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue(
                "PAYTABS_CURRENCY must be an ISO 4217 code".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("PAYTABS_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let expiry_minutes: u64 = env::var("PENDING_PURCHASE_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("PENDING_PURCHASE_EXPIRY_MINUTES".to_string())
            })?;

        Ok(CheckoutConfig {
            app_base_url: env::var("APP_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_base_url),
            pending_expiry: Duration::from_secs(expiry_minutes * 60),
            identity_header: env::var("IDENTITY_HEADER").unwrap_or(defaults.identity_header),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.app_base_url.starts_with("http://") && !self.app_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "APP_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.identity_header.trim().is_empty() {
            return Err(ConfigError::InvalidValue("IDENTITY_HEADER".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
