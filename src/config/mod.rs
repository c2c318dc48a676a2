use serde::{Deserialize, Serialize};
use std::env;

pub mod cors;

/// Ten years
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;
pub const MAX_WORKERS: usize = 1024;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: String, value: String },
}

/// Deployment environment, derived from `STAGING_ENV` and `APP_ENV`/`NODE_ENV`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn detect() -> Self {
        Self::from_vars(
            env::var("STAGING_ENV").ok().as_deref(),
            env::var("APP_ENV").or_else(|_| env::var("NODE_ENV")).ok().as_deref(),
        )
    }

    pub fn from_vars(staging: Option<&str>, app_env: Option<&str>) -> Self {
        if staging.is_some_and(|s| !s.is_empty()) {
            return Environment::Staging;
        }
        match app_env.map(|s| s.to_lowercase()) {
            Some(mode) if mode == "production" || mode == "prod" => Environment::Production,
            Some(mode) if mode == "staging" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    pub payments: PaymentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub static_dir: String,
    // Versioned prefix every discovered route group is mounted under
    pub api_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub database_name: String,
    pub max_connections: usize,
}

impl DatabaseConfig {
    /// Connection string: `DATABASE_URL` when set, otherwise a local server with the database name
    pub fn uri(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("postgres://localhost:5432/{}", self.database_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_hours: i64,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors: cors::CorsOrigins,
    pub max_request_size_bytes: usize,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub merchant_id: Option<String>,
    pub merchant_key: Option<String>,
    pub pass_phrase: Option<String>,
    pub payment_method: Option<String>,
    pub confirmation_address: Option<String>,
    pub prod_api_url: Option<String>,
    pub ngrok_server: String,
    pub ngrok_client: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

/// `parse_or` restricted to `range`; out-of-range values are reported like unparseable ones
fn parse_in<T>(key: &str, default: T, range: std::ops::RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + ToString,
{
    let value = parse_or(key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::detect();

        Ok(Self {
            environment,
            server: ServerConfig {
                host: var_or("HOST", "127.0.0.1"),
                port: parse_or("PORT", 8000)?,
                workers: parse_in("WORKERS", 4, 1..=MAX_WORKERS)?,
                static_dir: var_or("STATIC_DIR", "public"),
                api_prefix: var_or("API_PREFIX", "/v1"),
            },
            database: DatabaseConfig {
                url: var_opt("DATABASE_URL"),
                database_name: var_or("DATABASE_NAME", "myapp"),
                max_connections: parse_in("DB_MAX_CONNECTIONS", 10, 1..=usize::MAX)?,
            },
            session: SessionConfig {
                cookie_name: var_or("SESSION_COOKIE_NAME", "sid"),
                ttl_hours: parse_in("SESSION_TTL_HOURS", 24 * 14, 1..=MAX_SESSION_TTL_HOURS)?,
                secure_cookie: environment == Environment::Production,
            },
            security: SecurityConfig {
                cors: cors::CorsOrigins {
                    prod_url: var_opt("CORS_PROD_URL"),
                    staging_url: var_opt("CORS_STAGING_URL"),
                    dev_url: var_opt("CORS_DEV_URL"),
                },
                max_request_size_bytes: parse_or("MAX_REQUEST_SIZE_BYTES", 50 * 1024 * 1024)?, // 50MB
                bcrypt_cost: parse_or("BCRYPT_COST", 10)?,
            },
            logging: LoggingConfig {
                level: var_or("LOG_LEVEL", "info"),
                file_path: var_opt("LOG_FILE_PATH"),
            },
            mail: MailConfig {
                api_url: var_or("MAIL_API_URL", "https://api.resend.com/emails"),
                api_key: var_opt("MAIL_API_KEY"),
                from: var_or("MAIL_FROM", "noreply@example.com"),
            },
            storage: StorageConfig {
                region: var_or("AWS_REGION", "eu-north-1"),
                access_key_id: var_opt("AWS_ACCESS_KEY_ID"),
                secret_access_key: var_opt("AWS_SECRET_ACCESS_KEY"),
                bucket: var_opt("AWS_BUCKET_NAME"),
                endpoint: var_opt("S3_ENDPOINT"),
            },
            payments: PaymentConfig {
                merchant_id: var_opt("PAYFAST_MERCHANT_ID"),
                merchant_key: var_opt("PAYFAST_MERCHANT_KEY"),
                pass_phrase: var_opt("PAYFAST_PASS_PHRASE"),
                payment_method: var_opt("PAYFAST_PAYMENT_METHOD"),
                confirmation_address: var_opt("PAYFAST_PAYMENT_CONFIRM_EMAIL"),
                prod_api_url: var_opt("PROD_API_URL"),
                ngrok_server: var_or("NGROK_SERVER_URL", "http://localhost:8000/v1"),
                ngrok_client: var_or("NGROK_CLIENT_URL", "http://localhost:3000"),
            },
        })
    }

    /// Origin allowed by the CORS middleware for the current environment
    pub fn cors_origin(&self) -> String {
        self.security.cors.select(self.environment)
    }
}
