use serde::{Deserialize, Serialize};

use super::Environment;

pub const DEFAULT_DEV_ORIGIN: &str = "http://localhost:3000";

/// Front-end origins per deployment environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsOrigins {
    pub prod_url: Option<String>,
    pub staging_url: Option<String>,
    pub dev_url: Option<String>,
}

impl CorsOrigins {
    /// Pick the origin for `environment`.
    ///
    /// Staging and production return their configured URL (empty when unset, which
    /// disables cross-origin access); development falls back to the local front-end.
    pub fn select(&self, environment: Environment) -> String {
        match environment {
            Environment::Staging => self.staging_url.clone().unwrap_or_default(),
            Environment::Production => self.prod_url.clone().unwrap_or_default(),
            Environment::Development => self
                .dev_url
                .clone()
                .unwrap_or_else(|| DEFAULT_DEV_ORIGIN.to_string()),
        }
    }
}
