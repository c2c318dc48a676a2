use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Account record shared by every strategy model (users, admins, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub account_active: bool,
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Value of the login identifier column
    pub fn login_value(&self, field: LoginField) -> Option<&str> {
        match field {
            LoginField::Email => Some(self.email.as_str()),
            LoginField::Username => self.username.as_deref(),
        }
    }

    pub fn view(&self) -> AccountView {
        AccountView::from(self)
    }
}

/// Fields needed to insert a new account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub full_name: String,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub token: Option<String>,
}

/// Account data for responses (without credential or token)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub account_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            full_name: a.full_name.clone(),
            email: a.email.clone(),
            username: a.username.clone(),
            account_active: a.account_active,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

/// Column a strategy uses as the login identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginField {
    #[default]
    Email,
    Username,
}

impl LoginField {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginField::Email => "email",
            LoginField::Username => "username",
        }
    }
}

impl fmt::Display for LoginField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(LoginField::Email),
            "username" => Ok(LoginField::Username),
            other => Err(format!("unsupported username field \"{}\"", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelFileError {
    #[error("cannot read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid model file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Account model declared in `models/<name>.toml` under a `[model]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub username_field: LoginField,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
}

fn default_strategy_name() -> String {
    crate::auth::strategy::DEFAULT_STRATEGY_NAME.to_string()
}

impl Default for ModelDefinition {
    fn default() -> Self {
        Self {
            name: "User".to_string(),
            table: "users".to_string(),
            username_field: LoginField::Email,
            strategy_name: default_strategy_name(),
        }
    }
}

#[derive(Deserialize)]
struct ModelFile {
    model: ModelDefinition,
}

impl ModelDefinition {
    pub fn from_toml(source: &str) -> Result<Self, ModelFileError> {
        Ok(toml::from_str::<ModelFile>(source)?.model)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ModelFileError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

/// What a session remembers about its user: the record id and the strategy that
/// authenticated it, so the lookup goes to that strategy's model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPayload {
    pub id: Uuid,
    pub strategy: String,
}

/// Register request payload
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login payload. The identifier is read from the field the strategy uses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
    /// Strategy name; the first registered strategy when absent
    pub strategy: Option<String>,
}

impl LoginRequest {
    pub fn identifier(&self, field: LoginField) -> Option<&str> {
        match field {
            LoginField::Email => self.email.as_deref(),
            LoginField::Username => self.username.as_deref(),
        }
        .filter(|v| !v.trim().is_empty())
    }
}

/// Password-reset lookup payload: `{email}` or `{username}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VerifyRequest {
    pub email: Option<String>,
    pub username: Option<String>,
}

impl VerifyRequest {
    /// The field to search by and its value, email first
    pub fn lookup(&self) -> Option<(LoginField, &str)> {
        if let Some(email) = self.email.as_deref().filter(|v| !v.is_empty()) {
            return Some((LoginField::Email, email));
        }
        self.username
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|u| (LoginField::Username, u))
    }
}

/// Account verification payload
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenRequest {
    pub token: String,
}

/// Password reset payload
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub user_id: Uuid,
    pub token: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response envelope used by every route: `{success, message, data, details?}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> ApiResponse<T> {
        ApiResponse {
            success: true,
            message: message.into(),
            data,
            details: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
}
