use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{AuthError, PasswordHasher};
use crate::database::AccountStore;
use crate::models::{Account, LoginField, SessionPayload};

pub const DEFAULT_STRATEGY_NAME: &str = "user-local";

/// Extra check run after the credential matched. A returned message rejects the login.
pub type VerifyAccount = Arc<dyn Fn(&Account) -> Option<String> + Send + Sync>;

/// One entry of the facade's strategy list
#[derive(Clone)]
pub struct StrategyConfig {
    pub strategy_name: String,
    pub model: Option<Arc<dyn AccountStore>>,
    pub username_field: LoginField,
    pub verify_account: Option<VerifyAccount>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy_name: DEFAULT_STRATEGY_NAME.to_string(),
            model: None,
            username_field: LoginField::Email,
            verify_account: None,
        }
    }
}

impl StrategyConfig {
    pub fn new(strategy_name: &str, model: Arc<dyn AccountStore>) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            model: Some(model),
            ..Self::default()
        }
    }

    pub fn username_field(mut self, field: LoginField) -> Self {
        self.username_field = field;
        self
    }

    pub fn verify_account<F>(mut self, check: F) -> Self
    where
        F: Fn(&Account) -> Option<String> + Send + Sync + 'static,
    {
        self.verify_account = Some(Arc::new(check));
        self
    }
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("strategy_name", &self.strategy_name)
            .field("model", &self.model.as_ref().map(|m| m.model_name().to_string()))
            .field("username_field", &self.username_field)
            .field("verify_account", &self.verify_account.is_some())
            .finish()
    }
}

/// Result of a credential check that did not error
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Success(Account),
    Failure(String),
}

/// A registered local strategy bound to its model
#[derive(Clone)]
pub struct LocalStrategy {
    name: String,
    model: Arc<dyn AccountStore>,
    username_field: LoginField,
    verify_account: Option<VerifyAccount>,
}

impl LocalStrategy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &Arc<dyn AccountStore> {
        &self.model
    }

    pub fn username_field(&self) -> LoginField {
        self.username_field
    }

    fn not_found_message(&self) -> String {
        let prefix = self.name.split('-').next().unwrap_or(&self.name);
        format!("No {} found with that {}", prefix, self.username_field)
    }

    async fn authenticate(
        &self,
        hasher: &dyn PasswordHasher,
        identifier: &str,
        password: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let lookup = identifier.to_lowercase();
        let account = match self.model.find_by_login(self.username_field, &lookup).await? {
            Some(account) => account,
            None => return Ok(AuthOutcome::Failure(self.not_found_message())),
        };

        if !hasher.verify(password, &account.password_hash)? {
            return Ok(AuthOutcome::Failure("Incorrect password!".to_string()));
        }

        if let Some(check) = &self.verify_account {
            if let Some(message) = check(&account) {
                return Ok(AuthOutcome::Failure(message));
            }
        }

        Ok(AuthOutcome::Success(account))
    }
}

/// Closed set of strategies, fixed at startup
#[derive(Clone)]
pub struct StrategyRegistry {
    hasher: Arc<dyn PasswordHasher>,
    strategies: HashMap<String, LocalStrategy>,
    // Registration order; the first entry answers logins that name no strategy
    order: Vec<String>,
}

impl StrategyRegistry {
    pub fn new(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            hasher,
            strategies: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn from_configs(
        hasher: Arc<dyn PasswordHasher>,
        configs: Vec<StrategyConfig>,
    ) -> Result<Self, AuthError> {
        let mut registry = Self::new(hasher);
        for config in configs {
            registry.register(config)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, config: StrategyConfig) -> Result<(), AuthError> {
        let name = if config.strategy_name.is_empty() {
            DEFAULT_STRATEGY_NAME.to_string()
        } else {
            config.strategy_name
        };

        let model = config
            .model
            .ok_or_else(|| AuthError::MissingModel(name.clone()))?;

        if self.strategies.contains_key(&name) {
            return Err(AuthError::DuplicateStrategy(name));
        }

        log::info!(
            "Registered local strategy {} (model {}, field {})",
            name,
            model.model_name(),
            config.username_field
        );

        self.order.push(name.clone());
        self.strategies.insert(
            name.clone(),
            LocalStrategy {
                name,
                model,
                username_field: config.username_field,
                verify_account: config.verify_account,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&LocalStrategy, AuthError> {
        self.strategies
            .get(name)
            .ok_or_else(|| AuthError::InvalidStrategy(name.to_string()))
    }

    pub fn default_strategy(&self) -> Option<&LocalStrategy> {
        self.order.first().and_then(|name| self.strategies.get(name))
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.hasher
    }

    /// Check `identifier`/`password` against the named strategy's model
    pub async fn authenticate(
        &self,
        strategy: &str,
        identifier: &str,
        password: &str,
    ) -> Result<AuthOutcome, AuthError> {
        self.get(strategy)?
            .authenticate(self.hasher.as_ref(), identifier, password)
            .await
    }

    /// Session payload for a freshly authenticated account
    pub fn serialize(&self, account: &Account, strategy: &str) -> Result<SessionPayload, AuthError> {
        let strategy = self.get(strategy)?;
        Ok(SessionPayload {
            id: account.id,
            strategy: strategy.name.clone(),
        })
    }

    /// Resolve a stored payload through the model of its strategy tag.
    ///
    /// An absent payload is "no user", not an error.
    pub async fn deserialize(
        &self,
        payload: Option<&SessionPayload>,
    ) -> Result<Option<Account>, AuthError> {
        let payload = match payload {
            Some(p) => p,
            None => return Ok(None),
        };

        let strategy = self.get(&payload.strategy)?;
        match strategy.model.find_by_id(payload.id).await? {
            Some(account) => Ok(Some(account)),
            None => Err(AuthError::UserNotFound),
        }
    }
}
