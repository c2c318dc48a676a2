use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::auth::{PasswordHasher, StrategyRegistry, TokenGenerator};
use crate::config::Environment;
use crate::database::AccountStore;
use crate::models::Account;
use crate::session::SessionManager;
use crate::utils::mail::Mailer;
use crate::utils::payfast::PayFast;
use crate::utils::storage::ObjectStorage;

/// Account lifecycle events a project can hook into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnSuccessRegister,
    OnFailRegister,
    OnSuccessVerifyUser,
    OnFailVerifyUser,
    OnSuccessLogin,
    OnFailLogin,
    OnSuccessLogout,
    OnFailLogout,
    OnSuccessVerify,
    OnFailVerify,
    OnSuccessChangePassword,
    OnFailChangePassword,
    OnSuccessDeleteUser,
    OnFailDeleteUser,
}

/// What a hook receives: the response body plus the plain token when one was issued
#[derive(Debug, Clone)]
pub struct HookPayload {
    pub success: bool,
    pub message: String,
    pub data: Option<Account>,
    pub token: Option<String>,
}

impl HookPayload {
    pub fn success(message: &str, data: Option<Account>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data,
            token: None,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

pub type Hook = Arc<dyn Fn(&HookPayload) + Send + Sync>;
pub type Hooks = HashMap<HookEvent, Hook>;

#[derive(Clone)]
pub struct GlobalDeps {
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenGenerator>,
    pub strategies: Arc<StrategyRegistry>,
    pub sessions: Arc<SessionManager>,
    pub environment: Environment,
}

#[derive(Clone, Default)]
pub struct ModelDeps {
    pub user: Option<Arc<dyn AccountStore>>,
}

#[derive(Clone, Default)]
pub struct UtilDeps {
    pub mailer: Option<Arc<Mailer>>,
    pub storage: Option<Arc<ObjectStorage>>,
    pub payfast: Option<Arc<PayFast>>,
}

/// The bag injected into every route group
#[derive(Clone)]
pub struct Dependencies {
    pub global: GlobalDeps,
    pub models: ModelDeps,
    pub utils: UtilDeps,
    pub hooks: Hooks,
}

#[derive(Clone, Default)]
pub struct GlobalOverrides {
    pub hasher: Option<Arc<dyn PasswordHasher>>,
    pub tokens: Option<Arc<dyn TokenGenerator>>,
    pub strategies: Option<Arc<StrategyRegistry>>,
    pub sessions: Option<Arc<SessionManager>>,
    pub environment: Option<Environment>,
}

#[derive(Clone, Default)]
pub struct ModelOverrides {
    pub user: Option<Arc<dyn AccountStore>>,
}

#[derive(Clone, Default)]
pub struct UtilOverrides {
    pub mailer: Option<Arc<Mailer>>,
    pub storage: Option<Arc<ObjectStorage>>,
    pub payfast: Option<Arc<PayFast>>,
}

/// Project-supplied replacements. An absent bucket leaves the default bucket alone;
/// inside a bucket only the keys that are set replace defaults.
#[derive(Clone, Default)]
pub struct DependencyOverrides {
    pub global: Option<GlobalOverrides>,
    pub models: Option<ModelOverrides>,
    pub utils: Option<UtilOverrides>,
    pub hooks: Option<Hooks>,
}

impl DependencyOverrides {
    pub fn on(mut self, event: HookEvent, hook: impl Fn(&HookPayload) + Send + Sync + 'static) -> Self {
        self.hooks
            .get_or_insert_with(HashMap::new)
            .insert(event, Arc::new(hook));
        self
    }
}

impl Dependencies {
    pub fn new(global: GlobalDeps) -> Self {
        Self {
            global,
            models: ModelDeps::default(),
            utils: UtilDeps::default(),
            hooks: HashMap::new(),
        }
    }

    /// Apply overrides one level deep, last writer wins
    pub fn merge(mut self, overrides: DependencyOverrides) -> Self {
        if let Some(global) = overrides.global {
            if let Some(hasher) = global.hasher {
                self.global.hasher = hasher;
            }
            if let Some(tokens) = global.tokens {
                self.global.tokens = tokens;
            }
            if let Some(strategies) = global.strategies {
                self.global.strategies = strategies;
            }
            if let Some(sessions) = global.sessions {
                self.global.sessions = sessions;
            }
            if let Some(environment) = global.environment {
                self.global.environment = environment;
            }
        }

        if let Some(models) = overrides.models {
            if models.user.is_some() {
                self.models.user = models.user;
            }
        }

        if let Some(utils) = overrides.utils {
            if utils.mailer.is_some() {
                self.utils.mailer = utils.mailer;
            }
            if utils.storage.is_some() {
                self.utils.storage = utils.storage;
            }
            if utils.payfast.is_some() {
                self.utils.payfast = utils.payfast;
            }
        }

        if let Some(hooks) = overrides.hooks {
            self.hooks.extend(hooks);
        }

        self
    }

    /// Run the hook registered for `event`, if any
    pub fn fire(&self, event: HookEvent, payload: &HookPayload) {
        if let Some(hook) = self.hooks.get(&event) {
            hook(payload);
        }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("strategies", &self.global.strategies.names())
            .field("environment", &self.global.environment)
            .field("user_model", &self.models.user.as_ref().map(|m| m.model_name().to_string()))
            .field("mailer", &self.utils.mailer.is_some())
            .field("storage", &self.utils.storage.is_some())
            .field("payfast", &self.utils.payfast.is_some())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{BcryptHasher, RandomTokens};
    use crate::database::MemoryAccountStore;
    use crate::session::{MemorySessionStore, SessionSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn bare_deps() -> Dependencies {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(4));
        let registry = Arc::new(StrategyRegistry::new(hasher.clone()));
        let sessions = Arc::new(SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            registry.clone(),
            SessionSettings::default(),
        ));
        Dependencies::new(GlobalDeps {
            hasher,
            tokens: Arc::new(RandomTokens::default()),
            strategies: registry,
            sessions,
            environment: Environment::Development,
        })
    }

    struct FixedTokens;

    impl TokenGenerator for FixedTokens {
        fn generate(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn absent_buckets_leave_defaults() {
        let mut deps = bare_deps();
        deps.models.user = Some(Arc::new(MemoryAccountStore::new("User")));

        let merged = deps.merge(DependencyOverrides::default());
        assert_eq!(merged.models.user.as_ref().map(|m| m.model_name()), Some("User"));
        assert_eq!(merged.global.tokens.generate().len(), 32);
    }

    #[test]
    fn present_keys_replace_only_themselves() {
        let mut deps = bare_deps();
        deps.models.user = Some(Arc::new(MemoryAccountStore::new("User")));

        let merged = deps.merge(DependencyOverrides {
            global: Some(GlobalOverrides {
                tokens: Some(Arc::new(FixedTokens)),
                ..Default::default()
            }),
            models: Some(ModelOverrides::default()),
            ..Default::default()
        });

        assert_eq!(merged.global.tokens.generate(), "fixed");
        assert_eq!(merged.global.environment, Environment::Development);
        // empty models bucket keeps the default user model
        assert_eq!(merged.models.user.as_ref().map(|m| m.model_name()), Some("User"));
    }

    #[test]
    fn later_hooks_win() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut deps = bare_deps();
        deps.hooks.insert(HookEvent::OnSuccessLogin, Arc::new(|_: &HookPayload| panic!("replaced hook ran")));

        let counter = calls.clone();
        let merged = deps.merge(DependencyOverrides::default().on(HookEvent::OnSuccessLogin, move |p| {
            assert!(p.success);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        merged.fire(HookEvent::OnSuccessLogin, &HookPayload::success("ok", None));
        merged.fire(HookEvent::OnFailLogin, &HookPayload::failure("no hook"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
