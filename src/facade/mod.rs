use actix_web::body::BoxBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::error::InternalError;
use actix_web::{web, App, Error};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{AuthError, BcryptHasher, PasswordHasher, RandomTokens, StrategyConfig, StrategyRegistry};
use crate::config::{AppConfig, DatabaseConfig, Environment};
use crate::database::{DatabaseService, StoreError};
use crate::deps::{Dependencies, GlobalDeps};
use crate::handlers::{static_or_not_found, StaticDir};
use crate::middleware::{CorsMiddleware, LoggingMiddleware, RequestSizeLimitMiddleware, SessionMiddleware};
use crate::routes::RouteTable;
use crate::session::{PgSessionStore, SessionManager, SessionSettings, SessionStore};
use crate::utils::response::error_response;

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("unsupported database URI \"{0}\": expected postgres:// or postgresql://")]
    InvalidUri(String),
    #[error(transparent)]
    Strategy(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] StoreError),
    #[error("auth initialization requires a session store: set db_config or session_store")]
    MissingSessionStore,
    #[error("session TTL of {0} hours is out of range")]
    SessionTtl(i64),
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PassportConfig {
    /// One local strategy per entry; empty means a single `user-local` strategy
    pub strategy_list: Vec<StrategyConfig>,
}

#[derive(Clone, Default)]
pub struct MiddlewareOptions {
    pub db_config: Option<DbConfig>,
    /// An already created pool; wins over `db_config`
    pub database: Option<Arc<DatabaseService>>,
    pub use_passport_login: bool,
    pub passport_config: PassportConfig,
    /// Used instead of the database-backed store when set
    pub session_store: Option<Arc<dyn SessionStore>>,
}

/// Middleware facade configured from the application config
pub struct MidsConfigs {
    config: AppConfig,
}

/// Everything `app` needs to build an actix `App` on each worker
#[derive(Clone)]
pub struct Middlewares {
    pub static_dir: PathBuf,
    pub cors_origin: String,
    pub max_body_size: usize,
    pub api_prefix: String,
    pub environment: Environment,
    pub database: Option<Arc<DatabaseService>>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub strategies: Arc<StrategyRegistry>,
    pub sessions: Arc<SessionManager>,
}

fn check_scheme(uri: &str) -> Result<(), FacadeError> {
    if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
        Ok(())
    } else {
        Err(FacadeError::InvalidUri(uri.to_string()))
    }
}

impl MidsConfigs {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Set up static files, CORS, database, body limits, strategies, sessions and auth, in that order
    pub async fn register_middlewares(&self, options: MiddlewareOptions) -> Result<Middlewares, FacadeError> {
        let config = &self.config;

        // 1. static assets
        let static_dir = PathBuf::from(&config.server.static_dir);
        if !static_dir.is_dir() {
            log::debug!("Static directory {} does not exist yet", static_dir.display());
        }

        // 2. CORS
        let cors_origin = config.cors_origin();
        log::info!("CORS origin: {}", if cors_origin.is_empty() { "<none>" } else { cors_origin.as_str() });

        // 3. database
        let database = match (&options.database, &options.db_config) {
            (Some(db), _) => {
                check_scheme(db.uri())?;
                Some(Arc::clone(db))
            }
            (None, Some(db_config)) => {
                let uri = DatabaseConfig {
                    database_name: db_config.database_name.clone(),
                    ..config.database.clone()
                }
                .uri();
                check_scheme(&uri)?;
                Some(Arc::new(DatabaseService::connect_lazy(&uri, config.database.max_connections)?))
            }
            (None, None) => None,
        };
        if let Some(db) = &database {
            let pinger = Arc::clone(db);
            tokio::spawn(async move {
                match pinger.ping().await {
                    Ok(()) => log::info!("Connected to the database..."),
                    Err(err) => log::error!("Unable to connect to the database... {}", err),
                }
            });
        }

        // 4. body limits are applied per worker in `app`
        let max_body_size = config.security.max_request_size_bytes;

        // 5. local strategies
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.security.bcrypt_cost));
        let strategies = if options.use_passport_login {
            let list = if options.passport_config.strategy_list.is_empty() {
                vec![StrategyConfig::default()]
            } else {
                options.passport_config.strategy_list.clone()
            };
            StrategyRegistry::from_configs(Arc::clone(&hasher), list)?
        } else {
            StrategyRegistry::new(Arc::clone(&hasher))
        };
        let strategies = Arc::new(strategies);

        // 6. session store
        let store: Arc<dyn SessionStore> = match (&options.session_store, &database) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(db)) => {
                check_scheme(db.uri())?;
                let store = Arc::new(PgSessionStore::new(Arc::clone(db)));
                let init = Arc::clone(&store);
                tokio::spawn(async move {
                    if let Err(err) = init.init_schema().await {
                        log::error!("Failed to initialize session table: {}", err);
                    }
                });
                store
            }
            (None, None) => return Err(FacadeError::MissingSessionStore),
        };

        // 7. auth initialization
        let ttl_hours = config.session.ttl_hours;
        let ttl = Some(ttl_hours)
            .filter(|h| *h > 0)
            .and_then(chrono::Duration::try_hours)
            .ok_or(FacadeError::SessionTtl(ttl_hours))?;
        let settings = SessionSettings {
            cookie_name: config.session.cookie_name.clone(),
            ttl,
            secure_cookie: config.session.secure_cookie,
        };
        let sessions = Arc::new(SessionManager::new(store, Arc::clone(&strategies), settings));

        Ok(Middlewares {
            static_dir,
            cors_origin,
            max_body_size,
            api_prefix: config.server.api_prefix.clone(),
            environment: config.environment,
            database,
            hasher,
            strategies,
            sessions,
        })
    }
}

impl Middlewares {
    /// Default dependency bag. The `User` model is the first strategy's model.
    pub fn default_dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::new(GlobalDeps {
            hasher: Arc::clone(&self.hasher),
            tokens: Arc::new(RandomTokens::default()),
            strategies: Arc::clone(&self.strategies),
            sessions: Arc::clone(&self.sessions),
            environment: self.environment,
        });
        deps.models.user = self
            .strategies
            .default_strategy()
            .map(|strategy| Arc::clone(strategy.model()));
        deps
    }

    /// Build the application for one worker
    pub fn app(
        &self,
        routes: &RouteTable,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<BoxBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        let routes = routes.clone();
        let json_config = web::JsonConfig::default()
            .limit(self.max_body_size)
            .error_handler(|err, _req| {
                let message = err.to_string();
                InternalError::from_response(err, error_response(&message, 400)).into()
            });
        let form_config = web::FormConfig::default().limit(self.max_body_size);

        App::new()
            .app_data(json_config)
            .app_data(form_config)
            .app_data(web::Data::new(StaticDir(self.static_dir.clone())))
            .service(web::scope(&self.api_prefix).configure(move |cfg| routes.configure(cfg)))
            .default_service(web::to(static_or_not_found))
            .wrap(SessionMiddleware {
                sessions: Arc::clone(&self.sessions),
            })
            .wrap(RequestSizeLimitMiddleware {
                max_size: self.max_body_size,
            })
            .wrap(CorsMiddleware {
                origin: self.cors_origin.clone(),
                credentials: true,
            })
            .wrap(LoggingMiddleware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryAccountStore;
    use crate::session::MemorySessionStore;
    use serial_test::serial;

    fn config() -> AppConfig {
        let mut config = AppConfig::from_env().unwrap();
        config.environment = Environment::Development;
        config.security.bcrypt_cost = 4;
        config
    }

    #[test]
    fn only_postgres_schemes_are_accepted() {
        assert!(check_scheme("postgres://localhost/app").is_ok());
        assert!(check_scheme("postgresql://localhost/app").is_ok());
        assert!(matches!(check_scheme("mongodb://localhost"), Err(FacadeError::InvalidUri(_))));
    }

    #[actix_rt::test]
    #[serial]
    async fn strategy_without_model_fails_fast() {
        let facade = MidsConfigs::new(config());
        let err = facade
            .register_middlewares(MiddlewareOptions {
                use_passport_login: true,
                session_store: Some(Arc::new(MemorySessionStore::new())),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FacadeError::Strategy(AuthError::MissingModel(_))));
    }

    #[actix_rt::test]
    #[serial]
    async fn sessions_need_a_store() {
        let facade = MidsConfigs::new(config());
        let err = facade
            .register_middlewares(MiddlewareOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FacadeError::MissingSessionStore));
    }

    #[actix_rt::test]
    #[serial]
    async fn oversized_session_ttl_is_an_error() {
        let mut config = config();
        config.session.ttl_hours = i64::MAX / 2;
        let err = MidsConfigs::new(config)
            .register_middlewares(MiddlewareOptions {
                session_store: Some(Arc::new(MemorySessionStore::new())),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FacadeError::SessionTtl(h) if h == i64::MAX / 2));
    }

    #[actix_rt::test]
    #[serial]
    async fn default_deps_use_first_strategy_model() {
        let facade = MidsConfigs::new(config());
        let users = Arc::new(MemoryAccountStore::new("User"));
        let admins = Arc::new(MemoryAccountStore::new("Admin"));

        let mids = facade
            .register_middlewares(MiddlewareOptions {
                use_passport_login: true,
                passport_config: PassportConfig {
                    strategy_list: vec![
                        StrategyConfig::new("user-local", users),
                        StrategyConfig::new("admin-local", admins),
                    ],
                },
                session_store: Some(Arc::new(MemorySessionStore::new())),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(mids.strategies.names(), ["user-local", "admin-local"]);
        let deps = mids.default_dependencies();
        assert_eq!(deps.models.user.as_ref().map(|m| m.model_name()), Some("User"));
    }
}
