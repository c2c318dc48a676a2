use actix_web::HttpServer;
use flexi_logger::LoggerHandle;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::auth::StrategyConfig;
use crate::config::{AppConfig, LoggingConfig};
use crate::database::{AccountStore, DatabaseService, PgAccountStore};
use crate::deps::DependencyOverrides;
use crate::facade::{MiddlewareOptions, MidsConfigs, PassportConfig};
use crate::models::ModelDefinition;
use crate::routes::{load_routes, RouteRegistry};
use crate::session::SessionManager;
use crate::utils::mail::Mailer;
use crate::utils::payfast::{PayFast, PayFastSettings};
use crate::utils::storage::ObjectStorage;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// What a project brings to the server: its routes, its user model and its overrides
pub struct Project {
    pub routes_dir: PathBuf,
    pub user_model: ModelDefinition,
    pub registry: RouteRegistry,
    pub overrides: Option<DependencyOverrides>,
}

impl Project {
    /// Conventional layout under `root`: `routes/` and `models/user.toml`
    pub fn at(root: &Path) -> Self {
        let model_path = root.join("models").join("user.toml");
        let user_model = if model_path.is_file() {
            match ModelDefinition::load(&model_path) {
                Ok(model) => model,
                Err(err) => {
                    log::error!("Ignoring {}: {}", model_path.display(), err);
                    ModelDefinition::default()
                }
            }
        } else {
            ModelDefinition::default()
        };

        Self {
            routes_dir: root.join("routes"),
            user_model,
            registry: RouteRegistry::with_builtin(),
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: DependencyOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// Start logging to `logs/` and stdout, or stderr only when the file logger cannot start.
///
/// Keep the returned handle alive for the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Option<LoggerHandle> {
    let directory = config
        .file_path
        .clone()
        .unwrap_or_else(|| "logs".to_string());

    let started = flexi_logger::Logger::try_with_str(&config.level).and_then(|logger| {
        logger
            .log_to_file(flexi_logger::FileSpec::default().directory(directory).suppress_timestamp())
            .duplicate_to_stdout(flexi_logger::Duplicate::Info)
            .start()
    });

    match started {
        Ok(handle) => Some(handle),
        Err(err) => {
            let log_level = crate::utils::logging::level_from_string(&config.level);
            let _ = env_logger::builder()
                .filter_level(log_level)
                .format_timestamp_secs()
                .try_init();
            log::warn!("File logging unavailable ({}), logging to stderr", err);
            None
        }
    }
}

fn io_error(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::other(err)
}

fn spawn_session_cleanup(sessions: Arc<SessionManager>) {
    tokio::spawn(async move {
        let mut ticker = interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match sessions.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => log::info!("Cleaned up {} expired sessions", removed),
                Err(e) => log::error!("Failed to cleanup expired sessions: {}", e),
            }
        }
    });
}

/// Wire the facade, the user model and discovered routes, then run the HTTP server
pub async fn serve(config: AppConfig, project: Project) -> io::Result<()> {
    let db = Arc::new(
        DatabaseService::connect_lazy(&config.database.uri(), config.database.max_connections)
            .map_err(io_error)?,
    );

    let model = &project.user_model;
    let users = Arc::new(PgAccountStore::new(Arc::clone(&db), &model.name, &model.table).map_err(io_error)?);
    if let Err(e) = users.init_schema().await {
        log::error!("Failed to initialize {} table: {}", model.name, e);
    }

    let user_store: Arc<dyn AccountStore> = users;
    let mids = MidsConfigs::new(config.clone())
        .register_middlewares(MiddlewareOptions {
            database: Some(db),
            use_passport_login: true,
            passport_config: PassportConfig {
                strategy_list: vec![StrategyConfig::new(&model.strategy_name, user_store)
                    .username_field(model.username_field)],
            },
            ..Default::default()
        })
        .await
        .map_err(io_error)?;

    let mut deps = mids.default_dependencies();
    deps.utils.mailer = match Mailer::from_config(&config.mail) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(e) => {
            log::debug!("Mailer disabled: {}", e);
            None
        }
    };
    deps.utils.storage = match ObjectStorage::from_config(&config.storage) {
        Ok(storage) => Some(Arc::new(storage)),
        Err(e) => {
            log::debug!("Object storage disabled: {}", e);
            None
        }
    };
    deps.utils.payfast = Some(Arc::new(PayFast::new(PayFastSettings::from_config(
        &config.payments,
        config.environment,
        &config.cors_origin(),
    ))));

    let routes = load_routes(&project.registry, deps, project.overrides, &project.routes_dir)
        .map_err(io_error)?;

    spawn_session_cleanup(Arc::clone(&mids.sessions));

    log::info!("Listening on {}:{} ({:?})", config.server.host, config.server.port, config.environment);

    HttpServer::new(move || mids.app(&routes))
        .bind((config.server.host.clone(), config.server.port))?
        .workers(config.server.workers.max(1))
        .run()
        .await
}
