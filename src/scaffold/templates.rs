//! File contents written by `nmn create`

const GITIGNORE: &str = "/target\n.env\nlogs/\n";

const MAIN_RS: &str = r#"mod deps;

use namune::bootstrap::{self, Project};
use namune::config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env().map_err(std::io::Error::other)?;
    let _logger = bootstrap::init_logging(&config.logging);

    let project = Project::at(std::path::Path::new(env!("CARGO_MANIFEST_DIR")))
        .with_overrides(deps::overrides());
    bootstrap::serve(config, project).await
}
"#;

const DEPS_RS: &str = r#"use namune::deps::{DependencyOverrides, HookEvent, HookPayload};

/// Project overrides merged into the default dependency bag.
/// Only the keys set here replace defaults.
pub fn overrides() -> DependencyOverrides {
    DependencyOverrides::default()
        .on(HookEvent::OnSuccessRegister, |payload: &HookPayload| {
            // payload.token carries the verification token to email
            log::info!("{}", payload.message);
        })
        .on(HookEvent::OnFailLogin, |payload: &HookPayload| {
            log::warn!("Login failed: {}", payload.message);
        })
}
"#;

const EXAMPLE_MARKER: &str = "# Mounted at /v1/example-route\nhandler = \"example-route\"\n";

const USER_MODEL: &str = r#"[model]
name = "User"
table = "users"
username_field = "email"
strategy_name = "user-local"
"#;

fn database_name(project: &str) -> String {
    project.replace('-', "_").to_lowercase()
}

fn env_file(project: &str) -> String {
    let db = database_name(project);
    format!(
        "DATABASE_URL=postgres://localhost:5432/{db}\n\
         DATABASE_NAME={db}\n\
         PORT=8000\n\
         APP_ENV=development\n\
         LOG_LEVEL=info\n\
         CORS_DEV_URL=http://localhost:3000\n"
    )
}

fn cargo_toml(project: &str) -> String {
    format!(
        r#"[package]
name = "{project}"
version = "0.1.0"
edition = "2021"

[dependencies]
namune = "{version}"
actix-web = "4"
dotenvy = "0.15"
log = "0.4"
"#,
        version = env!("CARGO_PKG_VERSION")
    )
}

/// Relative path and content of every generated file
pub fn files(project: &str) -> Vec<(&'static str, String)> {
    vec![
        (".gitignore", GITIGNORE.to_string()),
        (".env", env_file(project)),
        ("Cargo.toml", cargo_toml(project)),
        ("src/main.rs", MAIN_RS.to_string()),
        ("src/deps.rs", DEPS_RS.to_string()),
        ("routes/example-route/api.routes.toml", EXAMPLE_MARKER.to_string()),
        ("models/user.toml", USER_MODEL.to_string()),
    ]
}
