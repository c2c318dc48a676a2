use dotenvy::dotenv;
use std::process::ExitCode;

use namune::bootstrap::{self, Project};
use namune::config::AppConfig;

#[actix_web::main]
async fn main() -> ExitCode {
    // Load environment from .env (if present)
    let _ = dotenv();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _logger = bootstrap::init_logging(&config.logging);

    log::info!("Starting namune v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Server: {}:{}", config.server.host, config.server.port);
    log::info!("Workers: {}", config.server.workers);

    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("Cannot resolve working directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match bootstrap::serve(config, Project::at(&root)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
