use clap::{Parser, Subcommand};
use std::process::ExitCode;

use namune::scaffold::{create_project, install_dependencies};

#[derive(Parser, Debug)]
#[command(name = "nmn", version, about = "Generate a namune web project")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new project folder
    Create {
        project_name: Option<String>,
        /// Do not run `cargo fetch` after generating
        #[arg(long)]
        skip_install: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let Command::Create {
        project_name,
        skip_install,
    } = Cli::parse().command;

    let name = match project_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => {
            eprintln!("Usage: nmn create <projectName>");
            return ExitCode::FAILURE;
        }
    };

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("Cannot resolve working directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let created = match create_project(&cwd, &name) {
        Ok(created) => created,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if !skip_install {
        // The project is usable without fetched dependencies
        install_dependencies(&created.root);
    }

    log::info!("Project initialized in {}", created.root.display());
    println!("\n  cd {}\n  cargo run\n", name);
    ExitCode::SUCCESS
}
