use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub mod templates;

#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("project name must not be empty")]
    MissingName,
    #[error("invalid project name \"{0}\": use letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("folder {} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Folders every generated project starts with
pub const FOLDERS: [&str; 5] = ["routes", "routes/example-route", "models", "src", "public"];

/// What a `create` run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub root: PathBuf,
    pub folders: Vec<String>,
    pub files: Vec<String>,
}

fn validate_name(name: &str) -> Result<(), ScaffoldError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ScaffoldError::MissingName);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ScaffoldError::InvalidName(name.to_string()))
    }
}

/// Create `<parent>/<name>` with the project skeleton. Refuses an existing folder.
pub fn create_project(parent: &Path, name: &str) -> Result<Created, ScaffoldError> {
    validate_name(name)?;
    let root = parent.join(name.trim());
    if root.exists() {
        return Err(ScaffoldError::AlreadyExists(root));
    }

    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ScaffoldError::Write { path, source }
    };

    let mut created = Created {
        root: root.clone(),
        folders: Vec::new(),
        files: Vec::new(),
    };

    fs::create_dir_all(&root).map_err(write_err(&root))?;
    for folder in FOLDERS {
        let path = root.join(folder);
        fs::create_dir_all(&path).map_err(write_err(&path))?;
        log::info!("Created folder: {}", folder);
        created.folders.push(folder.to_string());
    }

    for (file, content) in templates::files(name.trim()) {
        let path = root.join(file);
        fs::write(&path, content).map_err(write_err(&path))?;
        log::info!("Created file: {}", file);
        created.files.push(file.to_string());
    }

    Ok(created)
}

/// Fetch the generated project's dependencies. Failure is reported, never fatal.
pub fn install_dependencies(root: &Path) -> Option<ExitStatus> {
    log::info!("Installing dependencies with cargo fetch...");
    match Command::new("cargo").arg("fetch").current_dir(root).status() {
        Ok(status) if status.success() => {
            log::info!("Dependencies installed");
            Some(status)
        }
        Ok(status) => {
            log::error!("cargo fetch exited with {}", status);
            Some(status)
        }
        Err(err) => {
            log::error!("Unable to run cargo fetch: {}", err);
            None
        }
    }
}
