use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{RouteFactory, RouteRegistry, RouteTable};
use crate::deps::{Dependencies, DependencyOverrides};

/// File that turns its parent folder into a route group
pub const MARKER_FILE: &str = "api.routes.toml";

#[derive(Debug, thiserror::Error)]
pub enum RouteLoadError {
    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read marker: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid marker: {0}")]
    Marker(#[from] toml::de::Error),
    #[error("no route handler named \"{0}\" is registered")]
    UnknownHandler(String),
    #[error("route group \"{group}\" requires {dependency}")]
    MissingDependency {
        group: String,
        dependency: &'static str,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Marker {
    handler: Option<String>,
}

/// Walks route directories and mounts every marked folder
pub struct RouteLoader<'a> {
    registry: &'a RouteRegistry,
    deps: Arc<Dependencies>,
}

impl<'a> RouteLoader<'a> {
    /// Project overrides are merged into the defaults once for the whole pass
    pub fn new(
        registry: &'a RouteRegistry,
        defaults: Dependencies,
        overrides: Option<DependencyOverrides>,
    ) -> Self {
        let deps = match overrides {
            Some(overrides) => defaults.merge(overrides),
            None => defaults,
        };
        Self {
            registry,
            deps: Arc::new(deps),
        }
    }

    pub fn dependencies(&self) -> &Arc<Dependencies> {
        &self.deps
    }

    pub fn load<P: AsRef<Path>>(&self, base_dirs: &[P]) -> Result<RouteTable, RouteLoadError> {
        let mut table = RouteTable::new();
        for base in base_dirs {
            let base = base.as_ref();
            if !base.exists() {
                log::warn!("Skipping missing directory: {}", base.display());
                continue;
            }
            self.walk(base, &mut table)?;
        }
        log::info!("Route discovery finished: {:?}", table);
        Ok(table)
    }

    fn walk(&self, dir: &Path, table: &mut RouteTable) -> Result<(), RouteLoadError> {
        let read_err = |source: std::io::Error| RouteLoadError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(read_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().map_err(read_err)?;

            if file_type.is_dir() {
                self.walk(&path, table)?;
            } else if entry.file_name() == MARKER_FILE {
                if let Err(err) = self.mount(&path, table) {
                    log::error!("Skipping route module {}: {}", path.display(), err);
                }
            }
        }
        Ok(())
    }

    fn mount(&self, marker_path: &Path, table: &mut RouteTable) -> Result<(), RouteLoadError> {
        let folder = marker_path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let marker: Marker = toml::from_str(&fs::read_to_string(marker_path)?)?;
        let handler = marker.handler.unwrap_or_else(|| folder.clone());

        match self.registry.get(&handler) {
            Some(RouteFactory::Group(_)) if table.has_prefix(&folder) => {
                log::warn!(
                    "Route prefix /{} is already mounted, skipping {}",
                    folder,
                    marker_path.display()
                );
            }
            Some(RouteFactory::Group(factory)) => {
                let group = factory(Arc::clone(&self.deps))?;
                table.push_group(&folder, group);
                log::info!("Mounted route group {} at /{}", handler, folder);
            }
            Some(RouteFactory::Root(register)) => {
                table.push_root(&handler, register, Arc::clone(&self.deps));
                log::info!("Mounted route module {} on the root router", handler);
            }
            None => return Err(RouteLoadError::UnknownHandler(handler)),
        }
        Ok(())
    }
}

/// Discover routes under the project's directory, then the built-in one
pub fn load_routes(
    registry: &RouteRegistry,
    defaults: Dependencies,
    overrides: Option<DependencyOverrides>,
    project_dir: &Path,
) -> Result<RouteTable, RouteLoadError> {
    let loader = RouteLoader::new(registry, defaults, overrides);
    let builtin = PathBuf::from(super::BUILTIN_ROUTES_DIR);

    if project_dir == builtin.as_path() {
        loader.load(&[builtin])
    } else {
        loader.load(&[project_dir.to_path_buf(), builtin])
    }
}
