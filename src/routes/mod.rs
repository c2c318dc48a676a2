use actix_web::web;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::deps::Dependencies;

pub mod auth;
pub mod example;
pub mod loader;

pub use loader::{load_routes, RouteLoadError, RouteLoader, MARKER_FILE};

/// Route groups shipped with the crate, discovered through their marker files
pub const BUILTIN_ROUTES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/routes");

/// A set of handlers mounted on its own sub-router
pub trait RouteGroup: Send + Sync {
    fn register_routes(self: Arc<Self>, cfg: &mut web::ServiceConfig);
}

pub type GroupFactory = fn(Arc<Dependencies>) -> Result<Arc<dyn RouteGroup>, RouteLoadError>;
pub type RootRegister = fn(&mut web::ServiceConfig, &Arc<Dependencies>);

/// How a marker's handler is mounted
#[derive(Clone, Copy)]
pub enum RouteFactory {
    /// Built with the dependency bag and mounted under the marker's folder name
    Group(GroupFactory),
    /// Registered straight on the top-level router, without a prefix
    Root(RootRegister),
}

/// Handler names a marker file may refer to
#[derive(Clone, Default)]
pub struct RouteRegistry {
    factories: HashMap<String, RouteFactory>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `auth` and `example-route` groups
    pub fn with_builtin() -> Self {
        Self::new()
            .with("auth", RouteFactory::Group(auth::factory))
            .with("example-route", RouteFactory::Group(example::factory))
    }

    pub fn with(mut self, name: &str, factory: RouteFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn register(&mut self, name: &str, factory: RouteFactory) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            log::warn!("Route handler {} registered twice, keeping the last one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<RouteFactory> {
        self.factories.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Clone)]
enum Mount {
    Scoped {
        prefix: String,
        group: Arc<dyn RouteGroup>,
    },
    Root {
        name: String,
        register: RootRegister,
        deps: Arc<Dependencies>,
    },
}

/// Result of a discovery pass, applied to every worker's `App`
#[derive(Clone, Default)]
pub struct RouteTable {
    mounts: Vec<Mount>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_group(&mut self, prefix: &str, group: Arc<dyn RouteGroup>) {
        self.mounts.push(Mount::Scoped {
            prefix: prefix.to_string(),
            group,
        });
    }

    pub fn push_root(&mut self, name: &str, register: RootRegister, deps: Arc<Dependencies>) {
        self.mounts.push(Mount::Root {
            name: name.to_string(),
            register,
            deps,
        });
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.mounts
            .iter()
            .any(|m| matches!(m, Mount::Scoped { prefix: p, .. } if p == prefix))
    }

    /// Sub-router prefixes in mount order
    pub fn prefixes(&self) -> Vec<&str> {
        self.mounts
            .iter()
            .filter_map(|m| match m {
                Mount::Scoped { prefix, .. } => Some(prefix.as_str()),
                Mount::Root { .. } => None,
            })
            .collect()
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        for mount in &self.mounts {
            match mount {
                Mount::Scoped { prefix, group } => {
                    let group = Arc::clone(group);
                    cfg.service(
                        web::scope(&format!("/{}", prefix))
                            .configure(move |scope| group.register_routes(scope)),
                    );
                }
                Mount::Root { register, deps, .. } => register(cfg, deps),
            }
        }
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mounts: Vec<String> = self
            .mounts
            .iter()
            .map(|m| match m {
                Mount::Scoped { prefix, .. } => format!("/{}", prefix),
                Mount::Root { name, .. } => format!("<root:{}>", name),
            })
            .collect();
        f.debug_struct("RouteTable").field("mounts", &mounts).finish()
    }
}
