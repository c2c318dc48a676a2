pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod deps;
pub mod facade;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scaffold;
pub mod session;
pub mod utils;

// Note: avoid glob re-exports to prevent ambiguous symbol re-exports
// Consumers should reference items through their module paths, e.g.:
// `namune::facade::MidsConfigs` or `namune::utils::paginate::paginate`.
