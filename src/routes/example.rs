use actix_web::{web, HttpResponse, Result};
use std::sync::Arc;

use super::{RouteGroup, RouteLoadError};
use crate::deps::Dependencies;
use crate::utils::response::success_response;

/// Minimal resource new projects start from
pub struct ExampleRoutes;

pub fn factory(_deps: Arc<Dependencies>) -> Result<Arc<dyn RouteGroup>, RouteLoadError> {
    Ok(Arc::new(ExampleRoutes))
}

pub async fn get_example() -> Result<HttpResponse> {
    Ok(success_response::<()>("Successfully found example!", None))
}

pub async fn get_example_health() -> Result<HttpResponse> {
    Ok(success_response::<()>("YAY! The API is healthy.", None))
}

impl RouteGroup for ExampleRoutes {
    fn register_routes(self: Arc<Self>, cfg: &mut web::ServiceConfig) {
        cfg.route("/", web::get().to(get_example))
            .route("/health", web::get().to(get_example_health));
    }
}
