use actix_files::NamedFile;
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse, Responder, Result};
use std::path::{Component, Path, PathBuf};

pub const NOT_FOUND_MESSAGE: &str = "That API route is not found!";

/// Directory served for requests no route matched
#[derive(Debug, Clone)]
pub struct StaticDir(pub PathBuf);

/// Body for unmatched routes
pub async fn not_found() -> Result<HttpResponse> {
    Ok(HttpResponse::NotFound().json(serde_json::json!({ "err": NOT_FOUND_MESSAGE })))
}

/// Resolve a request path inside `root`, refusing anything that could climb out of it
fn resolve_static(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }

    let candidate = root.join(relative);
    if candidate.is_dir() {
        let index = candidate.join("index.html");
        return index.is_file().then_some(index);
    }
    candidate.is_file().then_some(candidate)
}

/// Default service: a static file when one exists, the JSON 404 otherwise
pub async fn static_or_not_found(
    req: HttpRequest,
    dir: Option<web::Data<StaticDir>>,
) -> Result<HttpResponse> {
    if req.method() == Method::GET || req.method() == Method::HEAD {
        if let Some(path) = dir.and_then(|d| resolve_static(&d.0, req.path())) {
            let file = NamedFile::open_async(&path).await?;
            return Ok(file.respond_to(&req).map_into_boxed_body());
        }
    }
    not_found().await
}
