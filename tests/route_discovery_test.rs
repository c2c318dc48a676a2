use actix_web::{test, web, HttpResponse};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use namune::config::AppConfig;
use namune::deps::Dependencies;
use namune::facade::{MiddlewareOptions, Middlewares, MidsConfigs};
use namune::routes::{
    load_routes, RouteFactory, RouteGroup, RouteLoadError, RouteRegistry, MARKER_FILE,
};
use namune::session::MemorySessionStore;

struct Shop {
    deps: Arc<Dependencies>,
}

async fn items(shop: web::Data<Shop>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "items": ["tea", "coffee"],
        "development": shop.deps.global.environment.is_development(),
    }))
}

impl RouteGroup for Shop {
    fn register_routes(self: Arc<Self>, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self))
            .route("/items", web::get().to(items));
    }
}

fn shop(deps: Arc<Dependencies>) -> Result<Arc<dyn RouteGroup>, RouteLoadError> {
    Ok(Arc::new(Shop { deps }))
}

async fn hello() -> HttpResponse {
    HttpResponse::Ok().json(json!({"hello": "world"}))
}

fn root_hello(cfg: &mut web::ServiceConfig, _: &Arc<Dependencies>) {
    cfg.route("/hello", web::get().to(hello));
}

fn marker(root: &Path, rel: &str, content: &str) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MARKER_FILE), content).unwrap();
}

async fn middlewares(static_dir: &Path) -> Middlewares {
    let mut config = AppConfig::from_env().expect("config");
    config.server.api_prefix = "/v1".to_string();
    config.server.static_dir = static_dir.to_string_lossy().into_owned();

    MidsConfigs::new(config)
        .register_middlewares(MiddlewareOptions {
            session_store: Some(Arc::new(MemorySessionStore::new())),
            ..Default::default()
        })
        .await
        .expect("facade")
}

#[actix_rt::test]
async fn project_and_builtin_groups_share_one_router() {
    let project = TempDir::new().unwrap();
    let routes_dir = project.path().join("routes");
    marker(&routes_dir, "shop", "");
    marker(&routes_dir, "misc/hello", "handler = \"hello\"\n");
    marker(&routes_dir, "nested/v2/status", "handler = \"example-route\"\n");
    marker(&routes_dir, "legacy", "handler = \"gone\"\n");
    marker(&routes_dir, "typo", "hander = \"shop\"\n");

    let public = project.path().join("public");
    fs::create_dir_all(&public).unwrap();
    fs::write(public.join("index.html"), "<h1>home</h1>").unwrap();

    let mids = middlewares(&public).await;
    let registry = RouteRegistry::with_builtin()
        .with("shop", RouteFactory::Group(shop))
        .with("hello", RouteFactory::Root(root_hello));
    let routes = load_routes(&registry, mids.default_dependencies(), None, &routes_dir).unwrap();

    // shop, hello, status and the builtin example; auth needs a user model
    assert_eq!(routes.len(), 4);
    assert_eq!(routes.prefixes(), vec!["status", "shop", "example-route"]);

    let app = test::init_service(mids.app(&routes)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/v1/shop/items").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["items"], json!(["tea", "coffee"]));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/v1/hello").to_request()).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/v1/status/health").to_request()).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/v1/example-route/").to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Successfully found example!");

    for missing in ["/v1/legacy", "/v1/typo", "/v1/auth/login"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(missing).to_request()).await;
        assert_eq!(resp.status(), 404, "{}", missing);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["err"], "That API route is not found!");
    }

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"<h1>home</h1>");
}

#[actix_rt::test]
async fn cors_headers_wrap_discovered_routes() {
    let project = TempDir::new().unwrap();
    let mids = middlewares(project.path()).await;
    let routes = load_routes(
        &RouteRegistry::with_builtin(),
        mids.default_dependencies(),
        None,
        &project.path().join("routes"),
    )
    .unwrap();
    let origin = mids.cors_origin.clone();
    let app = test::init_service(mids.app(&routes)).await;

    let req = test::TestRequest::get()
        .uri("/v1/example-route/health")
        .insert_header(("Origin", origin.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-credentials").and_then(|v| v.to_str().ok()),
        Some("true")
    );
}
