use actix_web::test;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use namune::auth::{PasswordHasher, StrategyConfig};
use namune::config::{AppConfig, Environment};
use namune::database::{AccountStore, MemoryAccountStore};
use namune::deps::{DependencyOverrides, HookEvent, HookPayload};
use namune::facade::{MiddlewareOptions, Middlewares, MidsConfigs, PassportConfig};
use namune::models::{LoginField, NewAccount};
use namune::routes::{RouteLoader, RouteRegistry, RouteTable, BUILTIN_ROUTES_DIR};
use namune::session::MemorySessionStore;

struct Harness {
    mids: Middlewares,
    routes: RouteTable,
    admins: Arc<dyn AccountStore>,
    last_token: Arc<Mutex<Option<String>>>,
    events: Arc<Mutex<Vec<HookEvent>>>,
}

async fn harness() -> Harness {
    let mut config = AppConfig::from_env().expect("config");
    config.environment = Environment::Development;
    config.security.bcrypt_cost = 4;
    config.server.api_prefix = "/v1".to_string();
    config.server.static_dir = "does-not-exist".to_string();

    let users: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new("User"));
    let admins: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new("Admin"));

    let mids = MidsConfigs::new(config)
        .register_middlewares(MiddlewareOptions {
            use_passport_login: true,
            passport_config: PassportConfig {
                strategy_list: vec![
                    StrategyConfig::new("user-local", users).verify_account(|account| {
                        (!account.account_active).then(|| "Please verify your account first!".to_string())
                    }),
                    StrategyConfig::new("admin-local", Arc::clone(&admins))
                        .username_field(LoginField::Username),
                ],
            },
            session_store: Some(Arc::new(MemorySessionStore::new())),
            ..Default::default()
        })
        .await
        .expect("facade");

    let last_token = Arc::new(Mutex::new(None));
    let events = Arc::new(Mutex::new(Vec::new()));

    let mut overrides = DependencyOverrides::default();
    for event in [
        HookEvent::OnSuccessRegister,
        HookEvent::OnSuccessVerify,
        HookEvent::OnFailLogin,
        HookEvent::OnSuccessLogin,
        HookEvent::OnSuccessDeleteUser,
    ] {
        let token = Arc::clone(&last_token);
        let seen = Arc::clone(&events);
        overrides = overrides.on(event, move |payload: &HookPayload| {
            if let Some(t) = &payload.token {
                *token.lock().unwrap() = Some(t.clone());
            }
            seen.lock().unwrap().push(event);
        });
    }

    let registry = RouteRegistry::with_builtin();
    let routes = RouteLoader::new(&registry, mids.default_dependencies(), Some(overrides))
        .load(&[BUILTIN_ROUTES_DIR])
        .expect("routes");

    Harness {
        mids,
        routes,
        admins,
        last_token,
        events,
    }
}

impl Harness {
    fn take_token(&self) -> String {
        self.last_token.lock().unwrap().take().expect("hook received a token")
    }
}

macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service($app, $req.to_request()).await;
        let status = resp.status().as_u16();
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "sid")
            .map(|c| c.into_owned());
        let body: Value = test::read_body_json(resp).await;
        (status, body, cookie)
    }};
}

fn post(uri: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post().uri(uri).set_json(body)
}

const ANN: &str = "ann@example.com";

#[actix_rt::test]
async fn register_verify_login_logout() {
    let h = harness().await;
    let app = test::init_service(h.mids.app(&h.routes)).await;

    let (status, body, _) = send!(
        &app,
        post("/v1/auth/register", json!({"fullName": "Ann Lee", "email": "Ann@Example.com", "password": "secret"}))
    );
    assert_eq!(status, 200);
    assert_eq!(body["message"], "You have now registered!");
    assert_eq!(body["data"]["email"], ANN);
    assert_eq!(body["data"]["accountActive"], false);
    assert!(body["data"].get("token").is_none());
    assert!(body["data"].get("passwordHash").is_none());
    let token = h.take_token();

    let (status, body, _) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "secret"})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Please verify your account first!");

    let (status, body, _) = send!(&app, post("/v1/auth/verify/account", json!({"token": "nope"})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "You entered invalid token!");

    let (status, body, _) = send!(&app, post("/v1/auth/verify/account", json!({ "token": token })));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Your account is now verified!");
    assert_eq!(body["data"]["accountActive"], true);

    // tokens are single use
    let (status, _, _) = send!(&app, post("/v1/auth/verify/account", json!({ "token": token })));
    assert_eq!(status, 400);

    let (status, body, _) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "wrong"})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Incorrect password!");

    let (status, body, _) = send!(
        &app,
        post("/v1/auth/login", json!({"email": "nobody@example.com", "password": "secret"}))
    );
    assert_eq!(status, 401);
    assert_eq!(body["message"], "No user found with that email");

    let (status, body, cookie) =
        send!(&app, post("/v1/auth/login", json!({"email": "ANN@example.com", "password": "secret"})));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Successfully logged in!");
    let cookie = cookie.expect("session cookie");
    assert_eq!(cookie.http_only(), Some(true));

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/login").cookie(cookie.clone()));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["email"], ANN);

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/login"));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "You are not logged in!");

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/logout").cookie(cookie.clone()));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "You successfully logged out!");

    let (status, _, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/login").cookie(cookie));
    assert_eq!(status, 401);

    let events = h.events.lock().unwrap().clone();
    assert!(events.contains(&HookEvent::OnSuccessRegister));
    assert!(events.contains(&HookEvent::OnSuccessLogin));
    assert_eq!(events.iter().filter(|e| **e == HookEvent::OnFailLogin).count(), 3);
}

macro_rules! register_and_verify {
    ($app:expr, $h:expr) => {{
        let (status, _, _) = send!(
            $app,
            post("/v1/auth/register", json!({"fullName": "Ann Lee", "email": ANN, "password": "secret"}))
        );
        assert_eq!(status, 200);
        let token = $h.take_token();
        let (status, _, _) = send!($app, post("/v1/auth/verify/account", json!({ "token": token })));
        assert_eq!(status, 200);
    }};
}

#[actix_rt::test]
async fn forgotten_password_can_be_reset_once() {
    let h = harness().await;
    let app = test::init_service(h.mids.app(&h.routes)).await;
    register_and_verify!(&app, h);

    let (status, body, _) = send!(&app, post("/v1/auth/verify", json!({"email": "ghost@example.com"})));
    assert_eq!(status, 404);
    assert_eq!(body["message"], "That email is not registered!");

    let (status, body, _) = send!(&app, post("/v1/auth/verify-email", json!({ "email": ANN })));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Email Successfully found!");
    let user_id = body["data"]["id"].as_str().unwrap().to_string();
    let token = h.take_token();

    let (status, body, _) = send!(
        &app,
        post("/v1/auth/reset-password", json!({"userId": user_id, "token": "guess", "password": "fresh"}))
    );
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Failed to reset your password. Invalid Token");

    let (status, body, _) = send!(
        &app,
        post("/v1/auth/reset-password", json!({"userId": user_id, "token": token, "password": "fresh"}))
    );
    assert_eq!(status, 200);
    assert_eq!(body["message"], "You successfully reset your password!");

    let (status, _, _) = send!(
        &app,
        post("/v1/auth/reset-password", json!({"userId": user_id, "token": token, "password": "again"}))
    );
    assert_eq!(status, 400);

    let (status, _, _) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "secret"})));
    assert_eq!(status, 401);
    let (status, _, _) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "fresh"})));
    assert_eq!(status, 200);
}

#[actix_rt::test]
async fn delete_account_requires_a_session() {
    let h = harness().await;
    let app = test::init_service(h.mids.app(&h.routes)).await;
    register_and_verify!(&app, h);

    let (status, body, _) = send!(&app, post("/v1/auth/delete-account", json!({})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Not authenticated");

    let (_, _, cookie) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "secret"})));
    let cookie = cookie.expect("session cookie");

    let (status, body, _) =
        send!(&app, post("/v1/auth/delete-account", json!({})).cookie(cookie.clone()));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Account successfully deleted");
    assert_eq!(body["data"]["email"], ANN);

    // the session died with the account
    let (status, _, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/login").cookie(cookie));
    assert_eq!(status, 401);

    let (status, body, _) = send!(&app, post("/v1/auth/login", json!({"email": ANN, "password": "secret"})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "No user found with that email");
    assert!(h.events.lock().unwrap().contains(&HookEvent::OnSuccessDeleteUser));
}

#[actix_rt::test]
async fn sessions_resolve_through_their_strategy_model() {
    let h = harness().await;
    let hash = h.mids.hasher.hash("rootpw").unwrap();
    h.admins
        .insert(NewAccount {
            full_name: "Root".to_string(),
            email: "root@example.com".to_string(),
            username: Some("root".to_string()),
            password_hash: hash,
            token: None,
        })
        .await
        .unwrap();

    let app = test::init_service(h.mids.app(&h.routes)).await;

    // the admin record is not in the default user model
    let (status, body, _) = send!(&app, post("/v1/auth/login", json!({"email": "root@example.com", "password": "rootpw"})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "No user found with that email");

    let (status, body, cookie) = send!(
        &app,
        post("/v1/auth/login", json!({"username": "ROOT", "password": "rootpw", "strategy": "admin-local"}))
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["username"], "root");
    let cookie = cookie.expect("session cookie");

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/auth/login").cookie(cookie));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["email"], "root@example.com");

    let (status_unknown, body_unknown, _) = send!(
        &app,
        post("/v1/auth/login", json!({"username": "root", "password": "rootpw", "strategy": "ghost-local"}))
    );
    assert_eq!(status_unknown, 500);
    assert!(body_unknown["details"].as_str().unwrap().contains("ghost-local"));
}

#[actix_rt::test]
async fn unmatched_routes_get_the_json_404() {
    let h = harness().await;
    let app = test::init_service(h.mids.app(&h.routes)).await;

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/missing"));
    assert_eq!(status, 404);
    assert_eq!(body, json!({"err": "That API route is not found!"}));

    let (status, body, _) = send!(&app, test::TestRequest::get().uri("/v1/example-route/health"));
    assert_eq!(status, 200);
    assert_eq!(body["message"], "YAY! The API is healthy.");
}
