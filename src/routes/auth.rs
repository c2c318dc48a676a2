use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Result};
use std::fmt::Display;
use std::sync::Arc;
use validator::Validate;

use super::{RouteGroup, RouteLoadError};
use crate::auth::{current_user, hash_token, AuthError, AuthOutcome, Authenticated};
use crate::database::{AccountStore, StoreError};
use crate::deps::{Dependencies, HookEvent, HookPayload};
use crate::models::{
    AccountView, ApiResponse, LoginRequest, NewAccount, RegisterRequest, ResetPasswordRequest,
    TokenRequest, VerifyRequest,
};
use crate::session::SessionContext;
use crate::utils::hash::gen_hash;
use crate::utils::mask_sensitive;
use crate::utils::response::{flatten_validation_errors, json_response, validation_error_response};

/// Account lifecycle handlers bound to the `User` model
pub struct AuthRoutes {
    deps: Arc<Dependencies>,
    users: Arc<dyn AccountStore>,
}

pub fn factory(deps: Arc<Dependencies>) -> Result<Arc<dyn RouteGroup>, RouteLoadError> {
    let users = deps
        .models
        .user
        .clone()
        .ok_or(RouteLoadError::MissingDependency {
            group: "auth".to_string(),
            dependency: "models.user",
        })?;
    Ok(Arc::new(AuthRoutes::new(deps, users)))
}

impl AuthRoutes {
    pub fn new(deps: Arc<Dependencies>, users: Arc<dyn AccountStore>) -> Self {
        Self { deps, users }
    }

    /// Error text for the `details` field, only in development
    fn details(&self, err: &dyn Display) -> Option<String> {
        self.deps
            .global
            .environment
            .is_development()
            .then(|| err.to_string())
    }

    /// Fire the hook for `event` and render the same payload as the response body
    fn reply(&self, event: HookEvent, status: u16, payload: HookPayload, details: Option<String>) -> HttpResponse {
        self.deps.fire(event, &payload);

        let body = ApiResponse {
            success: payload.success,
            message: payload.message,
            data: payload.data.as_ref().map(AccountView::from),
            details,
        };
        json_response(body, status)
    }

    fn fail(&self, event: HookEvent, status: u16, message: &str) -> HttpResponse {
        self.reply(event, status, HookPayload::failure(message), None)
    }

    fn fail_with(&self, event: HookEvent, status: u16, message: &str, err: &dyn Display) -> HttpResponse {
        log::error!("{}: {}", message, err);
        let details = self.details(err);
        self.reply(event, status, HookPayload::failure(message), details)
    }
}

fn session_id(req: &HttpRequest) -> Option<String> {
    req.extensions()
        .get::<SessionContext>()
        .and_then(|ctx| ctx.sid.clone())
}

/// Register a user
pub async fn register(
    routes: web::Data<AuthRoutes>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let r = body.into_inner();
    if let Err(e) = r.validate() {
        let msgs = flatten_validation_errors(e);
        routes.deps.fire(HookEvent::OnFailRegister, &HookPayload::failure(&msgs.join(", ")));
        return Ok(validation_error_response(msgs));
    }

    let hashed = gen_hash(routes.deps.global.hasher.as_ref(), "password", &r.password);
    let password_hash = match hashed.hash {
        Some(hash) => hash,
        None => {
            return Ok(routes.fail_with(HookEvent::OnFailRegister, 500, "Unable to save user!", &hashed.message))
        }
    };

    let token = routes.deps.global.tokens.generate();
    let new_account = NewAccount {
        full_name: r.full_name.trim().to_string(),
        email: r.email.trim().to_lowercase(),
        username: r.username.map(|u| u.trim().to_lowercase()),
        password_hash,
        token: Some(hash_token(&token)),
    };

    match routes.users.insert(new_account).await {
        Ok(account) => {
            log::info!("Registered {} in {}", account.id, routes.users.model_name());
            let payload = HookPayload::success("You have now registered!", Some(account)).with_token(token);
            Ok(routes.reply(HookEvent::OnSuccessRegister, 200, payload, None))
        }
        // Answered with 500 like every other save failure
        Err(StoreError::Duplicate) => Ok(routes.fail(HookEvent::OnFailRegister, 500, "Account already exists!")),
        Err(err) => Ok(routes.fail_with(HookEvent::OnFailRegister, 500, "Unable to save user!", &err)),
    }
}

/// Activate the account holding `token`
pub async fn verify_user(
    routes: web::Data<AuthRoutes>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    let event = HookEvent::OnFailVerifyUser;

    let mut account = match routes.users.find_by_token(&hash_token(&body.token)).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(routes.fail(event, 400, "You entered invalid token!")),
        Err(err) => return Ok(routes.fail_with(event, 500, "Error occured on the server!", &err)),
    };

    match routes.users.activate(account.id).await {
        Ok(true) => {
            account.account_active = true;
            account.token = None;
            let payload = HookPayload::success("Your account is now verified!", Some(account));
            Ok(routes.reply(HookEvent::OnSuccessVerifyUser, 200, payload, None))
        }
        Ok(false) => Ok(routes.fail(event, 500, "You have not registered!")),
        Err(err) => Ok(routes.fail_with(event, 500, "There was an error, try again later.", &err)),
    }
}

/// Current user, behind the login guard
pub async fn get_user_login(user: Authenticated) -> Result<HttpResponse> {
    let account = user.into_inner();
    Ok(json_response(
        ApiResponse::success("Successfully logged in!", Some(account.view())),
        200,
    ))
}

/// Authenticate with a local strategy and start a session
pub async fn login(
    req: HttpRequest,
    routes: web::Data<AuthRoutes>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let event = HookEvent::OnFailLogin;
    let body = body.into_inner();
    let registry = &routes.deps.global.strategies;

    let strategy = match body.strategy.as_deref() {
        Some(name) => registry.get(name),
        None => registry
            .default_strategy()
            .ok_or_else(|| AuthError::InvalidStrategy(String::new())),
    };
    let strategy = match strategy {
        Ok(strategy) => strategy,
        Err(err) => return Ok(routes.fail_with(event, 500, "Error occurred on the server!", &err)),
    };

    let identifier = match body.identifier(strategy.username_field()) {
        Some(identifier) => identifier,
        None => return Ok(routes.fail(event, 401, "Missing credentials")),
    };

    let account = match registry.authenticate(strategy.name(), identifier, &body.password).await {
        Ok(AuthOutcome::Success(account)) => account,
        Ok(AuthOutcome::Failure(message)) => {
            log::info!("Login rejected for {} via {}", mask_sensitive(identifier), strategy.name());
            return Ok(routes.fail(event, 401, &message));
        }
        Err(err) => return Ok(routes.fail_with(event, 500, "Error occurred on the server!", &err)),
    };

    let sessions = &routes.deps.global.sessions;
    if let Some(previous) = session_id(&req) {
        if let Err(err) = sessions.destroy(&previous).await {
            log::warn!("Failed to drop previous session: {}", err);
        }
    }

    let cookie = match sessions.log_in(&account, strategy.name()).await {
        Ok(cookie) => cookie,
        Err(err) => return Ok(routes.fail_with(event, 500, "Error occurred on the server!", &err)),
    };

    let view = account.view();
    routes.deps.fire(
        HookEvent::OnSuccessLogin,
        &HookPayload::success("Successfully logged in!", Some(account)),
    );
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::success("Successfully logged in!", Some(view))))
}

/// End the current session
pub async fn logout(req: HttpRequest, routes: web::Data<AuthRoutes>) -> Result<HttpResponse> {
    let sid = session_id(&req);

    match routes.deps.global.sessions.log_out(sid.as_deref()).await {
        Ok(cookie) => {
            let payload = HookPayload::success("You successfully logged out!", None);
            routes.deps.fire(HookEvent::OnSuccessLogout, &payload);
            Ok(HttpResponse::Ok()
                .cookie(cookie)
                .json(ApiResponse::<AccountView>::success(payload.message, None)))
        }
        Err(err) => Ok(routes.fail_with(HookEvent::OnFailLogout, 500, "Error during logout", &err)),
    }
}

/// Find an account by email or username and issue a password-reset token
pub async fn verify(
    routes: web::Data<AuthRoutes>,
    body: web::Json<VerifyRequest>,
) -> Result<HttpResponse> {
    let event = HookEvent::OnFailVerify;

    let (field, value) = match body.lookup() {
        Some(lookup) => lookup,
        None => return Ok(routes.fail(event, 400, "An email or username is required!")),
    };

    let account = match routes.users.find_by_login(field, &value.trim().to_lowercase()).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(routes.fail(event, 404, &format!("That {} is not registered!", field))),
        Err(err) => return Ok(routes.fail_with(event, 500, "Error occurred on the server!", &err)),
    };

    let token = routes.deps.global.tokens.generate();
    match routes.users.set_token(account.id, &hash_token(&token)).await {
        Ok(true) => {
            let payload = HookPayload::success("Email Successfully found!", Some(account)).with_token(token);
            Ok(routes.reply(HookEvent::OnSuccessVerify, 200, payload, None))
        }
        Ok(false) => Ok(routes.fail(event, 500, "Server failed to process your request!")),
        Err(err) => Ok(routes.fail_with(event, 500, "Error occurred on the server!", &err)),
    }
}

/// Set a new password with the token issued by `verify`
pub async fn change_password(
    routes: web::Data<AuthRoutes>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse> {
    let event = HookEvent::OnFailChangePassword;
    let r = body.into_inner();
    if let Err(e) = r.validate() {
        let msgs = flatten_validation_errors(e);
        routes.deps.fire(event, &HookPayload::failure(&msgs.join(", ")));
        return Ok(validation_error_response(msgs));
    }

    let invalid = "Failed to reset your password. Invalid Token";
    let account = match routes.users.find_by_id(r.user_id).await {
        Ok(Some(account)) => account,
        Ok(None) => return Ok(routes.fail(event, 400, invalid)),
        Err(err) => return Ok(routes.fail_with(event, 500, "Unable to change your password!", &err)),
    };
    if account.token.as_deref() != Some(hash_token(&r.token).as_str()) {
        return Ok(routes.fail(event, 400, invalid));
    }

    let hashed = gen_hash(routes.deps.global.hasher.as_ref(), "password", &r.password);
    let password_hash = match hashed.hash {
        Some(hash) => hash,
        None => return Ok(routes.fail_with(event, 500, "Unable to change your password!", &hashed.message)),
    };

    match routes.users.reset_password(account.id, &password_hash).await {
        Ok(Some(updated)) => {
            let payload = HookPayload::success("You successfully reset your password!", Some(updated));
            Ok(routes.reply(HookEvent::OnSuccessChangePassword, 200, payload, None))
        }
        Ok(None) => Ok(routes.fail(event, 400, invalid)),
        Err(err) => Ok(routes.fail_with(event, 500, "Unable to change your password!", &err)),
    }
}

/// Delete the logged-in account and end its session
pub async fn delete_account(req: HttpRequest, routes: web::Data<AuthRoutes>) -> Result<HttpResponse> {
    let event = HookEvent::OnFailDeleteUser;

    let account = match current_user(&req) {
        Some(account) => account,
        None => return Ok(routes.fail(event, 401, "Not authenticated")),
    };

    match routes.users.delete(account.id).await {
        Ok(true) => {}
        Ok(false) => return Ok(routes.fail(event, 404, "User not found")),
        Err(err) => return Ok(routes.fail_with(event, 500, "Account deletion failed", &err)),
    }

    let sessions = &routes.deps.global.sessions;
    let cookie = match sessions.log_out(session_id(&req).as_deref()).await {
        Ok(cookie) => Some(cookie),
        Err(err) => {
            log::error!("Logout error: {}", err);
            None
        }
    };

    let view = account.view();
    routes.deps.fire(
        HookEvent::OnSuccessDeleteUser,
        &HookPayload::success("Account successfully deleted", Some(account)),
    );

    let mut res = HttpResponse::Ok();
    if let Some(cookie) = cookie {
        res.cookie(cookie);
    }
    Ok(res.json(ApiResponse::success("Account successfully deleted", Some(view))))
}

impl RouteGroup for AuthRoutes {
    fn register_routes(self: Arc<Self>, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self))
            .route("/register", web::post().to(register))
            .route("/verify/account", web::post().to(verify_user))
            .route("/login", web::get().to(get_user_login))
            .route("/login", web::post().to(login))
            .route("/logout", web::get().to(logout))
            .route("/verify", web::post().to(verify))
            .route("/verify-email", web::post().to(verify))
            .route("/reset-password", web::post().to(change_password))
            .route("/delete-account", web::post().to(delete_account));
    }
}
