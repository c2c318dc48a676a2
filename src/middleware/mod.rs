use actix_web::{
    body::BoxBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, Method},
    Error, HttpMessage, HttpResponse,
};

use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;

use crate::session::{SessionContext, SessionManager};

pub const ALLOWED_HEADERS: &str =
    "Origin, X-Requested-With, Content-Type, Accept, Authorization, withCredentials, Content-Disposition";

/// CORS middleware: one allowed origin selected from the environment
pub struct CorsMiddleware {
    pub origin: String,
    pub credentials: bool,
}

impl<S> Transform<S, ServiceRequest> for CorsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsMiddlewareService {
            service: Arc::new(service),
            origin: self.origin.clone(),
            credentials: self.credentials,
        }))
    }
}

pub struct CorsMiddlewareService<S> {
    service: Arc<S>,
    origin: String,
    credentials: bool,
}

impl<S> Service<ServiceRequest> for CorsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let origin = self.origin.clone();
        let credentials = self.credentials;

        Box::pin(async move {
            let preflight = req.method() == Method::OPTIONS
                && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

            let mut res = if preflight {
                req.into_response(HttpResponse::NoContent().finish())
            } else {
                service.call(req).await?
            };

            let headers = res.headers_mut();

            if let Ok(value) = header::HeaderValue::from_str(&origin) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }

            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                header::HeaderValue::from_static(if credentials { "true" } else { "false" }),
            );

            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                header::HeaderValue::from_static(ALLOWED_HEADERS),
            );

            headers.insert(
                header::ACCESS_CONTROL_REQUEST_HEADERS,
                header::HeaderValue::from_static(ALLOWED_HEADERS),
            );

            if preflight {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    header::HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
                );
            }

            Ok(res)
        })
    }
}

/// Request size limiting middleware
pub struct RequestSizeLimitMiddleware {
    pub max_size: usize,
}

impl<S> Transform<S, ServiceRequest> for RequestSizeLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestSizeLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestSizeLimitMiddlewareService {
            service: Arc::new(service),
            max_size: self.max_size,
        }))
    }
}

pub struct RequestSizeLimitMiddlewareService<S> {
    service: Arc<S>,
    max_size: usize,
}

impl<S> Service<ServiceRequest> for RequestSizeLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let max_size = self.max_size;

        Box::pin(async move {
            let declared = req
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());

            if let Some(length) = declared {
                if length > max_size {
                    log::warn!("Rejected body of {} bytes on {}", length, req.path());
                    let response = HttpResponse::PayloadTooLarge().json(serde_json::json!({
                        "success": false,
                        "message": format!("Request size {} exceeds maximum allowed size {}", length, max_size),
                        "data": null
                    }));
                    return Ok(req.into_response(response));
                }
            }

            service.call(req).await
        })
    }
}

/// Resolves the session cookie to the current user and stores a `SessionContext`
pub struct SessionMiddleware {
    pub sessions: Arc<SessionManager>,
}

impl<S> Transform<S, ServiceRequest> for SessionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = SessionMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddlewareService {
            service: Arc::new(service),
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

pub struct SessionMiddlewareService<S> {
    service: Arc<S>,
    sessions: Arc<SessionManager>,
}

impl<S> Service<ServiceRequest> for SessionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let sessions = Arc::clone(&self.sessions);

        Box::pin(async move {
            let sid = req
                .cookie(sessions.cookie_name())
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty());

            let mut context = SessionContext::default();

            if let Some(sid) = sid {
                match sessions.resolve(&sid).await {
                    Ok(Some(user)) => {
                        context.sid = Some(sid);
                        context.user = Some(user);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Unknown strategy tag or deleted account: forget the session
                        log::warn!("Dropping session: {}", err);
                        if let Err(err) = sessions.destroy(&sid).await {
                            log::error!("Failed to destroy session: {}", err);
                        }
                    }
                }
            }

            req.extensions_mut().insert(context);
            service.call(req).await
        })
    }
}

/// Logging middleware
pub struct LoggingMiddleware;

impl<S> Transform<S, ServiceRequest> for LoggingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggingMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggingMiddlewareService {
            service: Arc::new(service),
        }))
    }
}

pub struct LoggingMiddlewareService<S> {
    service: Arc<S>,
}

impl<S> Service<ServiceRequest> for LoggingMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);
        let start_time = std::time::Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let remote_addr = req.connection_info().peer_addr().unwrap_or("unknown").to_string();

        Box::pin(async move {
            let result = service.call(req).await;
            let duration = start_time.elapsed();

            match &result {
                Ok(res) => {
                    log::info!(
                        "{} {} {} {}ms from {}",
                        method, uri, res.status().as_u16(), duration.as_millis(), remote_addr
                    );
                }
                Err(err) => {
                    log::error!(
                        "{} {} failed: {} {}ms from {}",
                        method, uri, err, duration.as_millis(), remote_addr
                    );
                }
            }

            result
        })
    }
}
