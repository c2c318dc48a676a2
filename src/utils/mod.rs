pub mod hash;
pub mod mail;
pub mod paginate;
pub mod payfast;
pub mod storage;

/// Mask sensitive values partially (e.g., tokens, emails, passwords)
pub fn mask_sensitive(value: &str) -> String {
    if value.is_empty() {
        return "".to_string();
    }

    // If it looks like an email, mask local part
    if let Some(idx) = value.find('@') {
        let (local, domain) = value.split_at(idx);
        let domain = &domain[1..];
        let visible = if local.chars().count() <= 2 { 1 } else { 2 };
        let shown: String = local.chars().take(visible).collect();
        return format!("{}***@{}", shown, domain);
    }

    let chars: Vec<char> = value.chars().collect();

    // For short strings, show only first character
    if chars.len() <= 4 {
        return format!("{}***", chars[0]);
    }

    // Otherwise show first 4 and last 4 characters
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{}***{}", start, end)
}

/// Truncate string to maximum length
pub fn truncate_string(input: &str, max_len: usize) -> String {
    if input.chars().count() <= max_len {
        input.to_string()
    } else {
        let kept: String = input.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Logging helpers
pub mod logging {
    use log::LevelFilter;

    pub fn level_from_string(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

/// Error handling utilities
pub mod error {
    use actix_web::http::StatusCode;
    use actix_web::{HttpResponse, ResponseError};

    use crate::models::ApiResponse;

    /// Request-level error rendered as the standard `{success, message, data, details?}` body
    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    pub struct AppError {
        pub message: String,
        pub status_code: u16,
        pub details: Option<String>,
    }

    impl AppError {
        pub fn new(message: &str, status_code: u16) -> Self {
            Self {
                message: message.to_string(),
                status_code,
                details: None,
            }
        }

        pub fn bad_request(message: &str) -> Self {
            Self::new(message, 400)
        }

        pub fn unauthorized(message: &str) -> Self {
            Self::new(message, 401)
        }

        pub fn not_found(message: &str) -> Self {
            Self::new(message, 404)
        }

        pub fn internal_server_error(message: &str) -> Self {
            Self::new(message, 500)
        }

        pub fn with_details(mut self, details: Option<String>) -> Self {
            self.details = details;
            self
        }
    }

    impl ResponseError for AppError {
        fn status_code(&self) -> StatusCode {
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }

        fn error_response(&self) -> HttpResponse {
            HttpResponse::build(self.status_code())
                .json(ApiResponse::<()>::error(&self.message).with_details(self.details.clone()))
        }
    }
}

/// Response helpers
pub mod response {
    use actix_web::http::StatusCode;
    use actix_web::HttpResponse;
    use serde::Serialize;

    use crate::models::ApiResponse;

    pub fn json_response<T: Serialize>(data: T, status: u16) -> HttpResponse {
        match StatusCode::from_u16(status) {
            Ok(code) => HttpResponse::build(code)
                .content_type("application/json")
                .json(data),
            Err(_) => HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
                .content_type("application/json")
                .json(ApiResponse::<()>::error("Invalid status code")),
        }
    }

    pub fn success_response<T: Serialize>(message: &str, data: Option<T>) -> HttpResponse {
        json_response(ApiResponse::success(message, data), 200)
    }

    pub fn error_response(message: &str, status: u16) -> HttpResponse {
        json_response(ApiResponse::<()>::error(message), status)
    }

    pub fn validation_error_response(errors: Vec<String>) -> HttpResponse {
        let message = if errors.is_empty() {
            "Invalid request".to_string()
        } else {
            errors.join(", ")
        };
        json_response(ApiResponse::<Vec<String>>::error(message).with_data(errors), 400)
    }

    pub fn flatten_validation_errors(err: validator::ValidationErrors) -> Vec<String> {
        let mut msgs = Vec::new();
        for (field, errors) in err.field_errors().iter() {
            for e in errors.iter() {
                let message = if let Some(m) = &e.message {
                    m.to_string()
                } else {
                    format!("{} {}", field, e.code)
                };
                msgs.push(message);
            }
        }
        msgs.sort();
        msgs
    }
}
