use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail API key is not configured")]
    MissingKey,
    #[error("build client failed: {0}")]
    Client(reqwest::Error),
    #[error("send failed: {0}")]
    Send(reqwest::Error),
    #[error("mail API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Attachment {
    pub filename: String,
    /// Base64 file content
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Client for an HTTP mail API (Resend-compatible)
pub struct Mailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl Mailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Result<Self, MailError> {
        let client = ClientBuilder::new()
            .user_agent(concat!("namune/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(MailError::Client)?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let key = config.api_key.as_deref().ok_or(MailError::MissingKey)?;
        Self::new(&config.api_url, key, &config.from)
    }

    /// Message prefilled with the configured sender
    pub fn compose(&self, to: &str, subject: &str, html: &str) -> SendEmail {
        SendEmail {
            from: self.from.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html: Some(html.to_string()),
            text: None,
            attachments: Vec::new(),
        }
    }

    /// Send and return the provider's response body
    pub async fn send(&self, email: &SendEmail) -> Result<String, MailError> {
        log::debug!("[mail] -> POST {} to {} recipient(s)", self.api_url, email.to.len());

        let t0 = Instant::now();
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| {
                log::error!("Failed to send mail (could be your internet connection): {}", e);
                MailError::Send(e)
            })?;

        let status = res.status();
        let body = res.text().await.map_err(MailError::Send)?;
        log::info!("[mail] <- {} in {} ms", status, t0.elapsed().as_millis());

        if status.is_success() {
            Ok(body)
        } else {
            log::error!("[mail] provider rejected message: {}", super::truncate_string(&body, 512));
            Err(MailError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}
