use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

/// Raw answer from the processing backend.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// The HTTP seam of an upload session.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Send one already-encoded multipart body. Any status code is returned as a
    /// response; only failures to send or receive are errors.
    async fn post_multipart(
        &self,
        endpoint: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> AppResult<BackendResponse>;

    /// Ask the server whether it is up.
    async fn health_check(&self, endpoint: &str) -> AppResult<bool>;
}

/// reqwest-backed client for the processing server
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vecpic-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn post_multipart(
        &self,
        endpoint: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> AppResult<BackendResponse> {
        log::debug!("POST {} ({} bytes)", endpoint, body.len());

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await?.to_vec();

        log::debug!(
            "Backend answered {} ({} bytes, content type {:?})",
            status,
            body.len(),
            content_type
        );

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }

    async fn health_check(&self, endpoint: &str) -> AppResult<bool> {
        let url = health_url(endpoint)?;
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            log::warn!("Health check answered {}", response.status());
            return Ok(false);
        }

        let health: HealthResponse = response.json().await?;
        Ok(health.status.eq_ignore_ascii_case("ok"))
    }
}

/// The server's index route sits at the root of the endpoint's origin.
pub fn health_url(endpoint: &str) -> AppResult<reqwest::Url> {
    let mut url = InputValidator::validate_endpoint(endpoint)?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Map a transport failure to a loggable description without leaking the full
/// error chain into user-facing state.
pub fn describe_transport_error(error: &AppError) -> String {
    match error {
        AppError::Network(e) if e.is_timeout() => "request timed out".to_string(),
        AppError::Network(e) if e.is_connect() => "could not connect to server".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url() {
        assert_eq!(
            health_url("http://127.0.0.1:5000/vecpic?x=1").unwrap().as_str(),
            "http://127.0.0.1:5000/"
        );
        assert!(health_url("nope").is_err());
    }

    #[test]
    fn test_describe_transport_error() {
        let err = AppError::Transport("socket closed".into());
        assert_eq!(describe_transport_error(&err), "Transport error: socket closed");
    }
}
