//! Outbound call-control requests to the telephony provider.
//!
//! The only live-call mutation the engine needs is a redirect: pointing an
//! in-progress call at a new callback URL, which ends its media stream and
//! fetches fresh markup. Used to move a streaming call into the transfer
//! flow and to pull a held caller back to a freed representative.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallControlError {
    #[error("Call-control request failed: {0}")]
    Network(String),

    #[error("Telephony provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Call-control is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait CallControl: Send + Sync {
    /// Points the live call at `url`.
    async fn redirect(&self, call_id: &str, url: &str) -> Result<(), CallControlError>;
}

#[derive(Debug, Clone)]
pub struct HttpCallControlConfig {
    pub api_url: String,
    pub account_id: String,
    pub auth_token: String,
    pub timeout: Duration,
}

/// Posts call updates to `{api_url}/Accounts/{account}/Calls/{call}.json`.
#[derive(Clone)]
pub struct HttpCallControl {
    config: HttpCallControlConfig,
    client: Client,
}

impl HttpCallControl {
    pub fn new(mut config: HttpCallControlConfig) -> Result<Self, CallControlError> {
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CallControlError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn call_url(&self, call_id: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.config.api_url, self.config.account_id, call_id
        )
    }
}

#[async_trait]
impl CallControl for HttpCallControl {
    async fn redirect(&self, call_id: &str, url: &str) -> Result<(), CallControlError> {
        let response = self
            .client
            .post(self.call_url(call_id))
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .form(&[("Url", url), ("Method", "POST")])
            .send()
            .await
            .map_err(|e| CallControlError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallControlError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!(call_id, url, "Call redirected");
        Ok(())
    }
}

/// Used when no telephony credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCallControl;

#[async_trait]
impl CallControl for DisabledCallControl {
    async fn redirect(&self, call_id: &str, url: &str) -> Result<(), CallControlError> {
        debug!(call_id, url, "Redirect skipped, call-control not configured");
        Err(CallControlError::NotConfigured)
    }
}

/// Records redirects instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingCallControl {
    redirects: Mutex<Vec<(String, String)>>,
}

impl RecordingCallControl {
    pub fn redirects(&self) -> Vec<(String, String)> {
        self.redirects.lock().clone()
    }
}

#[async_trait]
impl CallControl for RecordingCallControl {
    async fn redirect(&self, call_id: &str, url: &str) -> Result<(), CallControlError> {
        self.redirects
            .lock()
            .push((call_id.to_string(), url.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn control(server: &MockServer) -> HttpCallControl {
        HttpCallControl::new(HttpCallControlConfig {
            api_url: server.uri(),
            account_id: "AC1".to_string(),
            auth_token: "token".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_redirect_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Accounts/AC1/Calls/CA1.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("Url=https%3A%2F%2Fexample.com%2Fvoice%2Ftransfer"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        control(&server)
            .redirect("CA1", "https://example.com/voice/transfer")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redirect_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such call"))
            .mount(&server)
            .await;

        let err = control(&server)
            .redirect("CA9", "https://example.com/voice/transfer")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallControlError::Status {
                status: 404,
                body: "no such call".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_recording_control_keeps_order() {
        let control = RecordingCallControl::default();
        control.redirect("a", "u1").await.unwrap();
        control.redirect("b", "u2").await.unwrap();
        assert_eq!(
            control.redirects(),
            vec![
                ("a".to_string(), "u1".to_string()),
                ("b".to_string(), "u2".to_string())
            ]
        );
    }
}
