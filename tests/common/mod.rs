#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::util::ServiceExt;

use callbridge::core::call_control::RecordingCallControl;
use callbridge::core::directory::{
    EmployeeRecord, Identity, InMemoryDirectory, Job, ProviderContext,
};
use callbridge::core::speech::{Recognition, SpeechError, SpeechResult, SpeechService};
use callbridge::{ServerConfig, routes, state::AppState};

pub const CALLER: &str = "+15551230000";
pub const REPRESENTATIVE: &str = "+15550001111";
pub const PUBLIC_URL: &str = "https://calls.example.com";

/// Synthesizes a short constant tone; recognition is unavailable.
pub struct ToneSpeech;

#[async_trait]
impl SpeechService for ToneSpeech {
    fn sample_rate(&self) -> u32 {
        8000
    }

    fn voice(&self) -> &str {
        "tone"
    }

    async fn synthesize(&self, _text: &str) -> SpeechResult<Vec<i16>> {
        Ok(vec![1000; 800])
    }

    async fn recognize(&self, _samples: &[i16]) -> SpeechResult<Recognition> {
        Err(SpeechError::Status(501))
    }
}

pub fn employee() -> EmployeeRecord {
    EmployeeRecord {
        identity: Identity {
            employee_id: "e1".to_string(),
            first_name: "Dana".to_string(),
            phone: Some(CALLER.to_string()),
            provider: ProviderContext {
                id: "p1".to_string(),
                name: "Acme Staffing".to_string(),
                representative_phone: None,
            },
        },
        pin: "1234".to_string(),
        open_jobs: vec![Job {
            id: "j1".to_string(),
            title: "Forklift operator".to_string(),
            location: "Dock 4".to_string(),
            starts_at: "Monday 7 AM".to_string(),
            pay_rate: None,
        }],
    }
}

pub fn config(media_stream: bool) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: PUBLIC_URL.to_string(),
        voice_media_stream: media_stream,
        transfer_default_representative: Some(REPRESENTATIVE.to_string()),
        ..ServerConfig::default()
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub directory: Arc<InMemoryDirectory>,
    pub call_control: Arc<RecordingCallControl>,
}

pub fn app(config: ServerConfig) -> TestApp {
    let directory = Arc::new(InMemoryDirectory::new(vec![employee()]));
    let call_control = Arc::new(RecordingCallControl::default());
    let state = AppState::from_parts(
        config,
        directory.clone(),
        Arc::new(ToneSpeech),
        call_control.clone(),
    );
    TestApp {
        state,
        directory,
        call_control,
    }
}

impl TestApp {
    /// Posts a provider callback and returns the status and markup.
    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> (StatusCode, String) {
        let body = fields
            .iter()
            .map(|(key, value)| format!("{key}={}", encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let app = routes::create_app(self.state.clone());
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
