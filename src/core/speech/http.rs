//! HTTP speech backend.
//!
//! - `POST {base}/synthesize` with `{"text", "voice", "sample_rate", "encoding": "linear16"}`
//!   answers raw little-endian PCM16.
//! - `POST {base}/recognize?sample_rate=..&encoding=linear16` with a raw PCM16
//!   body answers `{"transcript", "confidence"}`.
//!
//! Each request is bounded by the configured timeout and retried up to
//! `max_retries` times on transient failures.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::base::{Recognition, SpeechError, SpeechResult, SpeechService};
use crate::core::audio::codec::{pcm16_le_to_samples, samples_to_pcm16_le};

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct HttpSpeechConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub voice: String,
    pub sample_rate: u32,
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
    encoding: &'static str,
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SpeechError::Timeout
        } else {
            SpeechError::Network(err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct HttpSpeechService {
    config: HttpSpeechConfig,
    client: Client,
}

impl HttpSpeechService {
    pub fn new(mut config: HttpSpeechConfig) -> SpeechResult<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Configuration(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> SpeechResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SpeechResult<T>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && tries < self.config.max_retries => {
                    tries += 1;
                    warn!(operation, error = %err, attempt = tries, "Retrying speech request");
                    tokio::time::sleep(RETRY_BACKOFF * tries).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn synthesize_once(&self, text: &str) -> SpeechResult<Vec<i16>> {
        let request = self.authorize(
            self.client
                .post(format!("{}/synthesize", self.config.base_url))
                .json(&SynthesizeRequest {
                    text,
                    voice: &self.config.voice,
                    sample_rate: self.config.sample_rate,
                    encoding: "linear16",
                }),
        );
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        if body.len() < 2 {
            return Err(SpeechError::InvalidAudio(
                "synthesis returned no audio".to_string(),
            ));
        }
        Ok(pcm16_le_to_samples(&body))
    }

    async fn recognize_once(&self, body: Vec<u8>) -> SpeechResult<Recognition> {
        let request = self.authorize(
            self.client
                .post(format!("{}/recognize", self.config.base_url))
                .query(&[
                    ("sample_rate", self.config.sample_rate.to_string()),
                    ("encoding", "linear16".to_string()),
                ])
                .header("content-type", "application/octet-stream")
                .body(body),
        );
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Status(status.as_u16()));
        }
        response
            .json::<Recognition>()
            .await
            .map_err(|e| SpeechError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SpeechService for HttpSpeechService {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn voice(&self) -> &str {
        &self.config.voice
    }

    async fn synthesize(&self, text: &str) -> SpeechResult<Vec<i16>> {
        let samples = self
            .with_retries("synthesize", || self.synthesize_once(text))
            .await?;
        debug!(chars = text.len(), samples = samples.len(), "Synthesized prompt");
        Ok(samples)
    }

    async fn recognize(&self, samples: &[i16]) -> SpeechResult<Recognition> {
        if samples.is_empty() {
            return Err(SpeechError::InvalidAudio("empty utterance".to_string()));
        }
        let body = samples_to_pcm16_le(samples);
        self.with_retries("recognize", || self.recognize_once(body.clone()))
            .await
    }
}
