//! HTTP client for the business-data store.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  /identities?phone=...` / `GET /identities?pin=...` → `{"matches": [Identity]}`
//! - `GET  /employees/{id}/jobs?status=open` → `[Job]`
//! - `POST /employees/{id}/jobs/{job}/outcome` with `{"outcome": "accepted" | "declined"}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::base::{
    DirectoryError, DirectoryResult, Identity, IdentityLookup, Job, JobOutcome, WorkforceDirectory,
};

const MAX_ERROR_BODY_LEN: usize = 500;

#[derive(Debug, Deserialize)]
struct IdentityMatches {
    #[serde(default)]
    matches: Vec<Identity>,
}

#[derive(Debug, Serialize)]
struct OutcomeBody<'a> {
    outcome: &'a str,
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        DirectoryError::Network(err.to_string())
    }
}

#[derive(Clone)]
pub struct HttpDirectory {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpDirectory {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> DirectoryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Configuration(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> DirectoryResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let capped = &body[..body.len().min(MAX_ERROR_BODY_LEN)];
        debug!(status = %status, body = capped, "Directory request rejected");
        Err(DirectoryError::Status(status.as_u16()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> DirectoryResult<T> {
        let request = self.authorize(self.client.get(self.endpoint(path)).query(query));
        let response = Self::check(request.send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    async fn lookup(&self, key: &str, value: &str) -> DirectoryResult<IdentityLookup> {
        let found: IdentityMatches = self.get_json("/identities", &[(key, value)]).await?;
        Ok(IdentityLookup::from_matches(found.matches))
    }
}

#[async_trait]
impl WorkforceDirectory for HttpDirectory {
    async fn resolve_by_phone(&self, phone: &str) -> DirectoryResult<IdentityLookup> {
        self.lookup("phone", phone).await
    }

    async fn resolve_by_pin(&self, pin: &str) -> DirectoryResult<IdentityLookup> {
        self.lookup("pin", pin).await
    }

    async fn list_open_jobs(&self, employee_id: &str) -> DirectoryResult<Vec<Job>> {
        self.get_json(
            &format!("/employees/{employee_id}/jobs"),
            &[("status", "open")],
        )
        .await
    }

    async fn record_outcome(
        &self,
        employee_id: &str,
        job_id: &str,
        outcome: JobOutcome,
    ) -> DirectoryResult<()> {
        let url = self.endpoint(&format!("/employees/{employee_id}/jobs/{job_id}/outcome"));
        let request = self.authorize(self.client.post(url).json(&OutcomeBody {
            outcome: outcome.as_str(),
        }));
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::UnknownJob(job_id.to_string()));
        }
        Self::check(response).await?;
        Ok(())
    }
}
