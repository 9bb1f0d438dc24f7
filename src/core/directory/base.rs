use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Staffing provider a worker is placed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderContext {
    pub id: String,
    pub name: String,
    /// Number of the provider's live coordinator, if it has one.
    #[serde(default)]
    pub representative_phone: Option<String>,
}

/// A worker known to the business-data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub employee_id: String,
    pub first_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub provider: ProviderContext,
}

/// An open shift that can be offered to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub location: String,
    pub starts_at: String,
    #[serde(default)]
    pub pay_rate: Option<String>,
}

/// Result of resolving a caller's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityLookup {
    Found(Identity),
    /// More than one worker matched; the caller has to prove who they are.
    Ambiguous(usize),
    NotFound,
}

impl IdentityLookup {
    pub fn from_matches(mut matches: Vec<Identity>) -> Self {
        match matches.len() {
            0 => IdentityLookup::NotFound,
            1 => IdentityLookup::Found(matches.remove(0)),
            n => IdentityLookup::Ambiguous(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Accepted,
    Declined,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Accepted => "accepted",
            JobOutcome::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Network(String),

    #[error("Directory returned HTTP {0}")]
    Status(u16),

    #[error("Invalid directory response: {0}")]
    Decode(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Directory configuration error: {0}")]
    Configuration(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Read/write projection of the business-data store used by the call flow.
///
/// Only invoked as conversation effects; the media path never calls it directly.
#[async_trait]
pub trait WorkforceDirectory: Send + Sync {
    async fn resolve_by_phone(&self, phone: &str) -> DirectoryResult<IdentityLookup>;

    /// PIN comparison is an exact numeric match.
    async fn resolve_by_pin(&self, pin: &str) -> DirectoryResult<IdentityLookup>;

    async fn list_open_jobs(&self, employee_id: &str) -> DirectoryResult<Vec<Job>>;

    async fn record_outcome(
        &self,
        employee_id: &str,
        job_id: &str,
        outcome: JobOutcome,
    ) -> DirectoryResult<()>;
}
