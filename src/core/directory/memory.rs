//! In-memory directory backed by a JSON fixture.
//!
//! Used for local runs (`DIRECTORY_FIXTURE_PATH`) and throughout the tests.
//!
//! ```json
//! {
//!   "employees": [
//!     {
//!       "employee_id": "e-100",
//!       "first_name": "Dana",
//!       "phone": "+15551230000",
//!       "pin": "4821",
//!       "provider": { "id": "p-1", "name": "Northside Staffing", "representative_phone": "+15559870000" },
//!       "open_jobs": [
//!         { "id": "j-1", "title": "Forklift operator", "location": "Dock 4", "starts_at": "Monday 7 AM" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::base::{
    DirectoryError, DirectoryResult, Identity, IdentityLookup, Job, JobOutcome, WorkforceDirectory,
};
use crate::utils::phone_validation::phones_match;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecord {
    #[serde(flatten)]
    pub identity: Identity,
    pub pin: String,
    #[serde(default)]
    pub open_jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub employees: Vec<EmployeeRecord>,
}

/// A recorded job decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutcome {
    pub employee_id: String,
    pub job_id: String,
    pub outcome: JobOutcome,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    employees: RwLock<Vec<EmployeeRecord>>,
    outcomes: RwLock<Vec<RecordedOutcome>>,
}

impl InMemoryDirectory {
    pub fn new(employees: Vec<EmployeeRecord>) -> Self {
        Self {
            employees: RwLock::new(employees),
            outcomes: RwLock::new(Vec::new()),
        }
    }

    pub async fn from_file(path: &Path) -> DirectoryResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            DirectoryError::Configuration(format!(
                "Failed to read directory fixture {}: {e}",
                path.display()
            ))
        })?;
        let fixture: DirectoryFixture = serde_json::from_str(&contents)
            .map_err(|e| DirectoryError::Decode(format!("{}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            employees = fixture.employees.len(),
            "Loaded directory fixture"
        );
        Ok(Self::new(fixture.employees))
    }

    /// Decisions recorded so far, oldest first.
    pub fn outcomes(&self) -> Vec<RecordedOutcome> {
        self.outcomes.read().clone()
    }
}

#[async_trait]
impl WorkforceDirectory for InMemoryDirectory {
    async fn resolve_by_phone(&self, phone: &str) -> DirectoryResult<IdentityLookup> {
        let matches = self
            .employees
            .read()
            .iter()
            .filter(|record| {
                record
                    .identity
                    .phone
                    .as_deref()
                    .is_some_and(|known| phones_match(known, phone))
            })
            .map(|record| record.identity.clone())
            .collect();
        Ok(IdentityLookup::from_matches(matches))
    }

    async fn resolve_by_pin(&self, pin: &str) -> DirectoryResult<IdentityLookup> {
        let matches = self
            .employees
            .read()
            .iter()
            .filter(|record| record.pin == pin)
            .map(|record| record.identity.clone())
            .collect();
        Ok(IdentityLookup::from_matches(matches))
    }

    async fn list_open_jobs(&self, employee_id: &str) -> DirectoryResult<Vec<Job>> {
        Ok(self
            .employees
            .read()
            .iter()
            .find(|record| record.identity.employee_id == employee_id)
            .map(|record| record.open_jobs.clone())
            .unwrap_or_default())
    }

    async fn record_outcome(
        &self,
        employee_id: &str,
        job_id: &str,
        outcome: JobOutcome,
    ) -> DirectoryResult<()> {
        {
            let mut employees = self.employees.write();
            let record = employees
                .iter_mut()
                .find(|record| record.identity.employee_id == employee_id)
                .ok_or_else(|| DirectoryError::UnknownJob(job_id.to_string()))?;
            let before = record.open_jobs.len();
            record.open_jobs.retain(|job| job.id != job_id);
            if record.open_jobs.len() == before {
                return Err(DirectoryError::UnknownJob(job_id.to_string()));
            }
        }
        self.outcomes.write().push(RecordedOutcome {
            employee_id: employee_id.to_string(),
            job_id: job_id.to_string(),
            outcome,
        });
        Ok(())
    }
}
