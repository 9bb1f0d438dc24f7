//! Business-data store projection: worker identities and open jobs.

pub mod base;
pub mod http;
pub mod memory;

pub use base::{
    DirectoryError, DirectoryResult, Identity, IdentityLookup, Job, JobOutcome, ProviderContext,
    WorkforceDirectory,
};
pub use http::HttpDirectory;
pub use memory::{DirectoryFixture, EmployeeRecord, InMemoryDirectory, RecordedOutcome};
