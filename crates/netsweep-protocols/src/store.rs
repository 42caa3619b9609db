//! Schedule persistence protocol.
//!
//! Schedules are stored per id with a monotonically increasing version.
//! Writers pass the version they read; a mismatch is rejected instead of
//! silently overwriting a concurrent edit.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::schedule::ScheduleDefinition;

/// A schedule definition together with its stored version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSchedule {
    pub version: u64,

    #[serde(flatten)]
    pub definition: ScheduleDefinition,
}

/// Version precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedVersion {
    /// Write unconditionally.
    #[default]
    Any,
    /// The record must not exist yet.
    Absent,
    /// The record must exist at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Check the precondition against the currently stored version.
    pub fn matches(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Absent, Some(_)) => false,
            (ExpectedVersion::Exact(v), Some(c)) => *v == c,
            (ExpectedVersion::Exact(_), None) => false,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "any version"),
            ExpectedVersion::Absent => write!(f, "no record"),
            ExpectedVersion::Exact(v) => write!(f, "version {}", v),
        }
    }
}

/// Keyed, versioned schedule store.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Read every stored schedule.
    async fn read_all(&self) -> Result<Vec<StoredSchedule>, StoreError>;

    /// Read one schedule by id.
    async fn get(&self, id: &str) -> Result<Option<StoredSchedule>, StoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|s| s.definition.id == id))
    }

    /// Create or replace a schedule, returning its new version.
    async fn upsert(
        &self,
        definition: ScheduleDefinition,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    /// Remove a schedule.
    async fn remove(&self, id: &str, expected: ExpectedVersion) -> Result<(), StoreError>;
}
