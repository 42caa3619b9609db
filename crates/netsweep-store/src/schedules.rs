//! Versioned schedule store in a single JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use netsweep_protocols::{
    ExpectedVersion, ScheduleDefinition, ScheduleStore, StoreError, StoredSchedule,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::lock::FileLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    schedules: Vec<StoredSchedule>,
}

/// Insert or replace `definition` in `records` if `expected` holds.
pub(crate) fn apply_upsert(
    records: &mut Vec<StoredSchedule>,
    definition: ScheduleDefinition,
    expected: ExpectedVersion,
) -> Result<u64, StoreError> {
    if definition.id.trim().is_empty() {
        return Err(StoreError::Invalid("schedule id cannot be blank".to_string()));
    }

    let position = records.iter().position(|s| s.definition.id == definition.id);
    let current = position.map(|i| records[i].version);
    if !expected.matches(current) {
        return Err(StoreError::Conflict {
            id: definition.id,
            expected,
            actual: current,
        });
    }

    let version = current.map_or(1, |v| v + 1);
    let stored = StoredSchedule {
        version,
        definition,
    };
    match position {
        Some(i) => records[i] = stored,
        None => records.push(stored),
    }
    Ok(version)
}

/// Remove schedule `id` from `records` if `expected` holds.
pub(crate) fn apply_remove(
    records: &mut Vec<StoredSchedule>,
    id: &str,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let position = records
        .iter()
        .position(|s| s.definition.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    let current = records[position].version;
    if !expected.matches(Some(current)) {
        return Err(StoreError::Conflict {
            id: id.to_string(),
            expected,
            actual: Some(current),
        });
    }
    records.remove(position);
    Ok(())
}

/// Schedules persisted as `{"schedules": [...]}`.
///
/// Every access holds an advisory lock on `<file>.lock`, so separate
/// processes sharing the file do not interleave read-modify-write cycles.
/// Writes go to a temporary file and are renamed into place.
pub struct JsonScheduleStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl JsonScheduleStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ScheduleFile, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(ScheduleFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScheduleFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, file: &ScheduleFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        fs::write(&tmp, serde_json::to_vec_pretty(file)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<StoredSchedule>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout).await?;
        let mut file = self.read_file().await?;
        let value = f(&mut file.schedules)?;
        self.write_file(&file).await?;
        Ok(value)
    }
}

#[async_trait]
impl ScheduleStore for JsonScheduleStore {
    async fn read_all(&self) -> Result<Vec<StoredSchedule>, StoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout).await?;
        Ok(self.read_file().await?.schedules)
    }

    async fn upsert(
        &self,
        definition: ScheduleDefinition,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let id = definition.id.clone();
        let version = self
            .modify(|records| apply_upsert(records, definition, expected))
            .await?;
        debug!(schedule_id = %id, version, "Schedule saved");
        Ok(version)
    }

    async fn remove(&self, id: &str, expected: ExpectedVersion) -> Result<(), StoreError> {
        self.modify(|records| apply_remove(records, id, expected))
            .await?;
        debug!(schedule_id = %id, "Schedule removed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;
