//! Credential profiles backed by `credentials.json`.
//!
//! ```json
//! { "profiles": { "cdp_discovery": { "core": { "username": "...", "password": "..." } },
//!                 "*":             { "default": { "username": "...", "password": "..." } } } }
//! ```
//! A profile scoped to the module wins over one under `"*"`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use netsweep_protocols::{CredentialStore, Credentials, StoreError};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Scope key for profiles shared by every module.
pub const ANY_MODULE: &str = "*";

/// Parsed credential file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default)]
    pub profiles: HashMap<String, HashMap<String, Credentials>>,
}

impl CredentialFile {
    pub fn insert(&mut self, scope: &str, profile: &str, credentials: Credentials) {
        self.profiles
            .entry(scope.to_string())
            .or_default()
            .insert(profile.to_string(), credentials);
    }

    /// Resolve `profile` for `module_id`, module scope first.
    pub fn lookup(&self, module_id: &str, profile: &str) -> Option<Credentials> {
        [module_id, ANY_MODULE]
            .iter()
            .find_map(|scope| self.profiles.get(*scope)?.get(profile))
            .cloned()
    }
}

/// Credential store that re-reads its file on every lookup, so edits
/// apply to the next run.
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<CredentialFile, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn resolve(
        &self,
        module_id: &str,
        profile: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        Ok(self.load().await?.lookup(module_id, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_module_scope_wins_over_wildcard() {
        let dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::new(write(
            &dir,
            serde_json::json!({
                "profiles": {
                    "cdp_discovery": { "core": { "username": "cdp", "password": "a" } },
                    "*": {
                        "core": { "username": "shared", "password": "b" },
                        "edge": { "username": "edge", "password": "c" }
                    }
                }
            }),
        ));

        let core = store.resolve("cdp_discovery", "core").await.unwrap().unwrap();
        assert_eq!(core.username, "cdp");

        let other = store.resolve("ping_monitor", "core").await.unwrap().unwrap();
        assert_eq!(other.username, "shared");

        let edge = store.resolve("cdp_discovery", "edge").await.unwrap().unwrap();
        assert_eq!(edge.username, "edge");
    }

    #[tokio::test]
    async fn test_unknown_profile_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.resolve("cdp_discovery", "core").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edits_visible_on_next_resolve() {
        let dir = TempDir::new().unwrap();
        let profile = |password: &str| {
            serde_json::json!({
                "profiles": { "*": { "core": { "username": "admin", "password": password } } }
            })
        };
        let path = write(&dir, profile("old"));
        let store = JsonCredentialStore::new(&path);
        assert_eq!(store.resolve("m", "core").await.unwrap().unwrap().password, "old");

        std::fs::write(&path, profile("new").to_string()).unwrap();
        assert_eq!(store.resolve("m", "core").await.unwrap().unwrap().password, "new");
    }
}
