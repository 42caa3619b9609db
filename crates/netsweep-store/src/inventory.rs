//! Site inventory backed by the `database.json` device store.

use std::path::PathBuf;

use async_trait::async_trait;
use netsweep_protocols::{SiteInventory, StoreError};
use serde::Deserialize;
use tokio::fs;

#[derive(Debug, Default, Deserialize)]
struct Database {
    #[serde(default)]
    sites: Vec<SiteRecord>,
}

#[derive(Debug, Deserialize)]
struct SiteRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    root_ip: Option<String>,
}

/// Read-only view of the sites in the inventory file.
///
/// The file is owned by other tools and re-read on every call.
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Database, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Database::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Database::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SiteInventory for JsonInventory {
    async fn all_site_names(&self) -> Result<Vec<String>, StoreError> {
        let db = self.load().await?;
        let mut names: Vec<String> = Vec::new();
        for site in db.sites {
            let name = site.name.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn gateway(&self, site: &str) -> Result<Option<String>, StoreError> {
        let db = self.load().await?;
        Ok(db
            .sites
            .into_iter()
            .find(|s| s.name.trim() == site)
            .and_then(|s| s.root_ip)
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty()))
    }
}
