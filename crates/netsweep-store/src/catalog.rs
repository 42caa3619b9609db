//! Filesystem module catalog.
//!
//! Layout:
//! ```text
//! {modules_dir}/
//! └── {module_id}/
//!     ├── module.json
//!     └── {entrypoint}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use netsweep_protocols::{CatalogError, ModuleCatalog, ModuleDescriptor, ModuleInput};
use serde::Deserialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MANIFEST: &str = "module.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    entrypoint: Option<PathBuf>,
    #[serde(default)]
    inputs: Vec<ModuleInput>,
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: ModuleDescriptor,
    dir: PathBuf,
}

/// Catalog backed by a directory of module folders.
///
/// The directory is scanned on first use and again on every
/// [`refresh`](ModuleCatalog::refresh).
pub struct FsModuleCatalog {
    root: PathBuf,
    extensions: Vec<String>,
    cache: RwLock<Option<Vec<Entry>>>,
}

impl FsModuleCatalog {
    /// `extensions` are file extensions that count as runnable even
    /// without the executable bit (e.g. the keys of the interpreter map).
    pub fn new<I, S>(root: impl Into<PathBuf>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            extensions: extensions.into_iter().map(Into::into).collect(),
            cache: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn entries(&self) -> Result<Vec<Entry>, CatalogError> {
        if let Some(entries) = self.cache.read().await.as_ref() {
            return Ok(entries.clone());
        }
        let entries = self.scan().await?;
        *self.cache.write().await = Some(entries.clone());
        Ok(entries)
    }

    async fn scan(&self) -> Result<Vec<Entry>, CatalogError> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "Modules directory does not exist");
                return Ok(entries);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            match load_manifest(&path.join(MANIFEST)).await {
                Ok(Some(manifest)) => entries.push(Entry {
                    descriptor: ModuleDescriptor {
                        name: manifest.name.unwrap_or_else(|| id.clone()),
                        id,
                        description: manifest.description,
                        version: manifest.version,
                        inputs: manifest.inputs,
                        entrypoint: manifest.entrypoint,
                    },
                    dir: path,
                }),
                Ok(None) => debug!(dir = %path.display(), "Skipping directory without manifest"),
                Err(e) => warn!("Skipping module: {}", e),
            }
        }

        entries.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        Ok(entries)
    }

    async fn find_candidates(&self, dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
        let mut candidates = Vec::new();
        let mut items = fs::read_dir(dir).await?;
        while let Some(item) = items.next_entry().await? {
            let path = item.path();
            let name = item.file_name().to_string_lossy().into_owned();
            if name == MANIFEST || name.starts_with('.') {
                continue;
            }
            let meta = item.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if self.has_known_extension(&path) || is_executable(&meta) {
                candidates.push(path);
            }
        }
        candidates.sort();
        Ok(candidates)
    }

    fn has_known_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }
}

async fn load_manifest(path: &Path) -> Result<Option<Manifest>, CatalogError> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| CatalogError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

#[async_trait]
impl ModuleCatalog for FsModuleCatalog {
    async fn list(&self) -> Result<Vec<ModuleDescriptor>, CatalogError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|e| e.descriptor)
            .collect())
    }

    async fn resolve_entrypoint(&self, id: &str) -> Result<PathBuf, CatalogError> {
        let entry = self
            .entries()
            .await?
            .into_iter()
            .find(|e| e.descriptor.id == id)
            .ok_or_else(|| CatalogError::ModuleNotFound(id.to_string()))?;

        if let Some(declared) = &entry.descriptor.entrypoint {
            let path = entry.dir.join(declared);
            if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                return Ok(path);
            }
            warn!(module_id = %id, entrypoint = %path.display(), "Declared entrypoint is missing");
            return Err(CatalogError::ModuleNotFound(id.to_string()));
        }

        let mut candidates = self.find_candidates(&entry.dir).await?;
        match candidates.len() {
            0 => Err(CatalogError::ModuleNotFound(id.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(CatalogError::AmbiguousEntrypoint {
                module: id.to_string(),
                candidates: candidates
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            }),
        }
    }

    async fn refresh(&self) -> Result<(), CatalogError> {
        let entries = self.scan().await?;
        info!(count = entries.len(), "Module catalog refreshed");
        *self.cache.write().await = Some(entries);
        Ok(())
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
