//! In-memory collaborators for tests and embedding.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use netsweep_protocols::{
    CatalogError, CredentialStore, Credentials, ExpectedVersion, ModuleCatalog,
    ModuleDescriptor, ScheduleDefinition, ScheduleStore, SiteInventory, StoreError,
    StoredSchedule,
};
use parking_lot::RwLock;

use crate::credentials::CredentialFile;
use crate::schedules::{apply_remove, apply_upsert};

fn unavailable() -> StoreError {
    StoreError::Io(std::io::Error::other("store unavailable"))
}

/// Catalog holding descriptors in memory.
///
/// A module without a declared entrypoint resolves to a path named after
/// its id.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    modules: RwLock<Vec<ModuleDescriptor>>,
    refreshes: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, module: ModuleDescriptor) -> Self {
        self.insert(module);
        self
    }

    /// Add or replace a module.
    pub fn insert(&self, module: ModuleDescriptor) {
        let mut modules = self.modules.write();
        modules.retain(|m| m.id != module.id);
        modules.push(module);
    }

    pub fn remove(&self, id: &str) {
        self.modules.write().retain(|m| m.id != id);
    }

    /// Number of `refresh` calls so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleCatalog for MemoryCatalog {
    async fn list(&self) -> Result<Vec<ModuleDescriptor>, CatalogError> {
        Ok(self.modules.read().clone())
    }

    async fn resolve_entrypoint(&self, id: &str) -> Result<PathBuf, CatalogError> {
        self.modules
            .read()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.entrypoint.clone().unwrap_or_else(|| PathBuf::from(&m.id)))
            .ok_or_else(|| CatalogError::ModuleNotFound(id.to_string()))
    }

    async fn refresh(&self) -> Result<(), CatalogError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Inventory of named sites with optional gateways.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    sites: RwLock<Vec<(String, Option<String>)>>,
    unavailable: AtomicBool,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(self, name: impl Into<String>) -> Self {
        self.sites.write().push((name.into(), None));
        self
    }

    pub fn with_gateway(self, name: impl Into<String>, gateway: impl Into<String>) -> Self {
        self.sites.write().push((name.into(), Some(gateway.into())));
        self
    }

    /// Replace the site list.
    pub fn set_sites<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.sites.write() = names.into_iter().map(|n| (n.into(), None)).collect();
    }

    /// Make every call fail with an I/O error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl SiteInventory for MemoryInventory {
    async fn all_site_names(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.sites.read().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn gateway(&self, site: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self
            .sites
            .read()
            .iter()
            .find(|(n, _)| n == site)
            .and_then(|(_, g)| g.clone()))
    }
}

/// Credential profiles held in memory, with the same scoping rules as
/// the JSON store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    file: RwLock<CredentialFile>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(
        self,
        scope: &str,
        profile: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.set_profile(scope, profile, Credentials::new(username, password));
        self
    }

    /// Add or replace a profile. `scope` is a module id or `"*"`.
    pub fn set_profile(&self, scope: &str, profile: &str, credentials: Credentials) {
        self.file.write().insert(scope, profile, credentials);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn resolve(
        &self,
        module_id: &str,
        profile: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        Ok(self.file.read().lookup(module_id, profile))
    }
}

/// Versioned schedule store held in memory.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    records: RwLock<Vec<StoredSchedule>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with an I/O error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `read_all` calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn read_all(&self) -> Result<Vec<StoredSchedule>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.records.read().clone())
    }

    async fn upsert(
        &self,
        definition: ScheduleDefinition,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        self.check()?;
        apply_upsert(&mut self.records.write(), definition, expected)
    }

    async fn remove(&self, id: &str, expected: ExpectedVersion) -> Result<(), StoreError> {
        self.check()?;
        apply_remove(&mut self.records.write(), id, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_resolves_declared_or_id() {
        let catalog = MemoryCatalog::new()
            .with_module(ModuleDescriptor::new("a").with_entrypoint("/modules/a/run.py"))
            .with_module(ModuleDescriptor::new("b"));

        assert_eq!(
            catalog.resolve_entrypoint("a").await.unwrap(),
            PathBuf::from("/modules/a/run.py")
        );
        assert_eq!(catalog.resolve_entrypoint("b").await.unwrap(), PathBuf::from("b"));
        assert!(catalog.resolve_entrypoint("c").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_catalog_insert_replaces() {
        let catalog = MemoryCatalog::new().with_module(ModuleDescriptor::new("a"));
        catalog.insert(ModuleDescriptor::new("a").with_entrypoint("x"));
        assert_eq!(catalog.list().await.unwrap().len(), 1);

        catalog.remove("a");
        assert!(catalog.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inventory_unavailable() {
        let inventory = MemoryInventory::new().with_gateway("SiteA", "10.0.0.1");
        assert_eq!(
            inventory.gateway("SiteA").await.unwrap().as_deref(),
            Some("10.0.0.1")
        );

        inventory.set_unavailable(true);
        assert!(inventory.all_site_names().await.is_err());
    }

    #[tokio::test]
    async fn test_credentials_follow_updates() {
        let store = MemoryCredentialStore::new().with_profile("*", "core", "admin", "old");
        store.set_profile("*", "core", Credentials::new("admin", "new"));

        let creds = store.resolve("cdp_discovery", "core").await.unwrap().unwrap();
        assert_eq!(creds.password, "new");
    }

    #[tokio::test]
    async fn test_schedule_store_versions() {
        let store = MemoryScheduleStore::new();
        let def = ScheduleDefinition::new("nightly", "Nightly");

        assert_eq!(store.upsert(def.clone(), ExpectedVersion::Absent).await.unwrap(), 1);
        assert!(matches!(
            store.upsert(def.clone(), ExpectedVersion::Exact(5)).await,
            Err(StoreError::Conflict { .. })
        ));
        store.remove("nightly", ExpectedVersion::Exact(1)).await.unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
        assert_eq!(store.read_count(), 1);
    }
}
