//! Site inventory protocol.

use async_trait::async_trait;

use crate::error::StoreError;

/// Read access to the device/site inventory.
#[async_trait]
pub trait SiteInventory: Send + Sync {
    /// Names of every known site.
    async fn all_site_names(&self) -> Result<Vec<String>, StoreError>;

    /// Gateway (root) address of a site, if the inventory records one.
    async fn gateway(&self, site: &str) -> Result<Option<String>, StoreError>;
}
