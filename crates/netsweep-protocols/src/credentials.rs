//! Credential profile protocol.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::mask::MASK;

/// A resolved username/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &MASK)
            .finish()
    }
}

/// Resolves credential profiles at run time.
///
/// Implementations must return the profile's current value on every call;
/// callers rely on edits being visible to the next run.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve `profile` for `module_id`.
    async fn resolve(&self, module_id: &str, profile: &str)
        -> Result<Option<Credentials>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_password() {
        let creds = Credentials::new("admin", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains(MASK));
    }
}
