//! Effective step parameters.

use netsweep_protocols::{CredentialStore, ScheduleStep};
use serde_json::{Map, Value};

use crate::error::SchedulerError;

/// Parameter key that older schedules use to name a credential profile.
pub const PROFILE_KEY: &str = "credential_profile";

/// Parameters a step's module actually receives.
///
/// The credential profile (from the step field, or the legacy
/// `credential_profile` parameter) is resolved now, so the module sees
/// the profile's current `username`/`password`. The profile name itself is
/// never passed on.
pub async fn effective_parameters(
    step: &ScheduleStep,
    credentials: &dyn CredentialStore,
) -> Result<Map<String, Value>, SchedulerError> {
    let mut params = step.parameters.clone();
    let legacy = params.remove(PROFILE_KEY);

    let profile = step
        .credential_profile
        .clone()
        .or_else(|| legacy.as_ref().and_then(Value::as_str).map(str::to_string))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    if let Some(profile) = profile {
        let creds = credentials
            .resolve(&step.module_id, &profile)
            .await?
            .ok_or_else(|| SchedulerError::ProfileNotFound {
                module_id: step.module_id.clone(),
                profile: profile.clone(),
            })?;
        params.insert("username".to_string(), Value::String(creds.username));
        params.insert("password".to_string(), Value::String(creds.password));
    }

    Ok(params)
}

/// Whether a parameter value counts as missing.
pub(crate) fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsweep_store::MemoryCredentialStore;

    #[tokio::test]
    async fn test_profile_substituted_and_stripped() {
        let store = MemoryCredentialStore::new().with_profile("*", "core", "admin", "s3cret");
        let step = ScheduleStep::new("cdp_discovery")
            .with_param("root_ip", "10.0.0.1")
            .with_param("username", "stale")
            .with_credential_profile("core");

        let params = effective_parameters(&step, &store).await.unwrap();
        assert_eq!(params["username"], "admin");
        assert_eq!(params["password"], "s3cret");
        assert_eq!(params["root_ip"], "10.0.0.1");
        assert!(!params.contains_key(PROFILE_KEY));
        assert!(!params.values().any(|v| v == "core"));
    }

    #[tokio::test]
    async fn test_legacy_parameter_profile() {
        let store = MemoryCredentialStore::new().with_profile("cdp_discovery", "edge", "ops", "pw");
        let step = ScheduleStep::new("cdp_discovery").with_param(PROFILE_KEY, "edge");

        let params = effective_parameters(&step, &store).await.unwrap();
        assert_eq!(params["username"], "ops");
        assert!(!params.contains_key(PROFILE_KEY));
    }

    #[tokio::test]
    async fn test_missing_profile_is_error() {
        let store = MemoryCredentialStore::new();
        let step = ScheduleStep::new("cdp_discovery").with_credential_profile("ghost");

        let err = effective_parameters(&step, &store).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ProfileNotFound { ref profile, .. } if profile == "ghost"));
    }

    #[tokio::test]
    async fn test_blank_profile_is_ignored() {
        let store = MemoryCredentialStore::new();
        let step = ScheduleStep::new("ping_monitor")
            .with_param(PROFILE_KEY, "  ")
            .with_param("username", "manual");

        let params = effective_parameters(&step, &store).await.unwrap();
        assert_eq!(params["username"], "manual");
        assert!(!params.contains_key(PROFILE_KEY));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&Value::Null)));
        assert!(is_blank(Some(&Value::String("  ".into()))));
        assert!(!is_blank(Some(&Value::String("x".into()))));
        assert!(!is_blank(Some(&serde_json::json!(0))));
        assert!(!is_blank(Some(&serde_json::json!(false))));
    }
}
