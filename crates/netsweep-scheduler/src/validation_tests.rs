use super::*;
use netsweep_protocols::{ModuleDescriptor, ModuleInput};
use netsweep_store::{MemoryCatalog, MemoryCredentialStore, MemoryInventory};

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_module(
            ModuleDescriptor::new("cdp_discovery")
                .with_input(ModuleInput::required("root_ip"))
                .with_input(ModuleInput::required("username"))
                .with_input(ModuleInput::required("password"))
                .with_input(ModuleInput::optional("max_depth")),
        )
        .with_module(ModuleDescriptor::new("ping_monitor").with_input(ModuleInput::required("site_name")))
        .with_module(ModuleDescriptor::new(RouterReferenceRule::MODULE_ID))
}

fn validator(inventory: MemoryInventory) -> Validator {
    let credentials = MemoryCredentialStore::new().with_profile("*", "core", "admin", "pw");
    Validator::new(Arc::new(catalog()), Arc::new(credentials), Arc::new(inventory))
}

fn sites(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn schedule(steps: Vec<ScheduleStep>) -> ScheduleDefinition {
    steps
        .into_iter()
        .fold(ScheduleDefinition::new("s", "S"), |d, s| d.with_step(s))
}

#[tokio::test]
async fn test_valid_schedule_has_no_errors() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![
        ScheduleStep::new("cdp_discovery")
            .with_param("root_ip", "10.0.0.1")
            .with_credential_profile("core"),
        ScheduleStep::new("ping_monitor"),
    ]);

    assert!(v.validate(&def, &sites(&["SiteA"])).await.is_empty());
}

#[tokio::test]
async fn test_unknown_module() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![ScheduleStep::new("nope")]);

    let errors = v.validate(&def, &sites(&["SiteA"])).await;
    assert_eq!(errors, vec!["step 1: module 'nope' not found".to_string()]);
}

#[tokio::test]
async fn test_blank_required_inputs_reported_per_input() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![
        ScheduleStep::new("ping_monitor"),
        ScheduleStep::new("cdp_discovery")
            .with_param("root_ip", "   ")
            .with_param("username", "admin"),
    ]);

    let errors = v.validate(&def, &sites(&["SiteA"])).await;
    assert_eq!(
        errors,
        vec![
            "step 2 (cdp_discovery): missing required input 'root_ip'".to_string(),
            "step 2 (cdp_discovery): missing required input 'password'".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_missing_profile_reported() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![
        ScheduleStep::new("cdp_discovery")
            .with_param("root_ip", "10.0.0.1")
            .with_credential_profile("ghost"),
    ]);

    let errors = v.validate(&def, &sites(&["SiteA"])).await;
    assert_eq!(
        errors,
        vec!["step 1 (cdp_discovery): credential profile 'ghost' not found".to_string()]
    );
}

#[tokio::test]
async fn test_empty_schedule_is_invalid() {
    let v = validator(MemoryInventory::new());
    let errors = v.validate(&schedule(vec![]), &sites(&["SiteA"])).await;
    assert_eq!(errors, vec!["schedule has no steps".to_string()]);
}

#[tokio::test]
async fn test_router_rule_accepts_explicit_reference() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![
        ScheduleStep::new(RouterReferenceRule::MODULE_ID).with_param("router_device_id", "dev-7"),
    ]);

    assert!(v.validate(&def, &sites(&["SiteA"])).await.is_empty());
}

#[tokio::test]
async fn test_router_rule_infers_from_gateways() {
    let inventory = MemoryInventory::new()
        .with_gateway("SiteA", "10.0.0.1")
        .with_site("SiteB");
    let v = validator(inventory);
    let def = schedule(vec![ScheduleStep::new(RouterReferenceRule::MODULE_ID)]);

    assert!(v.validate(&def, &sites(&["SiteA"])).await.is_empty());

    let errors = v.validate(&def, &sites(&["SiteA", "SiteB"])).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("site 'SiteB' has no gateway"));
}

#[tokio::test]
async fn test_router_rule_without_sites() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![ScheduleStep::new(RouterReferenceRule::MODULE_ID)]);

    let errors = v.validate(&def, &[]).await;
    assert!(errors[0].contains("router_ip or router_device_id is required"));
}

struct DenyAll;

#[async_trait]
impl ValidationRule for DenyAll {
    fn module_id(&self) -> &str {
        "ping_monitor"
    }

    async fn check(&self, ctx: &RuleContext<'_>) -> Vec<String> {
        vec![format!("step {}: maintenance window", ctx.step_number)]
    }
}

#[tokio::test]
async fn test_custom_rule_only_applies_to_its_module() {
    let v = validator(MemoryInventory::new()).with_rule(Arc::new(DenyAll));
    let def = schedule(vec![
        ScheduleStep::new("cdp_discovery")
            .with_param("root_ip", "10.0.0.1")
            .with_credential_profile("core"),
        ScheduleStep::new("ping_monitor"),
    ]);

    let errors = v.validate(&def, &sites(&["SiteA"])).await;
    assert_eq!(errors, vec!["step 2: maintenance window".to_string()]);
}

#[tokio::test]
async fn test_padded_module_id_rejected() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![ScheduleStep::new(" ping_monitor ")]);

    let errors = v.validate(&def, &sites(&["SiteA"])).await;
    assert_eq!(
        errors,
        vec!["step 1: module id ' ping_monitor ' has surrounding whitespace".to_string()]
    );
}

#[tokio::test]
async fn test_preflight_needs_no_sites() {
    let v = validator(MemoryInventory::new());
    let def = schedule(vec![
        ScheduleStep::new("cdp_discovery").with_credential_profile("core"),
        ScheduleStep::new(RouterReferenceRule::MODULE_ID),
    ]);

    let preflight = v.preflight(&def).await;
    assert_eq!(
        preflight.errors(),
        vec!["step 1 (cdp_discovery): missing required input 'root_ip'".to_string()]
    );

    let errors = v.complete(&def, preflight, &[]).await;
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "step 1 (cdp_discovery): missing required input 'root_ip'");
    assert!(errors[1].starts_with("step 2 (mikrotik_mac_discovery)"));
}
