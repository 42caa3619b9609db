//! Module catalog protocol.
//!
//! A module is a directory-packaged unit of work with declared inputs.
//! The engine only needs its id, its inputs, and a way to find the file
//! to execute.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A declared module input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInput {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ModuleInput {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            input_type: None,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }
}

/// Catalog entry for a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub inputs: Vec<ModuleInput>,

    /// Entrypoint relative to the module directory, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<PathBuf>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            version: None,
            inputs: Vec::new(),
            entrypoint: None,
        }
    }

    pub fn with_input(mut self, input: ModuleInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<PathBuf>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Inputs the caller must supply.
    pub fn required_inputs(&self) -> impl Iterator<Item = &ModuleInput> {
        self.inputs.iter().filter(|i| i.required)
    }
}

/// Catalog of runnable modules.
#[async_trait]
pub trait ModuleCatalog: Send + Sync {
    /// List every known module.
    async fn list(&self) -> Result<Vec<ModuleDescriptor>, CatalogError>;

    /// Look up one module.
    async fn get(&self, id: &str) -> Result<Option<ModuleDescriptor>, CatalogError> {
        Ok(self.list().await?.into_iter().find(|m| m.id == id))
    }

    /// Resolve the file to execute for a module.
    async fn resolve_entrypoint(&self, id: &str) -> Result<PathBuf, CatalogError>;

    /// Re-read the catalog from its backing source.
    async fn refresh(&self) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_inputs_filter() {
        let module = ModuleDescriptor::new("cdp_discovery")
            .with_input(ModuleInput::required("root_ip"))
            .with_input(ModuleInput::optional("max_depth"))
            .with_input(ModuleInput::required("username"));

        let names: Vec<_> = module.required_inputs().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["root_ip", "username"]);
    }

    #[test]
    fn test_input_type_field_name() {
        let input: ModuleInput = serde_json::from_value(serde_json::json!({
            "name": "password",
            "type": "password",
            "required": true
        }))
        .unwrap();
        assert_eq!(input.input_type.as_deref(), Some("password"));
        assert!(input.required);
    }

    #[test]
    fn test_descriptor_defaults() {
        let module: ModuleDescriptor =
            serde_json::from_value(serde_json::json!({ "id": "view_map" })).unwrap();
        assert!(module.inputs.is_empty());
        assert!(module.entrypoint.is_none());
    }
}
