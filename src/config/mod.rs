//! Configuration module for rtapp-builder
//!
//! This module handles the inputs of a build:
//! - Builder settings (default data source, nesting limits, diagnostics)
//! - Application files bundling settings, struct types, functions, data sources
//!   and states in one JSON or TOML document
//!
//! # Application file layout
//!
//! ```toml
//! [Settings]
//! DefaultDataSource = "DDB1"
//!
//! [Types.Point]
//! x = { Type = "float32" }
//! y = { Type = "float32" }
//!
//! [Functions.GAM1.InputSignals.Position]
//! Type = "Point"
//!
//! [Data.DDB1]
//! Class = "GAMDataSource"
//!
//! [States.Running.Threads.Thread1]
//! Functions = ["GAM1"]
//! ```
//!
//! Files ending in `.json` are read as JSON, anything else as TOML.

use crate::error::{BuildError, Result};
use crate::registry::TypeRegistry;
use crate::store::{convert, ConfigurationStore};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum nesting of namespaces and struct members
pub const DEFAULT_MAX_STRUCT_DEPTH: usize = 32;

/// Section names of an application file
pub const SETTINGS_SECTION: &str = "Settings";
pub const TYPES_SECTION: &str = "Types";
pub const FUNCTIONS_SECTION: &str = "Functions";
pub const DATA_SECTION: &str = "Data";
pub const STATES_SECTION: &str = "States";

/// Settings of a single build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuilderSettings {
    /// Data source used by signals whose function declares none
    #[serde(default)]
    pub default_data_source: Option<String>,

    /// Maximum namespace/struct nesting followed while flattening
    #[serde(default = "default_max_struct_depth")]
    pub max_struct_depth: usize,

    /// Log functions that take part in no state
    #[serde(default = "default_true")]
    pub warn_unscheduled_functions: bool,
}

fn default_max_struct_depth() -> usize {
    DEFAULT_MAX_STRUCT_DEPTH
}

fn default_true() -> bool {
    true
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            default_data_source: None,
            max_struct_depth: DEFAULT_MAX_STRUCT_DEPTH,
            warn_unscheduled_functions: true,
        }
    }
}

impl BuilderSettings {
    pub fn with_default_data_source(mut self, name: impl Into<String>) -> Self {
        self.default_data_source = Some(name.into());
        self
    }
}

/// An application file: settings plus the input stores of a build
#[derive(Debug, Clone, Default)]
pub struct ApplicationFile {
    pub settings: BuilderSettings,
    pub types: ConfigurationStore,
    pub functions: ConfigurationStore,
    pub data: ConfigurationStore,
    pub states: ConfigurationStore,
}

impl ApplicationFile {
    /// Load an application file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::Config(format!("Failed to read application file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        file.map_err(|e| e.with_context(format!("Loading {:?}", path)))
    }

    /// Parse a JSON application document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| BuildError::Serialization(format!("Invalid JSON: {}", e)))?;
        let sections = document
            .as_object()
            .ok_or_else(|| BuildError::Config("application document is not an object".into()))?;

        let settings = match sections.get(SETTINGS_SECTION) {
            Some(section) => serde_json::from_value(section.clone()).map_err(|e| {
                BuildError::Config(format!("Invalid {} section: {}", SETTINGS_SECTION, e))
            })?,
            None => BuilderSettings::default(),
        };
        let store = |name: &str| -> Result<ConfigurationStore> {
            match sections.get(name) {
                Some(section) => convert::from_json(section)
                    .map_err(|e| BuildError::from(e).with_context(format!("{} section", name))),
                None => Ok(ConfigurationStore::new()),
            }
        };

        Ok(Self {
            settings,
            types: store(TYPES_SECTION)?,
            functions: store(FUNCTIONS_SECTION)?,
            data: store(DATA_SECTION)?,
            states: store(STATES_SECTION)?,
        })
    }

    /// Parse a TOML application document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(content)
            .map_err(|e| BuildError::Serialization(format!("Invalid TOML: {}", e)))?;

        let settings = match document.get(SETTINGS_SECTION) {
            Some(section) => section.clone().try_into().map_err(|e| {
                BuildError::Config(format!("Invalid {} section: {}", SETTINGS_SECTION, e))
            })?,
            None => BuilderSettings::default(),
        };
        let store = |name: &str| -> Result<ConfigurationStore> {
            match document.get(name) {
                Some(section) => convert::from_toml(section)
                    .map_err(|e| BuildError::from(e).with_context(format!("{} section", name))),
                None => Ok(ConfigurationStore::new()),
            }
        };

        Ok(Self {
            settings,
            types: store(TYPES_SECTION)?,
            functions: store(FUNCTIONS_SECTION)?,
            data: store(DATA_SECTION)?,
            states: store(STATES_SECTION)?,
        })
    }

    /// Struct types declared in the `Types` section
    pub fn type_registry(&self) -> Result<TypeRegistry> {
        TypeRegistry::from_store(&self.types, self.types.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    const TOML_APP: &str = r#"
[Settings]
DefaultDataSource = "DDB1"

[Types.Point]
x = { Type = "float32" }
y = { Type = "float32" }

[Functions.GAM1.InputSignals.Position]
Type = "Point"

[Data.DDB1]
Class = "GAMDataSource"

[States.Running.Threads.Thread1]
Functions = ["GAM1"]
"#;

    #[test]
    fn test_default_settings() {
        let settings = BuilderSettings::default();
        assert_eq!(settings.max_struct_depth, DEFAULT_MAX_STRUCT_DEPTH);
        assert!(settings.warn_unscheduled_functions);
        assert!(settings.default_data_source.is_none());
    }

    #[test]
    fn test_settings_partial_deserialize() {
        let settings: BuilderSettings =
            serde_json::from_str(r#"{"DefaultDataSource": "DDB2"}"#).unwrap();
        assert_eq!(settings.default_data_source.as_deref(), Some("DDB2"));
        assert_eq!(settings.max_struct_depth, DEFAULT_MAX_STRUCT_DEPTH);
    }

    #[test]
    fn test_from_toml_str() {
        let app = ApplicationFile::from_toml_str(TOML_APP).unwrap();
        assert_eq!(app.settings.default_data_source.as_deref(), Some("DDB1"));
        assert_eq!(
            app.functions.get("GAM1.InputSignals.Position.Type"),
            Some(&Value::from("Point"))
        );
        assert_eq!(app.data.get("DDB1.Class"), Some(&Value::from("GAMDataSource")));
        let registry = app.type_registry().unwrap();
        assert_eq!(registry.find_by_name("Point").unwrap().members.len(), 2);
    }

    #[test]
    fn test_from_json_str() {
        let app = ApplicationFile::from_json_str(
            r#"{
                "Functions": { "GAM1": { "OutputSignals": { "Out": { "Type": "uint32" } } } },
                "Data": { "DDB1": { "Class": "GAMDataSource" } }
            }"#,
        )
        .unwrap();
        assert_eq!(app.settings, BuilderSettings::default());
        assert!(app.states.is_empty());
        assert_eq!(
            app.functions.get("GAM1.OutputSignals.Out.Type"),
            Some(&Value::from("uint32"))
        );
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            ApplicationFile::from_json_str("[1, 2]"),
            Err(BuildError::Config(_))
        ));
        assert!(matches!(
            ApplicationFile::from_toml_str("not = [valid"),
            Err(BuildError::Serialization(_))
        ));
    }
}
