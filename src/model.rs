//! Instrument models: a named command table plus default options.
//!
//! New instruments need no code, only a TOML model file:
//!
//! ```toml
//! [model]
//! name = "Rigol DM3058"
//! manufacturer = "Rigol"
//!
//! [options]
//! read_termination = "\n"
//!
//! [properties.voltage]
//! get = ":MEAS:VOLT:DC?"
//! doc = "Measure DC voltage in V."
//! ```
//!
//! Properties keep their file order. The registry is built once per model and
//! shared by every instrument connected through it.

use crate::adapters::{Adapter, AdapterOptions};
use crate::error::{InstrumentError, InstrumentResult};
use crate::instrument::Instrument;
use crate::property::PropertySpec;
use crate::registry::PropertyRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// `[model]` section of a model file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelInfo {
    /// Default display name of instruments of this model.
    pub name: String,
    /// Manufacturer, informational.
    pub manufacturer: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Parsed model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model metadata.
    pub model: ModelInfo,
    /// Default option bag.
    #[serde(default)]
    pub options: toml::Table,
    /// Property tables, keyed by property name.
    #[serde(default)]
    pub properties: toml::Table,
}

impl ModelConfig {
    /// Parse a model from TOML text.
    pub fn from_toml_str(text: &str) -> InstrumentResult<Self> {
        toml::from_str(text)
            .map_err(|e| InstrumentError::configuration(format!("invalid model file: {}", e)))
    }

    /// Read and parse a model file.
    pub fn from_file(path: impl AsRef<Path>) -> InstrumentResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InstrumentError::configuration(format!(
                "cannot read model file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check metadata and options. Property tables are checked when the
    /// registry is built.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.name.trim().is_empty() {
            return Err("model name cannot be empty".to_string());
        }
        if self.properties.is_empty() {
            return Err(format!("model '{}' declares no properties", self.model.name));
        }
        AdapterOptions::from_table(&self.options).map_err(|e| format!("[options]: {}", e))?;
        Ok(())
    }
}

/// A loaded model, ready to connect instruments.
#[derive(Debug, Clone)]
pub struct InstrumentModel {
    info: ModelInfo,
    registry: Arc<PropertyRegistry>,
    defaults: AdapterOptions,
}

impl InstrumentModel {
    /// Model from an already-built registry.
    pub fn new(name: &str, registry: Arc<PropertyRegistry>) -> Self {
        Self {
            info: ModelInfo {
                name: name.to_string(),
                ..Default::default()
            },
            registry,
            defaults: AdapterOptions::default(),
        }
    }

    /// Set the options every instrument of this model starts from.
    pub fn with_default_options(mut self, defaults: AdapterOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Validate a parsed model file and build its registry.
    pub fn from_config(config: ModelConfig) -> InstrumentResult<Self> {
        config.validate().map_err(InstrumentError::Configuration)?;
        let defaults = AdapterOptions::from_table(&config.options)
            .map_err(|e| InstrumentError::configuration(format!("[options]: {}", e)))?;

        let mut builder = PropertyRegistry::builder();
        for (name, table) in config.properties {
            let spec: PropertySpec = table.try_into().map_err(|e: toml::de::Error| {
                InstrumentError::configuration(format!("property '{}': {}", name, e.message()))
            })?;
            builder = builder.register(&name, spec)?;
        }
        let registry = builder.build();
        debug!(
            model = %config.model.name,
            properties = registry.len(),
            "Model loaded"
        );

        Ok(Self {
            info: config.model,
            registry,
            defaults,
        })
    }

    /// Load a model from TOML text.
    pub fn from_toml_str(text: &str) -> InstrumentResult<Self> {
        Self::from_config(ModelConfig::from_toml_str(text)?)
    }

    /// Load a model file.
    pub fn from_file(path: impl AsRef<Path>) -> InstrumentResult<Self> {
        Self::from_config(ModelConfig::from_file(path)?)
    }

    /// Model name, also the default instrument name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Model metadata.
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// Default options.
    pub fn default_options(&self) -> &AdapterOptions {
        &self.defaults
    }

    /// Connect an instrument with the model's default options.
    pub fn connect<A: Adapter>(&self, adapter: A) -> InstrumentResult<Instrument<A>> {
        Instrument::configured(adapter, &self.info.name, Arc::clone(&self.registry), &self.defaults)
    }

    /// Connect an instrument; keys in `options` override the model defaults.
    pub fn connect_with<A: Adapter>(
        &self,
        adapter: A,
        options: &toml::Table,
    ) -> InstrumentResult<Instrument<A>> {
        let overrides = AdapterOptions::from_table(options).map_err(|e| {
            InstrumentError::configuration(format!("instrument '{}': {}", self.info.name, e))
        })?;
        Instrument::configured(
            adapter,
            &self.info.name,
            Arc::clone(&self.registry),
            &self.defaults.merged(&overrides),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
        [model]
        name = "Bench PSU"

        [options]
        timeout_ms = 2000

        [properties.voltage]
        get = "MEAS:VOLT?"

        [properties.output]
        get = "OUTP?"
        set = "OUTP %s"
        kind = "bool"

        [properties.current_limit]
        set = "CURR %g"
        validator = "strict_range"
        values = [0.0, 3.0]
    "#;

    #[test]
    fn test_properties_keep_file_order() {
        let model = InstrumentModel::from_toml_str(MODEL).unwrap();
        assert_eq!(model.name(), "Bench PSU");
        assert_eq!(
            model.registry().names().collect::<Vec<_>>(),
            vec!["voltage", "output", "current_limit"]
        );
        assert_eq!(model.default_options().timeout_ms, Some(2000));
    }

    #[test]
    fn test_bad_property_names_the_property() {
        let text = MODEL.replace("\"strict_range\"", "\"clamp\"");
        let err = InstrumentModel::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("current_limit"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let config = ModelConfig::from_toml_str("[model]\nname = \"Empty\"").unwrap();
        assert!(config.validate().unwrap_err().contains("no properties"));

        let err = ModelConfig::from_toml_str("[model]\nname = \"X\"\nvendor = \"Y\"").unwrap_err();
        assert!(matches!(err, InstrumentError::Configuration(_)));
    }
}
