//! Name → descriptor registry.
//!
//! Built once per instrument model through [`RegistryBuilder`] and shared by
//! every instance of that model behind an `Arc`. Lookups are hash lookups;
//! declaration order is kept separately for listing.

use crate::error::{InstrumentError, InstrumentResult};
use crate::property::{PropertyDescriptor, PropertySpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable table of property descriptors.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    descriptors: HashMap<String, Arc<PropertyDescriptor>>,
    order: Vec<String>,
}

impl PropertyRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.descriptors.get(name)
    }

    /// Descriptor registered under `name`, or an unknown-property error.
    pub fn lookup(&self, name: &str) -> InstrumentResult<&Arc<PropertyDescriptor>> {
        self.descriptors
            .get(name)
            .ok_or_else(|| InstrumentError::UnknownProperty(name.to_string()))
    }

    /// Property names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PropertyDescriptor>> {
        self.order.iter().filter_map(|name| self.descriptors.get(name))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Collects property specs, validating each on registration.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: PropertyRegistry,
}

impl RegistryBuilder {
    /// Validate `spec` and register it under `name`.
    pub fn register(mut self, name: &str, spec: PropertySpec) -> InstrumentResult<Self> {
        if name.is_empty() {
            return Err(InstrumentError::configuration("property name cannot be empty"));
        }
        if self.registry.descriptors.contains_key(name) {
            return Err(InstrumentError::configuration(format!(
                "property '{}' is registered twice",
                name
            )));
        }
        let descriptor = PropertyDescriptor::from_spec(name, spec)?;
        self.registry
            .descriptors
            .insert(name.to_string(), Arc::new(descriptor));
        self.registry.order.push(name.to_string());
        Ok(self)
    }

    /// Finish and share the registry.
    pub fn build(self) -> Arc<PropertyRegistry> {
        Arc::new(self.registry)
    }
}
