//! Per-entity parameter cache
//!
//! Every named parameter set on an entity is remembered here so instances
//! posted later start with the same values.

use crate::backend::{AudioBackend, InstanceId};
use std::collections::BTreeMap;

/// Last-set float and label parameters for one entity.
///
/// The two namespaces are independent; a name set as both is applied as both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterCache {
    floats: BTreeMap<String, f32>,
    labels: BTreeMap<String, String>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
    }

    pub fn set_label(&mut self, name: &str, label: &str) {
        self.labels.insert(name.to_string(), label.to_string());
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn floats(&self) -> impl Iterator<Item = (&str, f32)> {
        self.floats.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.floats.len() + self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty() && self.labels.is_empty()
    }

    /// Write every cached value onto a freshly created instance
    pub fn apply_to(&self, backend: &mut dyn AudioBackend, instance: InstanceId) {
        for (name, value) in &self.floats {
            if let Err(e) = backend.set_parameter(instance, name, *value) {
                log::debug!("Audio: {instance} rejected parameter '{name}': {e}");
            }
        }
        for (name, label) in &self.labels {
            if let Err(e) = backend.set_parameter_label(instance, name, label) {
                log::debug!("Audio: {instance} rejected label '{name}': {e}");
            }
        }
    }
}
