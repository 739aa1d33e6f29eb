//! Process resource attached to every exported batch.

use crate::core::headers::parse_headers;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_semantic_conventions::resource::{
    SERVICE_NAME, TELEMETRY_SDK_LANGUAGE, TELEMETRY_SDK_NAME, TELEMETRY_SDK_VERSION,
};
use serde::{Deserialize, Serialize};

/// Prefix of the synthesized service name when none is configured.
pub const UNKNOWN_SERVICE_PREFIX: &str = "unknown_service";

const SDK_NAME: &str = env!("CARGO_PKG_NAME");
const SDK_LANGUAGE: &str = "rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resource settings as they appear in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Explicit `service.name`, wins over `attributes`
    pub service_name: Option<String>,
    /// `OTEL_RESOURCE_ATTRIBUTES` style `key=value,key2=value2` list
    pub attributes: Option<String>,
}

/// Ordered attributes describing the reporting process.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    attributes: Vec<KeyValue>,
}

impl Resource {
    /// Builds a resource from explicit attributes, filling in defaults.
    ///
    /// A later attribute with the same key replaces an earlier one in place.
    pub fn new(attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        let mut resource = Resource { attributes: Vec::new() };
        for kv in attributes {
            resource.upsert(kv);
        }
        resource.fill_defaults();
        resource
    }

    /// Resolves a resource from configuration.
    pub fn from_config(config: &ResourceConfig) -> Self {
        let mut attributes: Vec<KeyValue> = config
            .attributes
            .as_deref()
            .map(parse_headers)
            .unwrap_or_default()
            .into_inner()
            .into_iter()
            .map(|(k, v)| KeyValue::new(k, v))
            .collect();

        if let Some(name) = config.service_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            attributes.push(KeyValue::new(SERVICE_NAME, name.to_string()));
        }

        Self::new(attributes)
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    /// The `service.name` attribute, always present after construction.
    pub fn service_name(&self) -> String {
        self.get(SERVICE_NAME)
            .map(|v| v.as_str().into_owned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn upsert(&mut self, kv: KeyValue) {
        match self.attributes.iter_mut().find(|existing| existing.key == kv.key) {
            Some(existing) => existing.value = kv.value,
            None => self.attributes.push(kv),
        }
    }

    fn insert_if_absent(&mut self, key: &'static str, value: String) {
        if self.get(key).is_none() {
            self.attributes.push(KeyValue::new(Key::from_static_str(key), value));
        }
    }

    fn fill_defaults(&mut self) {
        let has_service = self
            .get(SERVICE_NAME)
            .map(|v| !v.as_str().trim().is_empty())
            .unwrap_or(false);
        if !has_service {
            self.attributes.retain(|kv| kv.key.as_str() != SERVICE_NAME);
            self.attributes.insert(0, KeyValue::new(SERVICE_NAME, unknown_service_name()));
        }
        self.insert_if_absent(TELEMETRY_SDK_NAME, SDK_NAME.to_string());
        self.insert_if_absent(TELEMETRY_SDK_LANGUAGE, SDK_LANGUAGE.to_string());
        self.insert_if_absent(TELEMETRY_SDK_VERSION, SDK_VERSION.to_string());
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// `unknown_service:<process-name>`, or plain `unknown_service` if the
/// executable name cannot be determined.
pub fn unknown_service_name() -> String {
    match process_name() {
        Some(name) => format!("{UNKNOWN_SERVICE_PREFIX}:{name}"),
        None => UNKNOWN_SERVICE_PREFIX.to_string(),
    }
}

fn process_name() -> Option<String> {
    let from_exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()));
    from_exe
        .or_else(|| {
            std::env::args_os().next().and_then(|arg0| {
                std::path::Path::new(&arg0)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
        })
        .filter(|name| !name.is_empty())
}
