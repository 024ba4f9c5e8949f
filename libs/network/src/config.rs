//! Transport Configuration
//!
//! A schema-less mapping handed to dial/listen. Only two keys are
//! interpreted here:
//!
//! - `protocol`: ALPN hint, a single string or a list of strings
//! - `proxy`: nested mapping, see [`crate::proxy`]
//!
//! Everything else is carried untouched for other transports. The parsed
//! proxy configuration is cached so repeated lookups return the same `Arc`
//! without re-parsing.

use crate::proxy::{describe_value, load_proxy_configuration, ProxyConfiguration};
use crate::{Result, TransportError};
use once_cell::sync::OnceCell;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const KEY_PROXY: &str = "proxy";
pub const KEY_PROTOCOL: &str = "protocol";

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    values: Mapping,
    /// `Some(None)` caches the absence of a proxy key
    proxy: OnceCell<Option<Arc<ProxyConfiguration>>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(values: Mapping) -> Self {
        Self {
            values,
            proxy: OnceCell::new(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(yaml)? {
            Value::Mapping(values) => Ok(Self::from_mapping(values)),
            Value::Null => Ok(Self::new()),
            other => Err(TransportError::configuration(
                format!(
                    "transport configuration must be a mapping, found [{}]",
                    describe_value(&other)
                ),
                None,
            )),
        }
    }

    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Insert or replace a key; drops any cached proxy configuration
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        self.proxy = OnceCell::new();
        self.values.insert(key.into(), value.into())
    }

    pub fn mapping(&self) -> &Mapping {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Requested application protocols for ALPN, empty when unset.
    ///
    /// # Panics
    ///
    /// If `protocol` is neither a string nor a list of strings. A wrongly
    /// shaped value is a programming error in whoever built the mapping; use
    /// [`try_protocols`](Self::try_protocols) to handle it instead.
    pub fn protocols(&self) -> Vec<String> {
        match self.try_protocols() {
            Ok(protocols) => protocols,
            Err(e) => panic!("invalid transport configuration: {e}"),
        }
    }

    pub fn try_protocols(&self) -> Result<Vec<String>> {
        let invalid = |value: &Value| {
            TransportError::configuration(
                format!(
                    "invalid protocol value [{}], must be string or list of strings",
                    describe_value(value)
                ),
                Some(KEY_PROTOCOL),
            )
        };

        match self.values.get(KEY_PROTOCOL) {
            None => Ok(Vec::new()),
            Some(Value::String(protocol)) => Ok(vec![protocol.clone()]),
            Some(list @ Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(protocol) => Ok(protocol.clone()),
                    _ => Err(invalid(list)),
                })
                .collect(),
            Some(other) => Err(invalid(other)),
        }
    }

    /// Parsed `proxy` section, `None` when no proxy is configured.
    ///
    /// Successful results (including absence) are cached; errors are not, so
    /// a corrected mapping can be retried after [`insert`](Self::insert).
    pub fn get_proxy_configuration(&self) -> Result<Option<Arc<ProxyConfiguration>>> {
        self.proxy
            .get_or_try_init(|| {
                let value = match self.values.get(KEY_PROXY) {
                    None => return Ok(None),
                    Some(value) => value,
                };

                let section = value.as_mapping().ok_or_else(|| {
                    TransportError::configuration(
                        format!(
                            "invalid proxy configuration value [{}], should be map",
                            describe_value(value)
                        ),
                        Some(KEY_PROXY),
                    )
                })?;

                let parsed = load_proxy_configuration(section)?;
                debug!(
                    proxy_type = %parsed.proxy_type,
                    address = %parsed.address,
                    "Parsed proxy configuration"
                );
                Ok(Some(Arc::new(parsed)))
            })
            .cloned()
    }
}

impl From<Mapping> for Configuration {
    fn from(values: Mapping) -> Self {
        Self::from_mapping(values)
    }
}
