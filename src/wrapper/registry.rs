//! Configuration-time wrapper resolution.
//!
//! Maps a protocol name from the config to a factory producing a concrete
//! [`Wrapper`]. The opaque options table travels through untouched.

use std::collections::HashMap;

use crate::wrapper::raw_tcp::RawTcp;
use crate::wrapper::{Wrapper, WrapperError};

type WrapperBuilder = Box<dyn Fn(&toml::Table) -> Result<Box<dyn Wrapper>, WrapperError>>;

/// Registry of named wrapper factories.
pub struct WrapperRegistry {
    builders: HashMap<String, WrapperBuilder>,
}

impl WrapperRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// A registry with the built-in wrappers registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("raw_tcp", |options| {
            RawTcp::from_options(options).map(|w| Box::new(w) as Box<dyn Wrapper>)
        });
        registry
    }

    /// Register a factory under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&toml::Table) -> Result<Box<dyn Wrapper>, WrapperError> + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Resolve a name to a wrapper instance built from `options`.
    pub fn resolve(
        &self,
        name: &str,
        options: &toml::Table,
    ) -> Result<Box<dyn Wrapper>, WrapperError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| WrapperError::Unknown(name.to_string()))?;
        builder(options)
    }

    /// Names of all registered wrappers, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
