//! Function metadata registry
//!
//! The dispatcher only resolves names for metric attribution, through
//! [`FunctionLookup`]. Management surfaces use [`FunctionRegistry`].

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Registered function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
    pub route: Option<String>,
    pub language: String,
    /// Advertised timeout in seconds
    pub timeout: Option<u64>,
}

/// Read access by name
pub trait FunctionLookup: Send + Sync + std::fmt::Debug {
    fn get(&self, name: &str) -> Option<FunctionMetadata>;
}

/// Full CRUD over registered functions
pub trait FunctionRegistry: FunctionLookup {
    /// Insert or replace; returns the previous entry
    fn put(&self, metadata: FunctionMetadata) -> Option<FunctionMetadata>;

    fn delete(&self, name: &str) -> Option<FunctionMetadata>;

    /// All functions sorted by name
    fn list(&self) -> Vec<FunctionMetadata>;
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    functions: RwLock<BTreeMap<String, FunctionMetadata>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from `[functions.<name>]` config sections
    pub fn from_config(config: &Config) -> Self {
        let functions = config
            .functions
            .iter()
            .map(|(name, f)| {
                let metadata = FunctionMetadata {
                    name: name.clone(),
                    route: f.route.clone(),
                    language: f.language.clone(),
                    timeout: f.timeout,
                };
                (name.clone(), metadata)
            })
            .collect();

        Self {
            functions: RwLock::new(functions),
        }
    }
}

impl FunctionLookup for InMemoryRegistry {
    fn get(&self, name: &str) -> Option<FunctionMetadata> {
        self.functions.read().ok()?.get(name).cloned()
    }
}

impl FunctionRegistry for InMemoryRegistry {
    fn put(&self, metadata: FunctionMetadata) -> Option<FunctionMetadata> {
        self.functions
            .write()
            .ok()?
            .insert(metadata.name.clone(), metadata)
    }

    fn delete(&self, name: &str) -> Option<FunctionMetadata> {
        self.functions.write().ok()?.remove(name)
    }

    fn list(&self) -> Vec<FunctionMetadata> {
        self.functions
            .read()
            .map(|functions| functions.values().cloned().collect())
            .unwrap_or_default()
    }
}
