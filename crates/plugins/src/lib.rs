//! Stratum plugins: the generator/transformer contracts, the compiled-in
//! builtin registry, exec plugins and the loader choosing between them.
//!
//! A plugin is selected by the `apiVersion`/`kind` of its config document
//! and configured from the raw bytes of that document.

#![forbid(unsafe_code)]

use std::sync::Arc;

use stratum_core::{Loader, Validator};
use stratum_resource::{ResourceCollection, ResourceFactory};

pub mod builtin;
pub mod exec;
pub mod loader;
pub mod options;
pub mod registry;

pub use exec::ExecPlugin;
pub use loader::{PluginConfig, PluginLoader};
pub use options::{mark_resource_options, update_resource_options, BEHAVIOR_ANNOTATION, NEEDS_HASH_ANNOTATION};
pub use registry::Registry;

/// What a plugin may use while configuring and running.
#[derive(Clone)]
pub struct PluginHelpers {
    loader: Arc<dyn Loader>,
    validator: Arc<dyn Validator>,
    factory: ResourceFactory,
}

impl PluginHelpers {
    pub fn new(loader: Arc<dyn Loader>, validator: Arc<dyn Validator>, factory: ResourceFactory) -> Self {
        Self { loader, validator, factory }
    }

    pub fn loader(&self) -> &dyn Loader { self.loader.as_ref() }
    pub fn validator(&self) -> &dyn Validator { self.validator.as_ref() }
    pub fn factory(&self) -> &ResourceFactory { &self.factory }
}

impl std::fmt::Debug for PluginHelpers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHelpers").field("root", &self.loader.root()).finish_non_exhaustive()
    }
}

pub trait Configurable {
    /// Configure from the raw plugin config document (`apiVersion` and
    /// `kind` included).
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> anyhow::Result<()>;
}

pub trait Generator: Configurable {
    fn generate(&self) -> anyhow::Result<ResourceCollection>;
}

pub trait Transformer: Configurable {
    fn transform(&self, c: &mut ResourceCollection) -> anyhow::Result<()>;
}

/// Run a generator and fold its option annotations into resource fields.
pub fn generate(g: &dyn Generator) -> anyhow::Result<ResourceCollection> {
    let mut c = g.generate()?;
    update_resource_options(&mut c)?;
    Ok(c)
}
