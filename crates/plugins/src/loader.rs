//! Resolve plugin config documents to configured plugins.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use stratum_core::{env_flag, Loader, Validator};
use stratum_resource::{Resource, ResourceCollection, ResourceFactory};
use tracing::{debug, info};

use crate::{ExecPlugin, Generator, PluginHelpers, Registry, Transformer};

/// Where exec plugins live and whether they may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub root: PathBuf,
    pub exec_enabled: bool,
}

impl PluginConfig {
    pub fn new(root: impl Into<PathBuf>, exec_enabled: bool) -> Self {
        Self { root: root.into(), exec_enabled }
    }

    /// Root from `STRATUM_PLUGIN_ROOT`, else `$XDG_CONFIG_HOME/stratum/plugin`,
    /// else `$HOME/.config/stratum/plugin`. Exec plugins run only when
    /// `STRATUM_ENABLE_EXEC_PLUGINS` is set.
    pub fn from_env() -> Self {
        let non_empty = |k: &str| std::env::var_os(k).filter(|v| !v.is_empty()).map(PathBuf::from);
        let root = non_empty("STRATUM_PLUGIN_ROOT")
            .or_else(|| non_empty("XDG_CONFIG_HOME").map(|p| p.join("stratum").join("plugin")))
            .or_else(|| non_empty("HOME").map(|p| p.join(".config").join("stratum").join("plugin")))
            .unwrap_or_else(|| PathBuf::from(".config/stratum/plugin"));
        Self { root, exec_enabled: env_flag("STRATUM_ENABLE_EXEC_PLUGINS") }
    }

    /// `<root>/<group>/<version>/<lowercase kind>/<Kind>`. An apiVersion
    /// without a slash (`builtin`) is all group with an empty version.
    pub fn plugin_path(&self, api_version: &str, kind: &str) -> PathBuf {
        let (group, version) = api_version.split_once('/').unwrap_or((api_version, ""));
        let mut p = self.root.join(group);
        if !version.is_empty() {
            p.push(version);
        }
        p.join(kind.to_lowercase()).join(kind)
    }
}

/// Registry first, then exec plugins under the configured root.
#[derive(Clone)]
pub struct PluginLoader {
    config: PluginConfig,
    registry: Registry,
    factory: ResourceFactory,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader").field("config", &self.config).finish_non_exhaustive()
    }
}

impl PluginLoader {
    pub fn new(config: PluginConfig, factory: ResourceFactory) -> Self {
        Self { config, registry: Registry::builtin(), factory }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PluginConfig { &self.config }
    pub fn factory(&self) -> &ResourceFactory { &self.factory }

    fn exec_plugin(&self, api_version: &str, kind: &str) -> Result<ExecPlugin> {
        let p = ExecPlugin::new(self.config.plugin_path(api_version, kind));
        if !self.config.exec_enabled {
            bail!("no builtin plugin {api_version}/{kind} and exec plugins are disabled");
        }
        if !p.is_available() {
            bail!("plugin {api_version}/{kind} not found at {}", p.path().display());
        }
        info!(plugin = %p.path().display(), "using exec plugin");
        Ok(p)
    }

    fn selector(r: &Resource) -> (String, String) {
        let body = r.body();
        let s = |k: &str| body.get(k).and_then(|v| v.as_str()).unwrap_or("").to_string();
        (s("apiVersion"), s("kind"))
    }

    pub fn load_generator(
        &self,
        loader: Arc<dyn Loader>,
        validator: Arc<dyn Validator>,
        r: &Resource,
    ) -> Result<Box<dyn Generator>> {
        let (api_version, kind) = Self::selector(r);
        let mut g: Box<dyn Generator> = match self.registry.generator(&api_version, &kind) {
            Some(g) => g,
            None if self.registry.contains(&api_version, &kind) => bail!("{api_version}/{kind} is not a generator"),
            None => Box::new(self.exec_plugin(&api_version, &kind)?),
        };
        let helpers = PluginHelpers::new(loader, validator, self.factory.clone());
        g.config(&helpers, r.as_yaml()?.as_bytes())
            .with_context(|| format!("configuring generator {api_version}/{kind} '{}'", r.name()))?;
        debug!(api_version = %api_version, kind = %kind, name = %r.name(), "generator loaded");
        Ok(g)
    }

    pub fn load_transformer(
        &self,
        loader: Arc<dyn Loader>,
        validator: Arc<dyn Validator>,
        r: &Resource,
    ) -> Result<Box<dyn Transformer>> {
        let (api_version, kind) = Self::selector(r);
        let mut t: Box<dyn Transformer> = match self.registry.transformer(&api_version, &kind) {
            Some(t) => t,
            None if self.registry.contains(&api_version, &kind) => bail!("{api_version}/{kind} is not a transformer"),
            None => Box::new(self.exec_plugin(&api_version, &kind)?),
        };
        let helpers = PluginHelpers::new(loader, validator, self.factory.clone());
        t.config(&helpers, r.as_yaml()?.as_bytes())
            .with_context(|| format!("configuring transformer {api_version}/{kind} '{}'", r.name()))?;
        debug!(api_version = %api_version, kind = %kind, name = %r.name(), "transformer loaded");
        Ok(t)
    }

    pub fn load_generators(
        &self,
        loader: Arc<dyn Loader>,
        validator: Arc<dyn Validator>,
        configs: &ResourceCollection,
    ) -> Result<Vec<Box<dyn Generator>>> {
        configs.iter().map(|r| self.load_generator(loader.clone(), validator.clone(), r)).collect()
    }

    pub fn load_transformers(
        &self,
        loader: Arc<dyn Loader>,
        validator: Arc<dyn Validator>,
        configs: &ResourceCollection,
    ) -> Result<Vec<Box<dyn Transformer>>> {
        configs.iter().map(|r| self.load_transformer(loader.clone(), validator.clone(), r)).collect()
    }
}
