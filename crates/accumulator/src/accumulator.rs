//! Recursive base/overlay accumulation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use metrics::{counter, histogram};
use stratum_config::{load_config_from_crds, TransformerConfig};
use stratum_core::{Loader, Validator};
use stratum_plugins::PluginLoader;
use stratum_resource::{Resource, ResourceCollection, ResourceFactory};
use stratum_transform::{
    HashSuffixTransformer, MapTransformer, NameReferenceTransformer, NamespaceTransformer, PrefixSuffixTransformer,
    Transform, Var, VarTransformer,
};
use tracing::{debug, info};

use crate::kustomization::Kustomization;
use crate::patch::apply_patches;

/// What one directory contributes to its parent.
#[derive(Debug, Default)]
struct Level {
    resources: ResourceCollection,
    config: TransformerConfig,
    vars: Vec<Var>,
}

/// Builds the output of a kustomization directory and everything it pulls in.
#[derive(Clone)]
pub struct Accumulator {
    plugins: PluginLoader,
    validator: Arc<dyn Validator>,
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator").field("plugins", &self.plugins).finish_non_exhaustive()
    }
}

impl Accumulator {
    pub fn new(plugins: PluginLoader, validator: Arc<dyn Validator>) -> Self {
        Self { plugins, validator }
    }

    fn factory(&self) -> &ResourceFactory {
        self.plugins.factory()
    }

    /// Accumulate the kustomization at the loader root, then run the
    /// hash-suffix, name-reference and variable stages once over the result.
    pub fn build(&self, loader: Arc<dyn Loader>) -> Result<ResourceCollection> {
        let started = Instant::now();
        let root = loader.root().to_path_buf();
        let mut stack = Vec::new();
        let level = self.accumulate(loader, &mut stack)?;
        let out = finalize(level).with_context(|| format!("finalizing {}", root.display()))?;
        counter!("resources_accumulated", out.len() as u64);
        histogram!("accumulate_ms", started.elapsed().as_secs_f64() * 1000.0);
        info!(root = %root.display(), resources = out.len(), "build complete");
        Ok(out)
    }

    fn accumulate(&self, loader: Arc<dyn Loader>, stack: &mut Vec<PathBuf>) -> Result<Level> {
        let root = loader.root().to_path_buf();
        if stack.contains(&root) {
            bail!("cycle detected: {} is already being accumulated", root.display());
        }
        stack.push(root.clone());
        let level = self.accumulate_dir(loader, stack);
        stack.pop();
        level.with_context(|| format!("accumulating {}", root.display()))
    }

    fn accumulate_dir(&self, loader: Arc<dyn Loader>, stack: &mut Vec<PathBuf>) -> Result<Level> {
        let k = Kustomization::load(loader.as_ref())?;
        k.validate(self.validator.as_ref())?;
        debug!(root = %loader.root().display(), sources = k.resources.len() + k.bases.len(), "kustomization loaded");

        let mut level = Level::default();
        for src in k.sources() {
            if loader.is_dir(src) {
                let sub: Arc<dyn Loader> = Arc::from(loader.new_at(src)?);
                let base = self.accumulate(sub, stack)?;
                level.resources.absorb_all(base.resources).with_context(|| format!("absorbing base '{src}'"))?;
                level.config = level.config.merge(&base.config).with_context(|| format!("merging config of '{src}'"))?;
                level.vars.extend(base.vars);
            } else {
                let c = self.factory().from_file(loader.as_ref(), src)?;
                level.resources.absorb_all(c).with_context(|| format!("absorbing resource '{src}'"))?;
            }
        }

        self.run_generators(&k, &loader, &mut level.resources)?;

        let patches = self.documents(loader.as_ref(), &k.patches_strategic_merge)?;
        apply_patches(&mut level.resources, &patches).context("applying patches")?;

        let config = self.level_config(&k, loader.as_ref(), &level.config)?;
        mutators(&k, &config)[..].transform(&mut level.resources)?;

        if !k.transformers.is_empty() {
            let configs = ResourceCollection::from_resources(self.documents(loader.as_ref(), &k.transformers)?)?;
            for t in self.plugins.load_transformers(loader.clone(), self.validator.clone(), &configs)? {
                t.transform(&mut level.resources)?;
            }
        }

        level.config = config;
        level.vars.extend(k.vars.iter().cloned());
        Ok(level)
    }

    /// Built-in ConfigMap/Secret generators first, then generator plugins.
    fn run_generators(&self, k: &Kustomization, loader: &Arc<dyn Loader>, c: &mut ResourceCollection) -> Result<()> {
        let opts = k.generator_options.clone().unwrap_or_default();
        let mut generated = Vec::new();
        for args in &k.config_map_generator {
            let r = self.factory().from_configmap_args(loader.as_ref(), &opts, args);
            generated.push(r.with_context(|| format!("configMapGenerator '{}'", args.name))?);
        }
        for args in &k.secret_generator {
            let r = self.factory().from_secret_args(loader.as_ref(), &opts, args);
            generated.push(r.with_context(|| format!("secretGenerator '{}'", args.generator.name))?);
        }
        if !generated.is_empty() {
            c.absorb_all(ResourceCollection::from_resources(generated)?)?;
        }

        if !k.generators.is_empty() {
            let configs = ResourceCollection::from_resources(self.documents(loader.as_ref(), &k.generators)?)?;
            for g in self.plugins.load_generators(loader.clone(), self.validator.clone(), &configs)? {
                c.absorb_all(stratum_plugins::generate(g.as_ref())?)?;
            }
        }
        Ok(())
    }

    /// Every document of every file in `paths`, in order.
    fn documents(&self, loader: &dyn Loader, paths: &[String]) -> Result<Vec<Resource>> {
        let mut out = Vec::new();
        for p in paths {
            out.extend(self.factory().from_file(loader, p)?);
        }
        Ok(out)
    }

    /// Defaults, then this directory's configurations and CRDs, then its bases'.
    fn level_config(&self, k: &Kustomization, loader: &dyn Loader, bases: &TransformerConfig) -> Result<TransformerConfig> {
        let mut config = TransformerConfig::defaults()?;
        if !k.configurations.is_empty() {
            config = config.merge(&TransformerConfig::load_configs(loader, &k.configurations)?)?;
        }
        if !k.crds.is_empty() {
            config = config.merge(&load_config_from_crds(loader, &k.crds)?).context("merging crd config")?;
        }
        Ok(config.merge(bases)?)
    }
}

/// Name, namespace, label and annotation stages of one directory, in run order.
fn mutators(k: &Kustomization, config: &TransformerConfig) -> Vec<Box<dyn Transform>> {
    let mut stages: Vec<Box<dyn Transform>> = vec![
        Box::new(PrefixSuffixTransformer::new(&k.name_prefix, "", config.name_prefix.clone())),
        Box::new(PrefixSuffixTransformer::new("", &k.name_suffix, config.name_suffix.clone())),
        Box::new(NamespaceTransformer::new(&k.namespace, config.name_space.clone())),
    ];
    for l in &k.labels {
        let specs = if l.include_selectors { &config.common_labels } else { &config.labels };
        stages.push(Box::new(MapTransformer::new(specs.clone(), l.pairs.clone())));
    }
    stages.push(Box::new(MapTransformer::new(config.common_labels.clone(), k.common_labels.clone())));
    stages.push(Box::new(MapTransformer::new(config.common_annotations.clone(), k.common_annotations.clone())));
    stages
}

fn finalize(level: Level) -> Result<ResourceCollection> {
    let Level { mut resources, config, vars } = level;
    HashSuffixTransformer.transform(&mut resources)?;
    NameReferenceTransformer::new(config.name_reference).transform(&mut resources)?;
    VarTransformer::new(vars, config.var_reference)?.transform(&mut resources)?;
    Ok(resources)
}
