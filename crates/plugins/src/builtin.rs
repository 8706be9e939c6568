//! Compiled-in plugins registered under apiVersion `builtin`.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use stratum_core::FieldSpecSet;
use stratum_resource::{ConfigMapArgs, GeneratorOptions, Resource, ResourceCollection, SecretArgs};
use stratum_transform::{HashSuffixTransformer, MapTransformer, NamespaceTransformer, PrefixSuffixTransformer, Transform};

use crate::{mark_resource_options, Configurable, Generator, PluginHelpers, Transformer};

pub const BUILTIN: &str = "builtin";

fn parse<T: DeserializeOwned>(kind: &str, config: &[u8]) -> Result<T> {
    serde_yaml::from_slice(config).with_context(|| format!("parsing {kind} config"))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
}

/// Generator config: `metadata`, generator options and generator args all
/// at the top level. Args without a name or namespace take them from
/// `metadata`.
#[derive(Debug, Clone, Default, Deserialize)]
struct GeneratorConfig<A> {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(flatten)]
    options: GeneratorOptions,
    #[serde(flatten)]
    args: A,
}

fn default_identity(args: &mut ConfigMapArgs, meta: &ObjectMeta) {
    if args.name.is_empty() {
        args.name = meta.name.clone();
    }
    if args.namespace.is_empty() {
        args.namespace = meta.namespace.clone();
    }
}

fn single(mut r: Resource) -> Result<ResourceCollection> {
    mark_resource_options(&mut r)?;
    Ok(ResourceCollection::from_resources([r])?)
}

#[derive(Debug, Default)]
pub struct ConfigMapGeneratorPlugin {
    helpers: Option<PluginHelpers>,
    options: GeneratorOptions,
    args: ConfigMapArgs,
}

impl Configurable for ConfigMapGeneratorPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        let cfg: GeneratorConfig<ConfigMapArgs> = parse("ConfigMapGenerator", config)?;
        self.options = cfg.options;
        self.args = cfg.args;
        default_identity(&mut self.args, &cfg.metadata);
        self.helpers = Some(helpers.clone());
        Ok(())
    }
}

impl Generator for ConfigMapGeneratorPlugin {
    fn generate(&self) -> Result<ResourceCollection> {
        let h = self.helpers.as_ref().ok_or_else(|| anyhow!("ConfigMapGenerator used before config"))?;
        let r = h
            .factory()
            .from_configmap_args(h.loader(), &self.options, &self.args)
            .with_context(|| format!("generating ConfigMap '{}'", self.args.name))?;
        single(r)
    }
}

#[derive(Debug, Default)]
pub struct SecretGeneratorPlugin {
    helpers: Option<PluginHelpers>,
    options: GeneratorOptions,
    args: SecretArgs,
}

impl Configurable for SecretGeneratorPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        let cfg: GeneratorConfig<SecretArgs> = parse("SecretGenerator", config)?;
        self.options = cfg.options;
        self.args = cfg.args;
        default_identity(&mut self.args.generator, &cfg.metadata);
        self.helpers = Some(helpers.clone());
        Ok(())
    }
}

impl Generator for SecretGeneratorPlugin {
    fn generate(&self) -> Result<ResourceCollection> {
        let h = self.helpers.as_ref().ok_or_else(|| anyhow!("SecretGenerator used before config"))?;
        let r = h
            .factory()
            .from_secret_args(h.loader(), &self.options, &self.args)
            .with_context(|| format!("generating Secret '{}'", self.args.generator.name))?;
        single(r)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelTransformerPlugin {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    field_specs: FieldSpecSet,
}

impl Configurable for LabelTransformerPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        *self = parse("LabelTransformer", config)?;
        for (k, v) in &self.labels {
            helpers.validator().validate_label(k, v)?;
        }
        Ok(())
    }
}

impl Transformer for LabelTransformerPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        MapTransformer::new(self.field_specs.clone(), self.labels.clone()).transform(c)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsTransformerPlugin {
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    field_specs: FieldSpecSet,
}

impl Configurable for AnnotationsTransformerPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        *self = parse("AnnotationsTransformer", config)?;
        for k in self.annotations.keys() {
            helpers.validator().validate_annotation_key(k)?;
        }
        Ok(())
    }
}

impl Transformer for AnnotationsTransformerPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        MapTransformer::new(self.field_specs.clone(), self.annotations.clone()).transform(c)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixSuffixTransformerPlugin {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    suffix: String,
    #[serde(default)]
    field_specs: FieldSpecSet,
}

impl Configurable for PrefixSuffixTransformerPlugin {
    fn config(&mut self, _helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        *self = parse("PrefixSuffixTransformer", config)?;
        Ok(())
    }
}

impl Transformer for PrefixSuffixTransformerPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        PrefixSuffixTransformer::new(self.prefix.as_str(), self.suffix.as_str(), self.field_specs.clone()).transform(c)?;
        Ok(())
    }
}

/// Namespace comes from the config's own `metadata.namespace`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceTransformerPlugin {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    field_specs: FieldSpecSet,
}

impl Configurable for NamespaceTransformerPlugin {
    fn config(&mut self, helpers: &PluginHelpers, config: &[u8]) -> Result<()> {
        *self = parse("NamespaceTransformer", config)?;
        if !self.metadata.namespace.is_empty() {
            helpers.validator().validate_namespace(&self.metadata.namespace)?;
        }
        Ok(())
    }
}

impl Transformer for NamespaceTransformerPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        NamespaceTransformer::new(self.metadata.namespace.as_str(), self.field_specs.clone()).transform(c)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HashTransformerPlugin;

impl Configurable for HashTransformerPlugin {
    fn config(&mut self, _helpers: &PluginHelpers, _config: &[u8]) -> Result<()> {
        Ok(())
    }
}

impl Transformer for HashTransformerPlugin {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        HashSuffixTransformer.transform(c)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stratum_core::{K8sValidator, MemoryLoader};
    use stratum_resource::{Behavior, ResourceFactory};

    fn helpers(ldr: MemoryLoader) -> PluginHelpers {
        let v = Arc::new(K8sValidator::new());
        PluginHelpers::new(Arc::new(ldr), v.clone(), ResourceFactory::new(v))
    }

    #[test]
    fn label_transformer_on_a_service() {
        let mut p = LabelTransformerPlugin::default();
        p.config(
            &helpers(MemoryLoader::new("/app")),
            b"apiVersion: builtin\nkind: LabelTransformer\nmetadata:\n  name: notImportantHere\n\
labels:\n  app: myApp\n  env: production\nfieldSpecs:\n- path: metadata/labels\n  create: true\n",
        )
        .unwrap();
        let f = ResourceFactory::new(Arc::new(K8sValidator::new()));
        let mut c = f
            .from_bytes(b"apiVersion: v1\nkind: Service\nmetadata:\n  name: myService\nspec:\n  ports:\n  - port: 7002\n")
            .unwrap();
        p.transform(&mut c).unwrap();
        let expected = f
            .from_bytes(
                b"apiVersion: v1\nkind: Service\nmetadata:\n  labels:\n    app: myApp\n    env: production\n  \
name: myService\nspec:\n  ports:\n  - port: 7002\n",
            )
            .unwrap();
        expected.error_if_not_equal(&c).unwrap();
    }

    #[test]
    fn configmap_generator_takes_name_from_metadata_and_marks_options() {
        let mut p = ConfigMapGeneratorPlugin::default();
        p.config(
            &helpers(MemoryLoader::new("/app")),
            b"apiVersion: builtin\nkind: ConfigMapGenerator\nmetadata:\n  name: settings\n  namespace: prod\n\
behavior: merge\ndisableNameSuffixHash: true\nliterals:\n- a=x\n- b=y\n",
        )
        .unwrap();
        let c = p.generate().unwrap();
        let r = &c.resources()[0];
        assert_eq!((r.name(), r.namespace()), ("settings", "prod"));
        assert_eq!(r.annotation(crate::BEHAVIOR_ANNOTATION), Some("merge"));
        assert_eq!(r.annotation(crate::NEEDS_HASH_ANNOTATION), Some("false"));

        let c = crate::generate(&p).unwrap();
        let r = &c.resources()[0];
        assert_eq!((r.behavior(), r.needs_hash()), (Behavior::Merge, false));
        assert_eq!(r.body()["data"], serde_json::json!({"a": "x", "b": "y"}));
    }

    #[test]
    fn secret_generator_reads_env_files() {
        let ldr = MemoryLoader::new("/app").with_file("a.env", "FRUIT=apple\n");
        let mut p = SecretGeneratorPlugin::default();
        p.config(&helpers(ldr), b"apiVersion: builtin\nkind: SecretGenerator\nname: mySecret\nenvs: [a.env]\n").unwrap();
        let c = crate::generate(&p).unwrap();
        let r = &c.resources()[0];
        assert_eq!(r.body()["type"], "Opaque");
        assert_eq!(r.body()["data"]["FRUIT"], "YXBwbGU=");
        assert!(r.needs_hash());
    }

    #[test]
    fn invalid_label_is_rejected_at_config() {
        let mut p = LabelTransformerPlugin::default();
        let err = p
            .config(&helpers(MemoryLoader::new("/app")), b"labels:\n  'bad key!': x\n")
            .unwrap_err();
        assert!(err.downcast_ref::<stratum_core::Error>().is_some_and(|e| e.is_validation()), "{err:#}");
    }
}
