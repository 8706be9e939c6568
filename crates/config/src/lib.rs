//! Stratum transformer config: the field spec categories each built-in
//! transformer consults, the embedded defaults, and CRD schema ingestion.

#![forbid(unsafe_code)]

pub mod crds;
pub mod namebackref;

use serde::{Deserialize, Serialize};
use stratum_core::{Error, FieldSpec, FieldSpecSet, Loader, Result};
use tracing::debug;

pub use crds::load_config_from_crds;
pub use namebackref::{NameBackReference, NameBackReferences};

const DEFAULTS_YAML: &str = include_str!("defaults.yaml");

/// Field specs per transformer category.
///
/// `labels` only touches metadata, `commonLabels` also reaches selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerConfig {
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub name_prefix: FieldSpecSet,
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub name_suffix: FieldSpecSet,
    #[serde(default, rename = "namespace", skip_serializing_if = "FieldSpecSet::is_empty")]
    pub name_space: FieldSpecSet,
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub labels: FieldSpecSet,
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub common_labels: FieldSpecSet,
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub common_annotations: FieldSpecSet,
    #[serde(default, skip_serializing_if = "NameBackReferences::is_empty")]
    pub name_reference: NameBackReferences,
    #[serde(default, skip_serializing_if = "FieldSpecSet::is_empty")]
    pub var_reference: FieldSpecSet,
}

/// Prefix a conflict message with the category it came from.
fn in_category(category: &str, err: Error) -> Error {
    match err {
        Error::Conflict(msg) => Error::conflict(format!("{category}: {msg}")),
        other => other,
    }
}

impl TransformerConfig {
    pub fn empty() -> Self { Self::default() }

    /// The built-in field specs for well-known kinds.
    pub fn defaults() -> Result<Self> {
        Self::from_yaml(DEFAULTS_YAML.as_bytes())
    }

    /// Parse a config document. An empty document is an empty config.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let v: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
        if v.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(v)?)
    }

    /// Fold the config files at `paths` (relative to the loader) into one config.
    pub fn load_configs(loader: &dyn Loader, paths: &[String]) -> Result<Self> {
        let mut out = Self::default();
        for path in paths {
            let bytes = loader.load(path)?;
            let cfg = Self::from_yaml(&bytes)
                .map_err(|e| Error::validation(format!("parsing transformer config '{path}': {e}")))?;
            out = out.merge(&cfg)?;
            debug!(path = %path, "transformer config loaded");
        }
        Ok(out)
    }

    /// Category by category union. The first conflict found wins.
    pub fn merge(&self, other: &TransformerConfig) -> Result<TransformerConfig> {
        let m = |cat: &str, a: &FieldSpecSet, b: &FieldSpecSet| a.merge_all(b).map_err(|e| in_category(cat, e));
        Ok(TransformerConfig {
            name_prefix: m("namePrefix", &self.name_prefix, &other.name_prefix)?,
            name_suffix: m("nameSuffix", &self.name_suffix, &other.name_suffix)?,
            name_space: m("namespace", &self.name_space, &other.name_space)?,
            labels: m("labels", &self.labels, &other.labels)?,
            common_labels: m("commonLabels", &self.common_labels, &other.common_labels)?,
            common_annotations: m("commonAnnotations", &self.common_annotations, &other.common_annotations)?,
            name_reference: self
                .name_reference
                .merge_all(&other.name_reference)
                .map_err(|e| in_category("nameReference", e))?,
            var_reference: m("varReference", &self.var_reference, &other.var_reference)?,
        })
    }

    /// Identity fields take both prefixes and suffixes.
    pub fn add_identity_field_spec(&mut self, fs: FieldSpec) -> Result<()> {
        self.name_prefix.merge_one(fs.clone()).map_err(|e| in_category("namePrefix", e))?;
        self.name_suffix.merge_one(fs).map_err(|e| in_category("nameSuffix", e))
    }

    pub fn add_label_field_spec(&mut self, fs: FieldSpec) -> Result<()> {
        self.common_labels.merge_one(fs).map_err(|e| in_category("commonLabels", e))
    }

    pub fn add_annotation_field_spec(&mut self, fs: FieldSpec) -> Result<()> {
        self.common_annotations.merge_one(fs).map_err(|e| in_category("commonAnnotations", e))
    }

    pub fn add_name_reference(&mut self, r: NameBackReference) -> Result<()> {
        self.name_reference.merge_one(r).map_err(|e| in_category("nameReference", e))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::{Gvk, MemoryLoader};

    #[test]
    fn defaults_parse_and_cover_core_categories() {
        let cfg = TransformerConfig::defaults().unwrap();
        assert!(!cfg.name_prefix.is_empty());
        assert!(!cfg.name_suffix.is_empty());
        assert!(!cfg.name_space.is_empty());
        assert!(!cfg.labels.is_empty());
        assert!(cfg.common_labels.len() > cfg.labels.len());
        assert!(!cfg.common_annotations.is_empty());
        assert!(!cfg.var_reference.is_empty());
        for target in ["ConfigMap", "Secret", "Service", "ServiceAccount", "PersistentVolumeClaim"] {
            assert!(cfg.name_reference.get(&Gvk::new("", "v1", target)).is_some(), "{target}");
        }
    }

    #[test]
    fn service_selector_is_a_common_label_but_not_a_label() {
        let cfg = TransformerConfig::defaults().unwrap();
        let svc = Gvk::new("", "v1", "Service");
        assert!(cfg.common_labels.selecting(&svc).any(|fs| fs.path == "spec/selector"));
        assert!(!cfg.labels.selecting(&svc).any(|fs| fs.path == "spec/selector"));
    }

    #[test]
    fn load_configs_from_files() {
        let ldr = MemoryLoader::new("/app").with_file(
            "/app/config.yaml",
            "\nnamePrefix:\n- path: nameprefix/path\n  kind: SomeKind\n",
        );
        let cfg = TransformerConfig::load_configs(&ldr, &["/app/config.yaml".to_string()]).unwrap();
        let expected = TransformerConfig {
            name_prefix: FieldSpecSet::from_specs([FieldSpec::new(Gvk::of_kind("SomeKind"), "nameprefix/path", false)])
                .unwrap(),
            ..TransformerConfig::default()
        };
        assert_eq!(cfg, expected);
    }

    #[test]
    fn empty_document_is_empty_config() {
        assert_eq!(TransformerConfig::from_yaml(b"").unwrap(), TransformerConfig::empty());
        assert_eq!(TransformerConfig::from_yaml(b"# nothing\n").unwrap(), TransformerConfig::empty());
    }

    #[test]
    fn merge_with_defaults_is_idempotent() {
        let d = TransformerConfig::defaults().unwrap();
        assert_eq!(d.merge(&d).unwrap(), d);
        assert_eq!(d.merge(&TransformerConfig::empty()).unwrap(), d);
    }

    #[test]
    fn merge_conflict_names_category() {
        let a = TransformerConfig::from_yaml(b"commonLabels:\n- path: metadata/labels\n  create: true\n").unwrap();
        let b = TransformerConfig::from_yaml(b"commonLabels:\n- path: metadata/labels\n").unwrap();
        let err = a.merge(&b).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().starts_with("conflict: commonLabels:"), "{err}");
    }

    #[test]
    fn identity_spec_lands_in_prefix_and_suffix() {
        let mut cfg = TransformerConfig::empty();
        cfg.add_identity_field_spec(FieldSpec::new(Gvk::of_kind("MyKind"), "spec/id", false)).unwrap();
        assert_eq!(cfg.name_prefix.len(), 1);
        assert_eq!(cfg.name_suffix.len(), 1);
    }

    #[test]
    fn yaml_output_parses_back_to_the_same_config() {
        let d = TransformerConfig::defaults().unwrap();
        let text = d.to_yaml().unwrap();
        assert_eq!(TransformerConfig::from_yaml(text.as_bytes()).unwrap(), d);
    }
}
