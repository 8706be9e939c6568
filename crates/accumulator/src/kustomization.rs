//! The kustomization file of one directory.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stratum_core::{Loader, Validator};
use stratum_resource::{ConfigMapArgs, GeneratorOptions, SecretArgs};
use stratum_transform::Var;

/// Accepted file names, in lookup order.
pub const FILE_NAMES: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Labels with control over whether selectors are touched too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Label {
    #[serde(default)]
    pub pairs: BTreeMap<String, String>,
    #[serde(default)]
    pub include_selectors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Kustomization {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Files or kustomization directories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Older spelling for kustomization directories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_generator: Vec<ConfigMapArgs>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_generator: Vec<SecretArgs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_options: Option<GeneratorOptions>,

    /// Files holding generator plugin configs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generators: Vec<String>,
    /// Files holding transformer plugin configs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches_strategic_merge: Vec<String>,

    /// Transformer config files merged over the defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<String>,
    /// OpenAPI definition files with `x-kubernetes-*` markers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<Var>,
}

impl Kustomization {
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let k: Option<Kustomization> = serde_yaml::from_slice(bytes)?;
        Ok(k.unwrap_or_default())
    }

    /// Read the single kustomization file at the loader root.
    pub fn load(loader: &dyn Loader) -> Result<Self> {
        let mut found = FILE_NAMES.iter().filter_map(|name| loader.load(name).ok().map(|b| (*name, b)));
        let Some((name, bytes)) = found.next() else {
            bail!("missing kustomization file in {}; expected one of {:?}", loader.root().display(), FILE_NAMES);
        };
        if let Some((other, _)) = found.next() {
            bail!("found both {name} and {other} in {}", loader.root().display());
        }
        Self::from_yaml(&bytes).with_context(|| format!("parsing {}", loader.resolve(name).display()))
    }

    /// Check label, annotation and namespace values before anything is built.
    pub fn validate(&self, v: &dyn Validator) -> stratum_core::Result<()> {
        if !self.namespace.is_empty() {
            v.validate_namespace(&self.namespace)?;
        }
        for (k, val) in self.common_labels.iter().chain(self.labels.iter().flat_map(|l| l.pairs.iter())) {
            v.validate_label(k, val)?;
        }
        for k in self.common_annotations.keys() {
            v.validate_annotation_key(k)?;
        }
        Ok(())
    }

    /// `bases` then `resources`, in declaration order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.bases.iter().chain(self.resources.iter()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::{K8sValidator, MemoryLoader};

    #[test]
    fn full_document_parses() {
        let k = Kustomization::from_yaml(
            br#"
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
resources: [deployment.yaml]
bases: [../base]
namePrefix: prod-
namespace: prod
commonLabels: {app: web}
labels:
- pairs: {tier: frontend}
  includeSelectors: true
commonAnnotations: {note: hello}
configMapGenerator:
- name: settings
  behavior: merge
  literals: [a=x]
secretGenerator:
- name: creds
  type: kubernetes.io/basic-auth
  literals: [user=admin]
generatorOptions: {disableNameSuffixHash: true}
patchesStrategicMerge: [patch.yaml]
vars:
- name: SVC
  objref: {apiVersion: v1, kind: Service, name: web}
"#,
        )
        .unwrap();
        assert_eq!(k.sources().collect::<Vec<_>>(), vec!["../base", "deployment.yaml"]);
        assert!(k.labels[0].include_selectors);
        assert_eq!(k.config_map_generator[0].behavior, "merge");
        assert_eq!(k.secret_generator[0].secret_type, "kubernetes.io/basic-auth");
        assert!(k.generator_options.as_ref().unwrap().disable_name_suffix_hash);
        assert_eq!(k.vars[0].fieldref.fieldpath, "metadata.name");
        k.validate(&K8sValidator::new()).unwrap();
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(Kustomization::from_yaml(b"namePrefx: oops-\n").is_err());
    }

    #[test]
    fn load_picks_the_single_file() {
        let ldr = MemoryLoader::new("/app").with_file("Kustomization", "namePrefix: a-\n");
        assert_eq!(Kustomization::load(&ldr).unwrap().name_prefix, "a-");

        let both = ldr.clone().with_file("kustomization.yaml", "");
        assert!(Kustomization::load(&both).unwrap_err().to_string().contains("found both"));

        let none = MemoryLoader::new("/empty");
        assert!(Kustomization::load(&none).unwrap_err().to_string().contains("missing kustomization"));
    }

    #[test]
    fn invalid_namespace_fails_validation() {
        let k = Kustomization { namespace: "Not_Valid".into(), ..Default::default() };
        assert!(k.validate(&K8sValidator::new()).unwrap_err().is_validation());
    }
}
