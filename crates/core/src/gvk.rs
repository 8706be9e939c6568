//! Group/Version/Kind selectors and resource identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Kinds that never live in a namespace.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CSIDriver",
    "CSINode",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

/// Group, version and kind. Used both as the type of an object and as a
/// selector, where empty parts match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvk {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// Selector matching one kind in any group and version.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), ..Self::default() }
    }

    /// Split an `apiVersion` ("apps/v1" or "v1") and pair it with `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self { group, version, kind: kind.to_string() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// True when `selector` matches this gvk; empty selector parts are wildcards.
    pub fn is_selected(&self, selector: &Gvk) -> bool {
        (selector.group.is_empty() || selector.group == self.group)
            && (selector.version.is_empty() || selector.version == self.version)
            && (selector.kind.is_empty() || selector.kind == self.kind)
    }

    /// Weight of the concrete parts of a selector. Kind outweighs version outweighs group.
    pub fn specificity(&self) -> u8 {
        let mut s = 0;
        if !self.kind.is_empty() { s += 4; }
        if !self.version.is_empty() { s += 2; }
        if !self.group.is_empty() { s += 1; }
        s
    }

    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&self.kind.as_str())
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |s: &str, empty: &'static str| if s.is_empty() { empty.to_string() } else { s.to_string() };
        write!(f, "{}_{}_{}", part(&self.group, "~G"), part(&self.version, "~V"), part(&self.kind, "~K"))
    }
}

/// Identity of one object: gvk + namespace + name. Unique within a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResId {
    #[serde(flatten)]
    pub gvk: Gvk,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}

impl ResId {
    pub fn new(gvk: Gvk, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { gvk, namespace: namespace.into(), name: name.into() }
    }

    /// Extract identity from an object tree (`apiVersion`, `kind`, `metadata.name`,
    /// optional `metadata.namespace`).
    pub fn from_value(v: &Value) -> Result<Self> {
        let kind = v.get("kind").and_then(Value::as_str).ok_or_else(|| Error::validation("object missing kind"))?;
        let api_version = v.get("apiVersion").and_then(Value::as_str).unwrap_or("");
        let meta = v.get("metadata");
        let name = meta
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation(format!("{} object missing metadata.name", kind)))?;
        let namespace = meta.and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or("");
        Ok(Self::new(Gvk::from_api_version(api_version, kind), namespace, name))
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self { name: name.into(), ..self.clone() }
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.namespace.is_empty() { "~X" } else { self.namespace.as_str() };
        write!(f, "{}|{}|{}", self.gvk, ns, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_round_trips() {
        let g = Gvk::from_api_version("apps/v1", "Deployment");
        assert_eq!(g, Gvk::new("apps", "v1", "Deployment"));
        assert_eq!(g.api_version(), "apps/v1");
        let core = Gvk::from_api_version("v1", "ConfigMap");
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
    }

    #[test]
    fn empty_selector_parts_are_wildcards() {
        let dep = Gvk::new("apps", "v1", "Deployment");
        assert!(dep.is_selected(&Gvk::default()));
        assert!(dep.is_selected(&Gvk::of_kind("Deployment")));
        assert!(dep.is_selected(&Gvk::new("apps", "", "")));
        assert!(!dep.is_selected(&Gvk::of_kind("StatefulSet")));
        assert!(!dep.is_selected(&Gvk::new("extensions", "", "Deployment")));
    }

    #[test]
    fn specificity_orders_kind_over_version_over_group() {
        assert!(Gvk::of_kind("A").specificity() > Gvk::new("g", "v", "").specificity());
        assert!(Gvk::new("", "v", "").specificity() > Gvk::new("g", "", "").specificity());
        assert_eq!(Gvk::default().specificity(), 0);
    }

    #[test]
    fn res_id_from_value_requires_kind_and_name() {
        let v = serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "d", "namespace": "test"}});
        let id = ResId::from_value(&v).unwrap();
        assert_eq!(id.name, "d");
        assert_eq!(id.namespace, "test");
        assert_eq!(id.to_string(), "apps_v1_Deployment|test|d");

        let no_name = serde_json::json!({"kind": "ConfigMap", "metadata": {}});
        assert!(ResId::from_value(&no_name).unwrap_err().is_validation());
        let no_kind = serde_json::json!({"metadata": {"name": "x"}});
        assert!(ResId::from_value(&no_kind).is_err());
    }

    #[test]
    fn ids_differing_only_by_namespace_are_distinct() {
        let g = Gvk::new("apps", "v1", "Deployment");
        assert_ne!(ResId::new(g.clone(), "", "dply2"), ResId::new(g, "test", "dply2"));
    }
}
