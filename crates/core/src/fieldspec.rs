//! Field specs: which field, on which kind of object, a transformer may touch.
//!
//! A [`FieldSpec`] pairs a kind selector with a slash separated path, e.g.
//!
//! ```yaml
//! group: apps
//! kind: Deployment
//! path: spec/template/metadata/labels
//! create: true
//! ```
//!
//! A literal slash inside a field name is written `\/`, so the annotation
//! `ingress.kubernetes.io/auth-secret` is addressed as
//! `metadata/annotations/ingress.kubernetes.io\/auth-secret`.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

use crate::{Error, Gvk, Result};

const ESCAPED_FORWARD_SLASH: &str = "\\/";
const SLASH_SENTINEL: &str = "\u{0}";

pub type PathSegments = SmallVec<[String; 8]>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub gvk: Gvk,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, rename = "create", skip_serializing_if = "std::ops::Not::not")]
    pub create_if_not_present: bool,
}

impl FieldSpec {
    pub fn new(gvk: Gvk, path: impl Into<String>, create: bool) -> Self {
        Self { gvk, path: path.into(), create_if_not_present: create }
    }

    /// Same selector and same path. The create flag is not part of identity.
    pub fn effectively_equals(&self, other: &FieldSpec) -> bool {
        self.gvk == other.gvk && self.path == other.path
    }

    /// Split the path on `/`, keeping `\/` as a literal slash inside a segment.
    pub fn path_slice(&self) -> PathSegments {
        if !self.path.contains(ESCAPED_FORWARD_SLASH) {
            return self.path.split('/').map(str::to_string).collect();
        }
        self.path
            .replace(ESCAPED_FORWARD_SLASH, SLASH_SENTINEL)
            .split('/')
            .map(|seg| seg.replace(SLASH_SENTINEL, "/"))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::validation(format!("fieldspec for {} has an empty path", self.gvk)));
        }
        if self.path_slice().iter().any(String::is_empty) {
            return Err(Error::validation(format!("fieldspec path '{}' has an empty segment", self.path)));
        }
        Ok(())
    }

    fn sort_key(&self) -> (Reverse<u8>, &str, &str, &str, &str) {
        (Reverse(self.gvk.specificity()), &self.gvk.group, &self.gvk.version, &self.gvk.kind, &self.path)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.gvk, self.create_if_not_present, self.path)
    }
}

fn conflicting(a: &FieldSpec, b: &FieldSpec) -> Error {
    let (lo, hi) = if a.create_if_not_present { (b, a) } else { (a, b) };
    Error::conflict(format!(
        "conflicting fieldspecs for {} at path '{}': create={} vs create={}",
        a.gvk, a.path, lo.create_if_not_present, hi.create_if_not_present
    ))
}

/// Ordered, duplicate free set of field specs.
///
/// Members are kept sorted from most to least specific selector, so two sets
/// built from the same specs in any order compare equal and match fields in
/// the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldSpecSet(Vec<FieldSpec>);

impl FieldSpecSet {
    pub fn new() -> Self { Self(Vec::new()) }

    pub fn from_specs(specs: impl IntoIterator<Item = FieldSpec>) -> Result<Self> {
        let mut set = Self::new();
        for fs in specs {
            set.merge_one(fs)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, FieldSpec> { self.0.iter() }
    pub fn as_slice(&self) -> &[FieldSpec] { &self.0 }

    fn index_of(&self, fs: &FieldSpec) -> Option<usize> {
        self.0.iter().position(|x| x.effectively_equals(fs))
    }

    /// Insert `x` unless an effectively equal spec is present. Present with a
    /// different create flag is a conflict.
    pub fn merge_one(&mut self, x: FieldSpec) -> Result<()> {
        x.validate()?;
        if let Some(i) = self.index_of(&x) {
            if self.0[i].create_if_not_present != x.create_if_not_present {
                return Err(conflicting(&self.0[i], &x));
            }
            return Ok(());
        }
        let pos = self.0.partition_point(|s| s.sort_key() <= x.sort_key());
        self.0.insert(pos, x);
        Ok(())
    }

    /// Fold `incoming` into a copy of this set, stopping at the first conflict.
    ///
    /// `incoming` is walked in its sorted order, so the reported conflict is
    /// the smallest conflicting spec regardless of which side is merged into
    /// which.
    pub fn merge_all(&self, incoming: &FieldSpecSet) -> Result<FieldSpecSet> {
        let mut result = self.clone();
        for x in incoming.iter() {
            result.merge_one(x.clone())?;
        }
        Ok(result)
    }

    /// Specs whose selector matches `gvk`, most specific first.
    pub fn selecting<'a>(&'a self, gvk: &'a Gvk) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.0.iter().filter(move |fs| gvk.is_selected(&fs.gvk))
    }
}

impl<'a> IntoIterator for &'a FieldSpecSet {
    type Item = &'a FieldSpec;
    type IntoIter = std::slice::Iter<'a, FieldSpec>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl<'de> Deserialize<'de> for FieldSpecSet {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let specs = Option::<Vec<FieldSpec>>::deserialize(d)?.unwrap_or_default();
        FieldSpecSet::from_specs(specs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(kind: &str, path: &str, create: bool) -> FieldSpec {
        FieldSpec::new(Gvk::of_kind(kind), path, create)
    }

    #[test]
    fn path_slice_honours_escaped_slash() {
        let spec = fs("", "metadata/annotations/foo\\/bar", false);
        assert_eq!(spec.path_slice().to_vec(), vec!["metadata", "annotations", "foo/bar"]);

        let plain = fs("", "spec/template/metadata/labels", false);
        assert_eq!(plain.path_slice().len(), 4);

        let ingress = fs("Ingress", "metadata/annotations/ingress.kubernetes.io\\/auth-secret", false);
        assert_eq!(ingress.path_slice()[2], "ingress.kubernetes.io/auth-secret");
    }

    #[test]
    fn validate_rejects_empty_segments() {
        assert!(fs("A", "", false).validate().is_err());
        assert!(fs("A", "metadata//name", false).validate().unwrap_err().is_validation());
        assert!(fs("A", "metadata/name", false).validate().is_ok());
    }

    #[test]
    fn merge_one_same_flag_is_noop() {
        let mut set = FieldSpecSet::from_specs([fs("Deployment", "metadata/labels", true)]).unwrap();
        set.merge_one(fs("Deployment", "metadata/labels", true)).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn merge_one_different_flag_conflicts() {
        let mut set = FieldSpecSet::from_specs([fs("Deployment", "metadata/labels", true)]).unwrap();
        let err = set.merge_one(fs("Deployment", "metadata/labels", false)).unwrap_err();
        assert!(err.is_conflict());
        let msg = err.to_string();
        assert!(msg.contains("metadata/labels"), "{msg}");
        assert!(msg.contains("create=false vs create=true"), "{msg}");
    }

    #[test]
    fn merge_all_is_commutative_without_conflicts() {
        let a = FieldSpecSet::from_specs([
            fs("", "metadata/name", false),
            fs("Deployment", "spec/template/metadata/labels", true),
        ])
        .unwrap();
        let b = FieldSpecSet::from_specs([
            fs("Service", "spec/selector", true),
            fs("", "metadata/name", false),
            FieldSpec::new(Gvk::new("apps", "v1", "Deployment"), "spec/selector/matchLabels", true),
        ])
        .unwrap();
        let ab = a.merge_all(&b).unwrap();
        let ba = b.merge_all(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 4);
    }

    #[test]
    fn merge_all_reports_same_conflict_in_any_order() {
        let a = FieldSpecSet::from_specs([fs("A", "x", true), fs("B", "y", false), fs("C", "z", true)]).unwrap();
        let b = FieldSpecSet::from_specs([fs("C", "z", false), fs("A", "x", false)]).unwrap();
        let e1 = a.merge_all(&b).unwrap_err().to_string();
        let e2 = b.merge_all(&a).unwrap_err().to_string();
        assert_eq!(e1, e2);
        assert!(e1.contains("~G_~V_A"), "{e1}");
    }

    #[test]
    fn concrete_kinds_sort_before_wildcards() {
        let set = FieldSpecSet::from_specs([
            fs("", "metadata/name", false),
            FieldSpec::new(Gvk::new("apps", "v1", "Deployment"), "metadata/name", false),
            fs("Service", "metadata/name", false),
        ])
        .unwrap();
        let kinds: Vec<_> = set.iter().map(|s| s.gvk.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Deployment", "Service", ""]);
    }

    #[test]
    fn selecting_filters_by_kind() {
        let set = FieldSpecSet::from_specs([fs("", "metadata/name", false), fs("Service", "spec/selector", true)]).unwrap();
        let dep = Gvk::new("apps", "v1", "Deployment");
        assert_eq!(set.selecting(&dep).count(), 1);
        let svc = Gvk::new("", "v1", "Service");
        assert_eq!(set.selecting(&svc).count(), 2);
    }

    #[test]
    fn deserializes_yaml_shape() {
        let yaml = "- path: metadata/labels\n  create: true\n- kind: Service\n  version: v1\n  path: spec/selector\n  create: true\n";
        let set: FieldSpecSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].gvk, Gvk::new("", "v1", "Service"));
        assert!(set.as_slice()[1].create_if_not_present);

        let dup = "- path: a\n  create: true\n- path: a\n";
        assert!(serde_yaml::from_str::<FieldSpecSet>(dup).is_err());
    }
}
