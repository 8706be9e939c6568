//! Name back references: which fields of which kinds hold the name of a target kind.

use std::cmp::Reverse;

use serde::{Deserialize, Deserializer, Serialize};
use stratum_core::{FieldSpecSet, Gvk, Result};

/// A target kind plus the field specs that refer to objects of that kind by name.
///
/// ```yaml
/// kind: ConfigMap
/// version: v1
/// fieldSpecs:
/// - path: spec/volumes/configMap/name
///   kind: Pod
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameBackReference {
    #[serde(flatten)]
    pub gvk: Gvk,
    #[serde(default, rename = "fieldSpecs", skip_serializing_if = "FieldSpecSet::is_empty")]
    pub referrers: FieldSpecSet,
}

impl NameBackReference {
    pub fn new(gvk: Gvk, referrers: FieldSpecSet) -> Self {
        Self { gvk, referrers }
    }
}

/// Back references keyed by target gvk, at most one entry per target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NameBackReferences(Vec<NameBackReference>);

impl NameBackReferences {
    pub fn new() -> Self { Self(Vec::new()) }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, NameBackReference> { self.0.iter() }

    pub fn get(&self, target: &Gvk) -> Option<&NameBackReference> {
        self.0.iter().find(|r| &r.gvk == target)
    }

    /// Merge `x` into the entry with the same target, or insert it.
    pub fn merge_one(&mut self, x: NameBackReference) -> Result<()> {
        if let Some(existing) = self.0.iter_mut().find(|r| r.gvk == x.gvk) {
            existing.referrers = existing.referrers.merge_all(&x.referrers)?;
            return Ok(());
        }
        let key = |r: &NameBackReference| (Reverse(r.gvk.specificity()), r.gvk.clone());
        let pos = self.0.partition_point(|r| key(r) <= key(&x));
        self.0.insert(pos, x);
        Ok(())
    }

    pub fn merge_all(&self, incoming: &NameBackReferences) -> Result<NameBackReferences> {
        let mut out = self.clone();
        for x in incoming.iter() {
            out.merge_one(x.clone())?;
        }
        Ok(out)
    }
}

impl<'a> IntoIterator for &'a NameBackReferences {
    type Item = &'a NameBackReference;
    type IntoIter = std::slice::Iter<'a, NameBackReference>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl<'de> Deserialize<'de> for NameBackReferences {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let refs = Option::<Vec<NameBackReference>>::deserialize(d)?.unwrap_or_default();
        let mut out = NameBackReferences::new();
        for r in refs {
            out.merge_one(r).map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}
