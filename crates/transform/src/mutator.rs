//! Field-spec driven mutators: map union, name prefix/suffix, namespace.

use std::collections::BTreeMap;

use serde_json::Value;
use stratum_core::{tree, Error, FieldSpecSet, ResId, Result};
use stratum_resource::ResourceCollection;
use tracing::debug;

use crate::Transform;

/// Kinds whose names are never prefixed or suffixed.
const NAME_CHANGE_EXEMPT_KINDS: &[&str] = &["CustomResourceDefinition"];

fn at_field(e: Error, id: &ResId, path: &str) -> Error {
    match e {
        Error::Validation(m) => Error::validation(format!("{id}: field '{path}': {m}")),
        other => other,
    }
}

/// Run `f` on every field the specs select, resource by resource, with
/// `skip` deciding which resources sit out.
pub fn apply_to_fields<F>(
    c: &mut ResourceCollection,
    specs: &FieldSpecSet,
    skip: impl Fn(&ResId) -> bool,
    mut f: F,
) -> Result<()>
where
    F: FnMut(&mut Value) -> Result<()>,
{
    for r in c.iter_mut() {
        let id = r.current_id();
        if skip(&id) {
            continue;
        }
        for fs in specs.selecting(&id.gvk) {
            let path = fs.path_slice();
            tree::mutate_field(r.body_mut(), path.as_slice(), fs.create_if_not_present, &mut f)
                .map_err(|e| at_field(e, &id, &fs.path))?;
        }
    }
    Ok(())
}

/// Unions a fixed set of pairs into every selected mapping (labels, annotations).
#[derive(Debug, Clone)]
pub struct MapTransformer {
    specs: FieldSpecSet,
    pairs: BTreeMap<String, String>,
}

impl MapTransformer {
    pub fn new(specs: FieldSpecSet, pairs: BTreeMap<String, String>) -> Self {
        Self { specs, pairs }
    }
}

impl Transform for MapTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        if self.pairs.is_empty() {
            return Ok(());
        }
        apply_to_fields(c, &self.specs, |_| false, |v| {
            if v.is_null() {
                *v = Value::Object(Default::default());
            }
            let map = v.as_object_mut().ok_or_else(|| Error::validation("expected a mapping"))?;
            for (k, val) in &self.pairs {
                map.insert(k.clone(), Value::String(val.clone()));
            }
            Ok(())
        })
    }
}

/// Wraps selected string fields (names) in a prefix and suffix.
#[derive(Debug, Clone)]
pub struct PrefixSuffixTransformer {
    prefix: String,
    suffix: String,
    specs: FieldSpecSet,
}

impl PrefixSuffixTransformer {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, specs: FieldSpecSet) -> Self {
        Self { prefix: prefix.into(), suffix: suffix.into(), specs }
    }
}

impl Transform for PrefixSuffixTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return Ok(());
        }
        let exempt = |id: &ResId| NAME_CHANGE_EXEMPT_KINDS.contains(&id.gvk.kind.as_str());
        apply_to_fields(c, &self.specs, exempt, |v| match v {
            Value::String(s) => {
                *s = format!("{}{}{}", self.prefix, s, self.suffix);
                Ok(())
            }
            _ => Err(Error::validation("expected a string")),
        })?;
        debug!(prefix = %self.prefix, suffix = %self.suffix, "names rewritten");
        c.check_unique_ids()
    }
}

/// Moves namespaced objects into one namespace. Cluster-scoped kinds are left alone.
#[derive(Debug, Clone)]
pub struct NamespaceTransformer {
    namespace: String,
    specs: FieldSpecSet,
}

impl NamespaceTransformer {
    pub fn new(namespace: impl Into<String>, specs: FieldSpecSet) -> Self {
        Self { namespace: namespace.into(), specs }
    }
}

impl Transform for NamespaceTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        if self.namespace.is_empty() {
            return Ok(());
        }
        apply_to_fields(c, &self.specs, |id| id.gvk.is_cluster_scoped(), |v| {
            *v = Value::String(self.namespace.clone());
            Ok(())
        })?;
        c.check_unique_ids()
    }
}
