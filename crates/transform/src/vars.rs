//! `$(NAME)` substitution from values read off other objects.

use std::collections::BTreeMap;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_core::{Error, FieldSpecSet, Gvk, Result};
use stratum_resource::{Resource, ResourceCollection};
use tracing::{debug, warn};

use crate::{apply_to_fields, Transform};

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\(([A-Za-z0-9_.\-]+)\)").expect("var pattern"));

fn default_fieldpath() -> String {
    "metadata.name".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarObjRef {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(default = "default_fieldpath")]
    pub fieldpath: String,
}

impl Default for FieldRef {
    fn default() -> Self {
        Self { fieldpath: default_fieldpath() }
    }
}

/// A named value taken from a field of one object in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    pub objref: VarObjRef,
    #[serde(default)]
    pub fieldref: FieldRef,
}

impl Var {
    fn target(&self) -> Gvk {
        Gvk::from_api_version(&self.objref.api_version, &self.objref.kind)
    }

    /// Objects are matched by the name they were created with, so a var
    /// over a prefixed or hashed object yields its final name.
    fn resolve(&self, c: &ResourceCollection) -> Result<String> {
        let target = self.target();
        let hits: Vec<&Resource> = c
            .iter()
            .filter(|r| {
                let orig = r.original_id();
                r.gvk().is_selected(&target)
                    && orig.name == self.objref.name
                    && (self.objref.namespace.is_empty() || orig.namespace == self.objref.namespace)
            })
            .collect();
        let r = match hits.as_slice() {
            [one] => *one,
            [] => return Err(Error::reference(format!("var '{}': no {} named '{}'", self.name, target, self.objref.name))),
            _ => {
                return Err(Error::reference(format!(
                    "var '{}': {} objects match {} '{}'",
                    self.name,
                    hits.len(),
                    target,
                    self.objref.name
                )))
            }
        };
        let v = extract_path(r.body(), &self.fieldref.fieldpath).ok_or_else(|| {
            Error::reference(format!("var '{}': field '{}' not found on {}", self.name, self.fieldref.fieldpath, r.current_id()))
        })?;
        match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(Error::validation(format!(
                "var '{}': field '{}' is not a scalar",
                self.name, self.fieldref.fieldpath
            ))),
        }
    }
}

/// Dotted path with an optional `[index]` per segment, e.g.
/// `spec.template.spec.containers[0].image`.
fn extract_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('.') {
        if seg.is_empty() {
            return None;
        }
        let (key, idx) = match seg.find('[') {
            Some(brk) => {
                let end = seg.get(brk + 1..)?.find(']')? + brk + 1;
                (&seg[..brk], Some(seg[brk + 1..end].parse::<usize>().ok()?))
            }
            None => (seg, None),
        };
        cur = cur.as_object()?.get(key)?;
        if let Some(i) = idx {
            cur = cur.as_array()?.get(i)?;
        }
    }
    Some(cur)
}

fn substitute(s: &mut String, values: &BTreeMap<String, String>, used: &mut FxHashSet<String>) {
    if !s.contains("$(") {
        return;
    }
    let out = VAR_RE
        .replace_all(s, |caps: &Captures| match values.get(&caps[1]) {
            Some(v) => {
                used.insert(caps[1].to_string());
                v.clone()
            }
            None => caps[0].to_string(),
        })
        .into_owned();
    *s = out;
}

#[derive(Debug, Clone)]
pub struct VarTransformer {
    vars: Vec<Var>,
    specs: FieldSpecSet,
}

impl VarTransformer {
    pub fn new(vars: Vec<Var>, specs: FieldSpecSet) -> Result<Self> {
        let mut seen = FxHashSet::default();
        for v in &vars {
            if !seen.insert(v.name.as_str()) {
                return Err(Error::conflict(format!("var '{}' declared more than once", v.name)));
            }
        }
        Ok(Self { vars, specs })
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Resolve every var against `c`.
    pub fn values(&self, c: &ResourceCollection) -> Result<BTreeMap<String, String>> {
        self.vars.iter().map(|v| Ok((v.name.clone(), v.resolve(c)?))).collect()
    }
}

impl Transform for VarTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        if self.vars.is_empty() {
            return Ok(());
        }
        let values = self.values(c)?;
        let mut used = FxHashSet::default();
        apply_to_fields(c, &self.specs, |_| false, |v| {
            match v {
                Value::String(s) => substitute(s, &values, &mut used),
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        if let Value::String(s) = item {
                            substitute(s, &values, &mut used);
                        }
                    }
                }
                Value::Object(map) => {
                    for item in map.values_mut() {
                        if let Value::String(s) = item {
                            substitute(s, &values, &mut used);
                        }
                    }
                }
                _ => {}
            }
            Ok(())
        })?;
        for name in values.keys().filter(|n| !used.contains(n.as_str())) {
            warn!(var = %name, "var declared but never referenced");
        }
        debug!(vars = values.len(), used = used.len(), "vars substituted");
        counter!("vars_substituted", used.len() as u64);
        Ok(())
    }
}
