//! A single object tree with identity bookkeeping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stratum_core::{tree, Error, Gvk, ResId, Result};

/// How a resource combines with an existing one of the same identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    #[default]
    Unspecified,
    Create,
    Replace,
    Merge,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Unspecified => "unspecified",
            Behavior::Create => "create",
            Behavior::Replace => "replace",
            Behavior::Merge => "merge",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Behavior {
    type Err = Error;

    /// Only the lowercase tokens `create`, `replace` and `merge` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Behavior::Create),
            "replace" => Ok(Behavior::Replace),
            "merge" => Ok(Behavior::Merge),
            other => Err(Error::validation(format!("invalid behavior '{other}', expected create, replace or merge"))),
        }
    }
}

/// An object plus the identity it had when it entered the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    body: Value,
    original_id: ResId,
    behavior: Behavior,
    needs_hash: bool,
}

impl Resource {
    /// Wrap an object tree. It must carry `kind` and `metadata.name`.
    pub fn new(body: Value) -> Result<Self> {
        let original_id = ResId::from_value(&body)?;
        Ok(Self { body, original_id, behavior: Behavior::Unspecified, needs_hash: false })
    }

    pub fn body(&self) -> &Value { &self.body }
    pub fn body_mut(&mut self) -> &mut Value { &mut self.body }
    pub fn into_body(self) -> Value { self.body }

    /// Swap the object tree, keeping lineage and options.
    pub fn replace_body(&mut self, body: Value) { self.body = body; }

    pub fn original_id(&self) -> &ResId { &self.original_id }

    /// Identity as the object reads now.
    pub fn current_id(&self) -> ResId {
        let s = |path: &[&str]| tree::lookup_str(&self.body, path).unwrap_or("").to_string();
        ResId::new(
            Gvk::from_api_version(&s(&["apiVersion"]), &s(&["kind"])),
            s(&["metadata", "namespace"]),
            s(&["metadata", "name"]),
        )
    }

    pub fn gvk(&self) -> Gvk {
        let api_version = tree::lookup_str(&self.body, &["apiVersion"]).unwrap_or("");
        Gvk::from_api_version(api_version, tree::lookup_str(&self.body, &["kind"]).unwrap_or(""))
    }

    pub fn name(&self) -> &str { tree::lookup_str(&self.body, &["metadata", "name"]).unwrap_or("") }
    pub fn namespace(&self) -> &str { tree::lookup_str(&self.body, &["metadata", "namespace"]).unwrap_or("") }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        tree::set(&mut self.body, &["metadata", "name"], Value::String(name.into()))
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        tree::set(&mut self.body, &["metadata", "namespace"], Value::String(namespace.into()))
    }

    /// True once a stage has renamed the object.
    pub fn is_renamed(&self) -> bool { self.name() != self.original_id.name }

    pub fn behavior(&self) -> Behavior { self.behavior }
    pub fn set_behavior(&mut self, behavior: Behavior) { self.behavior = behavior; }

    pub fn needs_hash(&self) -> bool { self.needs_hash }
    pub fn set_needs_hash(&mut self, needs_hash: bool) { self.needs_hash = needs_hash; }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        tree::lookup(&self.body, &["metadata", "annotations"])?.get(key)?.as_str()
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        let meta = self.meta_map_mut("annotations")?;
        meta.insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    /// Remove an annotation; drops the annotations mapping when it becomes empty.
    pub fn remove_annotation(&mut self, key: &str) -> Option<Value> {
        let annotations = tree::lookup(&self.body, &["metadata", "annotations"])?;
        annotations.get(key)?;
        let removed = tree::remove(&mut self.body, &["metadata", "annotations", key]);
        let now_empty = tree::lookup(&self.body, &["metadata", "annotations"])
            .and_then(Value::as_object)
            .map_or(false, Map::is_empty);
        if now_empty {
            tree::remove(&mut self.body, &["metadata", "annotations"]);
        }
        removed
    }

    pub fn labels(&self) -> Option<&Map<String, Value>> {
        tree::lookup(&self.body, &["metadata", "labels"])?.as_object()
    }

    /// Union `pairs` into `metadata.<field>`, creating it when missing.
    pub fn merge_metadata_map<'a>(
        &mut self,
        field: &str,
        pairs: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<()> {
        let map = self.meta_map_mut(field)?;
        for (k, v) in pairs {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        Ok(())
    }

    fn meta_map_mut(&mut self, field: &str) -> Result<&mut Map<String, Value>> {
        let root = self
            .body
            .as_object_mut()
            .ok_or_else(|| Error::validation("resource body is not a mapping"))?;
        let meta = root.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
        if meta.is_null() {
            *meta = Value::Object(Map::new());
        }
        let meta = meta
            .as_object_mut()
            .ok_or_else(|| Error::validation("metadata is not a mapping"))?;
        let m = meta.entry(field.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if m.is_null() {
            *m = Value::Object(Map::new());
        }
        m.as_object_mut()
            .ok_or_else(|| Error::validation(format!("metadata.{field} is not a mapping")))
    }

    pub fn as_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.body)?)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.current_id())?;
        if self.is_renamed() {
            write!(f, " (was {})", self.original_id.name)?;
        }
        Ok(())
    }
}
