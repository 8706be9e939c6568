//! Derive a [`TransformerConfig`] from OpenAPI definitions carrying
//! `x-kubernetes-*` markers.
//!
//! Input is a map of type name to definition, JSON or YAML:
//!
//! ```yaml
//! example.com/v1.MyKind:
//!   Schema:
//!     properties:
//!       apiVersion: {type: string}
//!       kind: {type: string}
//!       metadata: {type: object}
//!       spec: {$ref: example.com/v1.MyKindSpec}
//! ```

use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use stratum_core::{Error, FieldSpec, FieldSpecSet, Gvk, Loader, PathSegments, Result};
use tracing::debug;

use crate::{NameBackReference, TransformerConfig};

const X_ANNOTATION: &str = "x-kubernetes-annotation";
const X_LABEL_SELECTOR: &str = "x-kubernetes-label-selector";
const X_IDENTITY: &str = "x-kubernetes-identity";
const X_REF_VERSION: &str = "x-kubernetes-object-ref-api-version";
const X_REF_KIND: &str = "x-kubernetes-object-ref-kind";
const X_REF_NAME_KEY: &str = "x-kubernetes-object-ref-name-key";

type Definitions = Map<String, Value>;

/// Load every definitions file in `paths` and merge the configs they imply.
pub fn load_config_from_crds(loader: &dyn Loader, paths: &[String]) -> Result<TransformerConfig> {
    let mut out = TransformerConfig::empty();
    for path in paths {
        let content = loader.load(path)?;
        let defs = parse_definitions(&content)
            .map_err(|e| Error::validation(format!("unable to parse open API definition from '{path}': {e}")))?;
        let cfg = config_from_definitions(&defs)?;
        out = out.merge(&cfg)?;
        debug!(path = %path, types = defs.len(), "crd definitions ingested");
    }
    Ok(out)
}

fn parse_definitions(content: &[u8]) -> Result<Definitions> {
    let trimmed = content.iter().position(|b| !b.is_ascii_whitespace()).map_or(&content[..0], |i| &content[i..]);
    let v: Value = if trimmed.first() == Some(&b'{') {
        serde_json::from_slice(trimmed)?
    } else {
        serde_yaml::from_slice(content)?
    };
    match v {
        Value::Object(m) => Ok(m),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::validation("expected a mapping of type name to definition")),
    }
}

fn properties<'a>(defs: &'a Definitions, type_name: &str) -> Option<&'a Map<String, Value>> {
    defs.get(type_name)?.get("Schema")?.get("properties")?.as_object()
}

fn looks_like_k8s_type(props: &Map<String, Value>) -> bool {
    ["kind", "apiVersion", "metadata"].iter().all(|k| props.contains_key(*k))
}

/// `example.com/v1.MyKind` → kind `MyKind`.
fn gvk_from_type_name(name: &str) -> Gvk {
    Gvk::of_kind(name.rsplit('.').next().unwrap_or(name))
}

fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments.iter().map(|s| s.as_ref().replace('/', "\\/")).collect::<Vec<_>>().join("/")
}

fn marker<'a>(schema: &'a Value, key: &str, prop: &str) -> Result<Option<&'a str>> {
    match schema.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(Error::validation(format!("marker {key} on property '{prop}' must be a string"))),
    }
}

fn config_from_definitions(defs: &Definitions) -> Result<TransformerConfig> {
    let mut out = TransformerConfig::empty();
    for name in defs.keys() {
        match properties(defs, name) {
            Some(props) if looks_like_k8s_type(props) => {}
            _ => {
                debug!(type_name = %name, "not an object type, skipped");
                continue;
            }
        }
        let mut cfg = TransformerConfig::empty();
        let mut walker = Walker { defs, gvk: gvk_from_type_name(name), path: PathSegments::new(), visiting: FxHashSet::default() };
        walker.walk(&mut cfg, name)?;
        out = out.merge(&cfg)?;
    }
    Ok(out)
}

struct Walker<'a> {
    defs: &'a Definitions,
    gvk: Gvk,
    path: PathSegments,
    /// Type names on the current recursion path.
    visiting: FxHashSet<String>,
}

impl Walker<'_> {
    fn field_spec(&self, extra: Option<&str>) -> FieldSpec {
        let path = match extra {
            Some(key) => {
                let mut p = self.path.clone();
                p.push(key.to_string());
                join_path(p.as_slice())
            }
            None => join_path(self.path.as_slice()),
        };
        FieldSpec::new(self.gvk.clone(), path, false)
    }

    fn walk(&mut self, cfg: &mut TransformerConfig, type_name: &str) -> Result<()> {
        if !self.visiting.insert(type_name.to_string()) {
            debug!(type_name = %type_name, "schema cycle, not descending again");
            return Ok(());
        }
        let defs = self.defs;
        let Some(props) = properties(defs, type_name) else {
            self.visiting.remove(type_name);
            return Ok(());
        };
        for (prop, schema) in props {
            self.path.push(prop.clone());
            let res = self.visit_property(cfg, type_name, prop, schema);
            self.path.pop();
            res?;
        }
        self.visiting.remove(type_name);
        Ok(())
    }

    fn visit_property(&mut self, cfg: &mut TransformerConfig, owner: &str, prop: &str, schema: &Value) -> Result<()> {
        if marker(schema, X_ANNOTATION, prop)?.is_some() {
            cfg.add_annotation_field_spec(self.field_spec(None))?;
        }
        if marker(schema, X_LABEL_SELECTOR, prop)?.is_some() {
            cfg.add_label_field_spec(self.field_spec(None))?;
        }
        if marker(schema, X_IDENTITY, prop)?.is_some() {
            cfg.add_identity_field_spec(self.field_spec(None))?;
        }
        if let (Some(version), Some(kind)) = (marker(schema, X_REF_VERSION, prop)?, marker(schema, X_REF_KIND, prop)?) {
            let name_key = marker(schema, X_REF_NAME_KEY, prop)?.unwrap_or("name");
            let referrers = FieldSpecSet::from_specs([self.field_spec(Some(name_key))])?;
            cfg.add_name_reference(NameBackReference::new(Gvk::new("", version, kind), referrers))?;
        }
        if let Some(r) = schema.get("$ref").and_then(Value::as_str) {
            let target = r.strip_prefix("#/definitions/").unwrap_or(r);
            if !self.defs.contains_key(target) {
                return Err(Error::validation(format!(
                    "property '{prop}' of '{owner}' refers to unknown type '{target}'"
                )));
            }
            self.walk(cfg, target)?;
        }
        Ok(())
    }
}
