//! Resource construction from documents and generator arguments.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use stratum_core::{env_usize, Error, Loader, Result, Validator};
use tracing::debug;

use crate::kv::{self, ConfigMapArgs, GeneratorArgs, GeneratorOptions, SecretArgs};
use crate::{Behavior, Resource, ResourceCollection};

const DEFAULT_MAX_YAML_BYTES: usize = 1_000_000;
const DEFAULT_MAX_YAML_NODES: usize = 100_000;
const SECRET_TYPE_OPAQUE: &str = "Opaque";

fn json_node_budget_exceeded(v: &Value, max: usize) -> bool {
    fn walk(v: &Value, cur: &mut usize, max: usize) {
        if *cur >= max { return; }
        *cur += 1;
        match v {
            Value::Object(map) => {
                for vv in map.values() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            Value::Array(arr) => {
                for vv in arr {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

/// Builds resources, checking generated keys and metadata with a validator.
#[derive(Clone)]
pub struct ResourceFactory {
    validator: Arc<dyn Validator>,
    max_bytes: usize,
    max_nodes: usize,
}

impl std::fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("max_bytes", &self.max_bytes)
            .field("max_nodes", &self.max_nodes)
            .finish_non_exhaustive()
    }
}

impl ResourceFactory {
    /// Limits come from `STRATUM_MAX_YAML_BYTES` (default 1 MB) and
    /// `STRATUM_MAX_YAML_NODES` (default 100k).
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self {
            validator,
            max_bytes: env_usize("STRATUM_MAX_YAML_BYTES", DEFAULT_MAX_YAML_BYTES),
            max_nodes: env_usize("STRATUM_MAX_YAML_NODES", DEFAULT_MAX_YAML_NODES),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn validator(&self) -> &Arc<dyn Validator> { &self.validator }

    /// Parse a YAML (or JSON) stream. Empty documents are skipped and
    /// `kind: List` documents contribute their items.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<ResourceCollection> {
        if bytes.len() > self.max_bytes {
            return Err(Error::validation(format!("YAML payload too large (>{} bytes)", self.max_bytes)));
        }
        let text = std::str::from_utf8(bytes).map_err(|e| Error::validation(format!("document is not UTF-8: {e}")))?;
        let mut out = ResourceCollection::new();
        for doc in serde_yaml::Deserializer::from_str(text) {
            let v = Value::deserialize(doc)?;
            if v.is_null() {
                continue;
            }
            if json_node_budget_exceeded(&v, self.max_nodes) {
                return Err(Error::validation(format!("YAML document too complex (>{} nodes)", self.max_nodes)));
            }
            for r in self.from_value(v)? {
                out.append(r)?;
            }
        }
        debug!(resources = out.len(), "documents parsed");
        Ok(out)
    }

    /// Load and parse the file at `path`, naming it in parse errors.
    pub fn from_file(&self, loader: &dyn Loader, path: &str) -> Result<ResourceCollection> {
        let bytes = loader.load(path)?;
        self.from_bytes(&bytes).map_err(|e| match e {
            Error::Validation(m) => Error::validation(format!("{path}: {m}")),
            Error::Yaml(y) => Error::validation(format!("{path}: {y}")),
            other => other,
        })
    }

    fn from_value(&self, v: Value) -> Result<Vec<Resource>> {
        if !v.is_object() {
            return Err(Error::validation("document is not a mapping"));
        }
        if v.get("kind").and_then(Value::as_str) != Some("List") {
            return Ok(vec![Resource::new(v)?]);
        }
        let items = match v.get("items") {
            Some(Value::Array(items)) => items.clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => return Err(Error::validation("List items must be a sequence")),
        };
        items.into_iter().map(|item| self.from_value(item)).collect::<Result<Vec<_>>>().map(|v| v.concat())
    }

    pub fn from_configmap_args(
        &self,
        loader: &dyn Loader,
        options: &GeneratorOptions,
        args: &ConfigMapArgs,
    ) -> Result<Resource> {
        let pairs = kv::load_pairs(loader, self.validator.as_ref(), args)?;
        let mut data = Map::new();
        let mut binary = Map::new();
        for p in pairs {
            match String::from_utf8(p.value) {
                Ok(s) => data.insert(p.key, Value::String(s)),
                Err(e) => binary.insert(p.key, Value::String(B64.encode(e.into_bytes()))),
            };
        }
        let mut body = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": self.metadata(args)?});
        if !data.is_empty() {
            body["data"] = Value::Object(data);
        }
        if !binary.is_empty() {
            body["binaryData"] = Value::Object(binary);
        }
        self.generated(body, options, args)
    }

    pub fn from_secret_args(&self, loader: &dyn Loader, options: &GeneratorOptions, args: &SecretArgs) -> Result<Resource> {
        let pairs = kv::load_pairs(loader, self.validator.as_ref(), &args.generator)?;
        let data: Map<String, Value> = pairs.into_iter().map(|p| (p.key, Value::String(B64.encode(p.value)))).collect();
        let secret_type = if args.secret_type.is_empty() { SECRET_TYPE_OPAQUE } else { args.secret_type.as_str() };
        let mut body = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": self.metadata(&args.generator)?,
            "type": secret_type,
        });
        if !data.is_empty() {
            body["data"] = Value::Object(data);
        }
        self.generated(body, options, &args.generator)
    }

    fn metadata(&self, args: &GeneratorArgs) -> Result<Value> {
        if args.name.is_empty() {
            return Err(Error::validation("generator needs a name"));
        }
        let mut meta = json!({"name": args.name});
        if !args.namespace.is_empty() {
            self.validator.validate_namespace(&args.namespace)?;
            meta["namespace"] = json!(args.namespace);
        }
        Ok(meta)
    }

    /// Stamp options and behavior on a freshly generated object.
    fn generated(&self, body: Value, global: &GeneratorOptions, args: &GeneratorArgs) -> Result<Resource> {
        let opts = global.overlaid_with(args.options.as_ref());
        let mut r = Resource::new(body)?;
        for (k, v) in &opts.labels {
            self.validator.validate_label(k, v)?;
        }
        for k in opts.annotations.keys() {
            self.validator.validate_annotation_key(k)?;
        }
        if !opts.labels.is_empty() {
            r.merge_metadata_map("labels", &opts.labels)?;
        }
        if !opts.annotations.is_empty() {
            r.merge_metadata_map("annotations", &opts.annotations)?;
        }
        let behavior = if args.behavior.is_empty() { Behavior::Create } else { args.behavior.parse()? };
        r.set_behavior(behavior);
        r.set_needs_hash(!opts.disable_name_suffix_hash);
        Ok(r)
    }
}
