//! Navigation over object trees (`serde_json::Value`: mapping, sequence or scalar).

use serde_json::{Map, Value};
use tracing::debug;

use crate::{Error, Result};

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Follow mapping keys only; `None` when any segment is absent or not a mapping.
pub fn lookup<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path {
        cur = cur.as_object()?.get(seg.as_ref())?;
    }
    Some(cur)
}

pub fn lookup_str<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a str> {
    lookup(root, path).and_then(Value::as_str)
}

/// Set the value at `path`, creating intermediate mappings.
pub fn set<S: AsRef<str>>(root: &mut Value, path: &[S], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };
    let mut cur = root;
    for seg in parents {
        let map = cur
            .as_object_mut()
            .ok_or_else(|| Error::validation(format!("cannot descend into a non-mapping at '{}'", seg.as_ref())))?;
        cur = map.entry(seg.as_ref().to_string()).or_insert_with(|| Value::Object(Map::new()));
        if cur.is_null() {
            *cur = Value::Object(Map::new());
        }
    }
    match cur {
        Value::Object(map) => {
            map.insert(last.as_ref().to_string(), value);
            Ok(())
        }
        other => Err(Error::validation(format!("cannot set '{}' on a {}", last.as_ref(), type_name(other)))),
    }
}

/// Remove and return the value at `path`, if present.
pub fn remove<S: AsRef<str>>(root: &mut Value, path: &[S]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut cur = root;
    for seg in parents {
        cur = cur.as_object_mut()?.get_mut(seg.as_ref())?;
    }
    cur.as_object_mut()?.remove(last.as_ref())
}

/// Apply `f` to every field reached by `path`.
///
/// Missing segments are created as empty mappings only when `create` is set;
/// otherwise the walk stops silently. A sequence on the way applies the rest
/// of the path to each element, which must be a mapping. A null on the way is
/// skipped. A scalar where a mapping is needed is an error.
pub fn mutate_field<S, F>(node: &mut Value, path: &[S], create: bool, f: &mut F) -> Result<()>
where
    S: AsRef<str>,
    F: FnMut(&mut Value) -> Result<()>,
{
    let Some((first, rest)) = path.split_first() else { return Ok(()) };
    let first = first.as_ref();
    let map = match node {
        Value::Object(map) => map,
        other => {
            return Err(Error::validation(format!("expected a mapping holding '{}', found {}", first, type_name(other))))
        }
    };
    let child = if create {
        map.entry(first.to_string()).or_insert_with(|| Value::Object(Map::new()))
    } else {
        match map.get_mut(first) {
            Some(child) => child,
            None => return Ok(()),
        }
    };
    if rest.is_empty() {
        return f(child);
    }
    if child.is_object() {
        return mutate_field(child, rest, create, f);
    }
    match child {
        Value::Null => {
            debug!(field = %first, "null value ignored in mutation attempt");
            Ok(())
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if !item.is_object() {
                    return Err(Error::validation(format!(
                        "sequence item under '{}' is a {}, expected a mapping",
                        first,
                        type_name(item)
                    )));
                }
                mutate_field(item, rest, create, f)?;
            }
            Ok(())
        }
        other => Err(Error::validation(format!("'{}' is a {}, not expected to be a primitive", first, type_name(other)))),
    }
}
