//! Generator options carried as annotations across the plugin boundary.
//!
//! Generators (in-process or exec) mark each output object with its behavior
//! and whether it wants a content hash suffix; the annotations are read back
//! into resource fields and stripped before the object joins a collection.

use serde_json::Value;
use stratum_core::{Error, Result};
use stratum_resource::{Behavior, Resource, ResourceCollection};

pub const BEHAVIOR_ANNOTATION: &str = "config.stratum.dev/behavior";
pub const NEEDS_HASH_ANNOTATION: &str = "config.stratum.dev/needs-hash";

fn annotation_str(r: &Resource, key: &str, v: Option<Value>) -> Result<Option<String>> {
    match v {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(Error::validation(format!("{}: annotation {key} must be a string, got {other}", r.current_id()))),
    }
}

/// Write `r`'s behavior and hash flag as annotations.
pub fn mark_resource_options(r: &mut Resource) -> Result<()> {
    let behavior = match r.behavior() {
        Behavior::Unspecified => Behavior::Create,
        b => b,
    };
    r.set_annotation(BEHAVIOR_ANNOTATION, behavior.as_str())?;
    let hash = if r.needs_hash() { "true" } else { "false" };
    r.set_annotation(NEEDS_HASH_ANNOTATION, hash)
}

/// Read and strip the option annotations of every resource. Absent values
/// default to behavior `create` and a hash suffix.
pub fn update_resource_options(c: &mut ResourceCollection) -> Result<()> {
    for r in c.iter_mut() {
        let behavior = r.remove_annotation(BEHAVIOR_ANNOTATION);
        let behavior = match annotation_str(r, BEHAVIOR_ANNOTATION, behavior)? {
            None => Behavior::Create,
            Some(s) => s.parse().map_err(|e| match e {
                Error::Validation(m) => Error::validation(format!("{}: {m}", r.current_id())),
                other => other,
            })?,
        };
        let hash = r.remove_annotation(NEEDS_HASH_ANNOTATION);
        let needs_hash = match annotation_str(r, NEEDS_HASH_ANNOTATION, hash)?.as_deref() {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(Error::validation(format!(
                    "{}: annotation {NEEDS_HASH_ANNOTATION} must be \"true\" or \"false\", got {other:?}",
                    r.current_id()
                )))
            }
        };
        r.set_behavior(behavior);
        r.set_needs_hash(needs_hash);
    }
    Ok(())
}
