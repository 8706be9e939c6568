//! Tree merging: overlay deep merge and strategic merge patch.

use serde_json::Value;

/// Merge `incoming` over `base`. Mappings merge key by key; anything else
/// from `incoming` replaces `base` unless it is null.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (_, Value::Null) => {}
        (Value::Object(b), Value::Object(inc)) => {
            for (k, v) in inc {
                match b.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None if v.is_null() => {}
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (b, other) => *b = other,
    }
}

/// Apply a strategic merge patch. Mappings merge recursively and `null`
/// deletes the key. A sequence whose patch entries are all mappings with a
/// string `name` merges entry by entry on that name: matching entries merge
/// recursively, `$patch: delete` drops one, new ones are appended. Any other
/// value replaces the target.
pub fn strategic_merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Value::Object(t) = target {
                for (k, v) in patch_map {
                    if v.is_null() {
                        t.remove(k);
                    } else {
                        strategic_merge(t.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        Value::Array(entries) if target.is_array() && !entries.is_empty() && entries.iter().all(|e| entry_name(e).is_some()) => {
            if let Value::Array(t) = target {
                merge_named(t, entries);
            }
        }
        other => *target = other.clone(),
    }
}

fn entry_name(v: &Value) -> Option<&str> {
    v.as_object()?.get("name")?.as_str()
}

fn merge_named(target: &mut Vec<Value>, entries: &[Value]) {
    for entry in entries {
        let Some(name) = entry_name(entry) else { continue };
        let pos = target.iter().position(|t| entry_name(t) == Some(name));
        let delete = entry.get("$patch").and_then(Value::as_str) == Some("delete");
        match (pos, delete) {
            (Some(i), true) => {
                target.remove(i);
            }
            (None, true) => {}
            (Some(i), false) => strategic_merge(&mut target[i], entry),
            (None, false) => target.push(entry.clone()),
        }
    }
}
