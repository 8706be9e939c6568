//! Rewrites references to renamed objects.
//!
//! After prefixes, suffixes and hashes have been applied, a Deployment that
//! mounts ConfigMap `app-config` must point at `prod-app-config-h2b6k9t8mc`.
//! Each back reference names a target kind and the fields that hold names of
//! objects of that kind.

use metrics::counter;
use serde_json::Value;
use stratum_config::NameBackReferences;
use stratum_core::{tree, Error, Gvk, Result};
use stratum_resource::ResourceCollection;
use tracing::debug;

use crate::Transform;

#[derive(Debug, Clone)]
struct Candidate {
    original_name: String,
    name: String,
    namespace: String,
    renamed: bool,
}

#[derive(Debug, Clone)]
pub struct NameReferenceTransformer {
    back_refs: NameBackReferences,
}

impl NameReferenceTransformer {
    pub fn new(back_refs: NameBackReferences) -> Self {
        Self { back_refs }
    }
}

fn candidates_of_kind(c: &ResourceCollection, target: &Gvk) -> Vec<Candidate> {
    c.iter()
        .filter(|r| r.gvk().is_selected(target))
        .map(|r| Candidate {
            original_name: r.original_id().name.clone(),
            name: r.name().to_string(),
            namespace: r.namespace().to_string(),
            renamed: r.is_renamed(),
        })
        .collect()
}

/// New name for `old`, or `None` when nothing was renamed from it. An
/// object in the referrer's namespace that kept the name `old` counts as a
/// match, so the reference stays pointed at it.
fn resolve<'a>(old: &str, referrer_ns: &str, candidates: &'a [Candidate], target: &Gvk) -> Result<Option<&'a str>> {
    let matches: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.original_name == old && (c.renamed || c.namespace == referrer_ns))
        .collect();
    if !matches.iter().any(|c| c.renamed) {
        return Ok(None);
    }
    let matches = match matches.len() {
        1 => matches,
        _ => matches.into_iter().filter(|c| c.namespace == referrer_ns).collect(),
    };
    match matches.as_slice() {
        [one] if one.renamed => Ok(Some(one.name.as_str())),
        [_] => Ok(None),
        [] => Err(Error::reference(format!(
            "'{old}' matches several renamed {target} objects, none in namespace '{referrer_ns}'"
        ))),
        many => {
            let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
            Err(Error::reference(format!("'{old}' is ambiguous among renamed {target} objects: {}", names.join(", "))))
        }
    }
}

fn rewrite(v: &mut Value, referrer_ns: &str, candidates: &[Candidate], target: &Gvk, hits: &mut u64) -> Result<()> {
    match v {
        Value::String(s) => {
            if let Some(new) = resolve(s, referrer_ns, candidates, target)? {
                *s = new.to_string();
                *hits += 1;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                match item {
                    Value::String(_) => rewrite(item, referrer_ns, candidates, target, hits)?,
                    Value::Null => {}
                    _ => return Err(Error::validation("name reference list must hold strings")),
                }
            }
            Ok(())
        }
        Value::Null => Ok(()),
        _ => Err(Error::validation("name reference must be a string or a list of strings")),
    }
}

impl Transform for NameReferenceTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        let mut hits = 0u64;
        for back_ref in &self.back_refs {
            let candidates = candidates_of_kind(c, &back_ref.gvk);
            if !candidates.iter().any(|c| c.renamed) {
                continue;
            }
            for r in c.iter_mut() {
                let id = r.current_id();
                for fs in back_ref.referrers.selecting(&id.gvk) {
                    let path = fs.path_slice();
                    tree::mutate_field(r.body_mut(), path.as_slice(), false, &mut |v| {
                        rewrite(v, &id.namespace, &candidates, &back_ref.gvk, &mut hits)
                    })
                    .map_err(|e| match e {
                        Error::Validation(m) => Error::validation(format!("{id}: field '{}': {m}", fs.path)),
                        Error::Reference(m) => Error::reference(format!("{id}: field '{}': {m}", fs.path)),
                        other => other,
                    })?;
                }
            }
        }
        debug!(rewritten = hits, "name references");
        counter!("name_references_rewritten", hits);
        Ok(())
    }
}
