//! Ordered collection of resources with unique current ids.

use metrics::counter;
use rustc_hash::FxHashSet;
use serde_json::Value;
use stratum_core::{Error, Gvk, ResId, Result};
use tracing::debug;

use crate::merge::deep_merge;
use crate::{Behavior, Resource};

/// Insertion order is output order. No two members share a current id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceCollection {
    items: Vec<Resource>,
}

impl ResourceCollection {
    pub fn new() -> Self { Self { items: Vec::new() } }

    /// Build from resources, rejecting duplicate ids.
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Result<Self> {
        let mut out = Self::new();
        for r in resources {
            out.append(r)?;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Resource> { self.items.iter() }
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Resource> { self.items.iter_mut() }
    pub fn resources(&self) -> &[Resource] { &self.items }
    pub fn resources_mut(&mut self) -> &mut [Resource] { &mut self.items }
    pub fn into_resources(self) -> Vec<Resource> { self.items }
    pub fn get(&self, index: usize) -> Option<&Resource> { self.items.get(index) }

    pub fn ids(&self) -> Vec<ResId> {
        self.items.iter().map(Resource::current_id).collect()
    }

    fn position_by_current_id(&self, id: &ResId) -> Option<usize> {
        self.items.iter().position(|r| &r.current_id() == id)
    }

    pub fn get_by_current_id(&self, id: &ResId) -> Option<&Resource> {
        self.position_by_current_id(id).map(|i| &self.items[i])
    }

    pub fn get_by_current_id_mut(&mut self, id: &ResId) -> Option<&mut Resource> {
        let i = self.position_by_current_id(id)?;
        self.items.get_mut(i)
    }

    /// First member whose original id is `id`.
    pub fn get_by_original_id(&self, id: &ResId) -> Option<&Resource> {
        self.items.iter().find(|r| r.original_id() == id)
    }

    /// Add `r` at the end. A member with the same current id is a conflict.
    pub fn append(&mut self, r: Resource) -> Result<()> {
        let id = r.current_id();
        if self.position_by_current_id(&id).is_some() {
            return Err(Error::conflict(format!("may not add resource with an already registered id: {id}")));
        }
        self.items.push(r);
        Ok(())
    }

    /// Members whose gvk is selected by `selector` (empty parts match anything).
    pub fn select_by_kind(&self, selector: &Gvk) -> Vec<&Resource> {
        self.items.iter().filter(|r| r.gvk().is_selected(selector)).collect()
    }

    pub fn remove_by_current_id(&mut self, id: &ResId) -> Option<Resource> {
        let i = self.position_by_current_id(id)?;
        Some(self.items.remove(i))
    }

    /// Members `incoming` collides with. Current ids always count; a merge or
    /// replace also finds a member whose original id is the incoming id, so
    /// an overlay can target an object its base already renamed.
    fn colliding(&self, incoming: &Resource) -> Vec<usize> {
        let cur = incoming.current_id();
        let by_lineage = matches!(incoming.behavior(), Behavior::Merge | Behavior::Replace);
        let mut hits: Vec<usize> =
            self.items.iter().enumerate().filter(|(_, r)| r.current_id() == cur).map(|(i, _)| i).collect();
        if hits.is_empty() && by_lineage {
            hits = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, r)| r.original_id() == &cur || r.original_id() == incoming.original_id())
                .map(|(i, _)| i)
                .collect();
        }
        hits
    }

    /// Fold `other` into this collection, item by item, following each
    /// incoming resource's behavior on an identity collision. On error the
    /// collection is left as it was.
    pub fn absorb_all(&mut self, other: ResourceCollection) -> Result<()> {
        let n = other.len();
        let mut staged = self.clone();
        staged.absorb_each(other)?;
        staged.check_unique_ids()?;
        *self = staged;
        counter!("resources_absorbed", n as u64);
        Ok(())
    }

    fn absorb_each(&mut self, other: ResourceCollection) -> Result<()> {
        for incoming in other.items {
            let hits = self.colliding(&incoming);
            let idx = match hits.as_slice() {
                [] => {
                    self.append(incoming)?;
                    continue;
                }
                [i] => *i,
                _ => {
                    return Err(Error::conflict(format!(
                        "{} matches {} existing resources",
                        incoming.current_id(),
                        hits.len()
                    )))
                }
            };
            let existing = &mut self.items[idx];
            match incoming.behavior() {
                Behavior::Create => {
                    return Err(Error::conflict(format!(
                        "resource {} already exists; use behavior merge or replace",
                        existing.current_id()
                    )))
                }
                Behavior::Unspecified => {
                    return Err(Error::conflict(format!(
                        "resource {} collides with {} and declares no behavior",
                        incoming.current_id(),
                        existing.current_id()
                    )))
                }
                Behavior::Replace => {
                    debug!(id = %existing.current_id(), "replacing resource");
                    let body = keep_identity(existing, incoming.into_body())?;
                    existing.replace_body(body);
                }
                Behavior::Merge => {
                    debug!(id = %existing.current_id(), "merging resource");
                    let needs_hash = existing.needs_hash() || incoming.needs_hash();
                    let mut body = existing.body().clone();
                    deep_merge(&mut body, incoming.into_body());
                    let body = keep_identity(existing, body)?;
                    existing.replace_body(body);
                    existing.set_needs_hash(needs_hash);
                }
            }
        }
        Ok(())
    }

    /// Error on the first current id shared by two members.
    pub fn check_unique_ids(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for r in &self.items {
            let id = r.current_id();
            if !seen.insert(id.clone()) {
                return Err(Error::conflict(format!("duplicate resource id {id}")));
            }
        }
        Ok(())
    }

    /// Multi-document YAML in collection order.
    pub fn as_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (i, r) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            out.push_str(&r.as_yaml()?);
        }
        Ok(out)
    }

    fn sorted_bodies(&self) -> Vec<(ResId, &Value)> {
        let mut v: Vec<_> = self.items.iter().map(|r| (r.current_id(), r.body())).collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    /// Same documents, ignoring order.
    pub fn content_equals(&self, other: &ResourceCollection) -> bool {
        self.sorted_bodies() == other.sorted_bodies()
    }

    /// Like [`Self::content_equals`], describing the first difference.
    pub fn error_if_not_equal(&self, actual: &ResourceCollection) -> Result<()> {
        if self.len() != actual.len() {
            return Err(Error::validation(format!(
                "expected {} resources, got {}: expected {:?}, actual {:?}",
                self.len(),
                actual.len(),
                self.ids(),
                actual.ids()
            )));
        }
        for ((eid, ebody), (aid, abody)) in self.sorted_bodies().into_iter().zip(actual.sorted_bodies()) {
            if eid != aid {
                return Err(Error::validation(format!("expected resource {eid}, found {aid}")));
            }
            if ebody != abody {
                return Err(Error::validation(format!(
                    "resource {eid} differs\nexpected:\n{}\nactual:\n{}",
                    serde_yaml::to_string(ebody)?,
                    serde_yaml::to_string(abody)?
                )));
            }
        }
        Ok(())
    }
}

/// `body` with the existing member's name and namespace.
fn keep_identity(existing: &Resource, mut body: Value) -> Result<Value> {
    let meta = [("name", existing.name()), ("namespace", existing.namespace())];
    for (field, value) in meta {
        if value.is_empty() {
            stratum_core::tree::remove(&mut body, &["metadata", field]);
        } else {
            stratum_core::tree::set(&mut body, &["metadata", field], Value::String(value.to_string()))?;
        }
    }
    Ok(body)
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;
    fn into_iter(self) -> Self::IntoIter { self.items.iter() }
}

impl IntoIterator for ResourceCollection {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;
    fn into_iter(self) -> Self::IntoIter { self.items.into_iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dep(name: &str, ns: Option<&str>) -> Resource {
        let mut body = json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": name}});
        if let Some(ns) = ns {
            body["metadata"]["namespace"] = json!(ns);
        }
        Resource::new(body).unwrap()
    }

    fn cm(name: &str, data: Value, behavior: Behavior) -> Resource {
        let mut r = Resource::new(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name}, "data": data}))
            .unwrap();
        r.set_behavior(behavior);
        r
    }

    #[test]
    fn append_rejects_duplicate_current_id() {
        let mut c = ResourceCollection::new();
        c.append(dep("dply1", None)).unwrap();
        assert!(c.append(dep("dply1", None)).unwrap_err().is_conflict());
        c.append(dep("dply1", Some("test"))).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn namespaced_twins_survive_absorb() {
        let mut base = ResourceCollection::from_resources([dep("dply1", None), dep("dply2", None)]).unwrap();
        let other = ResourceCollection::from_resources([dep("dply2", Some("test"))]).unwrap();
        base.absorb_all(other).unwrap();
        assert_eq!(base.len(), 3);
        let names: Vec<_> = base.ids().iter().map(|id| format!("{}/{}", id.namespace, id.name)).collect();
        assert_eq!(names, vec!["/dply1", "/dply2", "test/dply2"]);
    }

    #[test]
    fn create_or_unspecified_collision_is_conflict() {
        let mut base = ResourceCollection::from_resources([cm("cm", json!({"a": "1"}), Behavior::Create)]).unwrap();
        let again = ResourceCollection::from_resources([cm("cm", json!({}), Behavior::Create)]).unwrap();
        assert!(base.clone().absorb_all(again).unwrap_err().is_conflict());
        let plain = ResourceCollection::from_resources([cm("cm", json!({}), Behavior::Unspecified)]).unwrap();
        assert!(base.absorb_all(plain).unwrap_err().is_conflict());
    }

    #[test]
    fn merge_unions_data_and_keeps_renamed_identity() {
        let mut existing = cm("cm", json!({"a": "1", "b": "2"}), Behavior::Create);
        existing.set_name("base-cm").unwrap();
        existing.set_needs_hash(false);
        let mut base = ResourceCollection::from_resources([existing]).unwrap();
        let mut overlay = cm("cm", json!({"b": "3", "c": "4"}), Behavior::Merge);
        overlay.set_needs_hash(true);
        base.absorb_all(ResourceCollection::from_resources([overlay]).unwrap()).unwrap();

        assert_eq!(base.len(), 1);
        let r = &base.resources()[0];
        assert_eq!(r.name(), "base-cm");
        assert_eq!(r.original_id().name, "cm");
        assert_eq!(r.body()["data"], json!({"a": "1", "b": "3", "c": "4"}));
        assert!(r.needs_hash());
    }

    #[test]
    fn replace_overwrites_body() {
        let mut base = ResourceCollection::from_resources([cm("cm", json!({"a": "1"}), Behavior::Create)]).unwrap();
        let overlay = ResourceCollection::from_resources([cm("cm", json!({"z": "9"}), Behavior::Replace)]).unwrap();
        base.absorb_all(overlay).unwrap();
        assert_eq!(base.resources()[0].body()["data"], json!({"z": "9"}));
    }

    #[test]
    fn failed_absorb_leaves_collection_untouched() {
        let mut base = ResourceCollection::from_resources([
            cm("a", json!({"k": "1"}), Behavior::Create),
            cm("b", json!({"k": "2"}), Behavior::Create),
        ])
        .unwrap();
        let before = base.clone();
        let overlay = ResourceCollection::from_resources([
            cm("a", json!({"k": "merged"}), Behavior::Merge),
            cm("fresh", json!({}), Behavior::Create),
            cm("b", json!({}), Behavior::Create),
        ])
        .unwrap();
        assert!(base.absorb_all(overlay).unwrap_err().is_conflict());
        assert_eq!(base.len(), 2);
        assert_eq!(base, before);
        assert_eq!(base.resources()[0].body()["data"]["k"], "1");
    }

    #[test]
    fn merge_without_target_appends() {
        let mut base = ResourceCollection::new();
        let overlay = ResourceCollection::from_resources([cm("new", json!({}), Behavior::Merge)]).unwrap();
        base.absorb_all(overlay).unwrap();
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn select_remove_and_compare() {
        let mut c = ResourceCollection::from_resources([
            dep("d", None),
            cm("cm", json!({}), Behavior::Unspecified),
        ])
        .unwrap();
        assert_eq!(c.select_by_kind(&Gvk::of_kind("ConfigMap")).len(), 1);
        assert_eq!(c.select_by_kind(&Gvk::new("apps", "", "")).len(), 1);
        assert_eq!(c.select_by_kind(&Gvk::default()).len(), 2);

        let reversed = ResourceCollection::from_resources(c.resources().iter().rev().cloned()).unwrap();
        assert!(c.content_equals(&reversed));
        c.error_if_not_equal(&reversed).unwrap();

        let id = c.resources()[0].current_id();
        assert!(c.remove_by_current_id(&id).is_some());
        assert!(c.remove_by_current_id(&id).is_none());
        assert!(!c.content_equals(&reversed));
        assert!(c.error_if_not_equal(&reversed).is_err());
    }

    #[test]
    fn yaml_output_is_multi_document() {
        let c = ResourceCollection::from_resources([dep("a", None), dep("b", None)]).unwrap();
        let y = c.as_yaml().unwrap();
        assert_eq!(y.matches("---\n").count(), 1);
        assert!(y.contains("name: a") && y.contains("name: b"));
    }
}
