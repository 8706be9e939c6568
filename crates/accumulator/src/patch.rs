//! Overlay patches applied as strategic merge patches.

use serde_json::Value;
use stratum_core::{tree, Error, Result};
use stratum_resource::merge::strategic_merge;
use stratum_resource::{Resource, ResourceCollection};
use tracing::debug;

/// Index of the one member `patch` targets. The patch names its target by
/// kind, name and (optionally) namespace, matched against current or
/// original identity.
fn target_of(c: &ResourceCollection, patch: &Resource) -> Result<usize> {
    let pid = patch.current_id();
    let hits: Vec<usize> = c
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let cur = r.current_id();
            let orig = r.original_id();
            cur.gvk.is_selected(&pid.gvk)
                && (cur.name == pid.name || orig.name == pid.name)
                && (pid.namespace.is_empty() || cur.namespace == pid.namespace || orig.namespace == pid.namespace)
        })
        .map(|(i, _)| i)
        .collect();
    match hits.as_slice() {
        [i] => Ok(*i),
        [] => Err(Error::reference(format!("patch {pid} matches no resource"))),
        _ => Err(Error::reference(format!("patch {pid} matches {} resources", hits.len()))),
    }
}

/// Apply every patch in order, keeping each target's current name and namespace.
pub fn apply_patches(c: &mut ResourceCollection, patches: &[Resource]) -> Result<()> {
    for patch in patches {
        let idx = target_of(c, patch)?;
        let mut body: Value = patch.body().clone();
        tree::remove(&mut body, &["metadata", "name"]);
        tree::remove(&mut body, &["metadata", "namespace"]);
        let target = &mut c.resources_mut()[idx];
        debug!(patch = %patch.current_id(), target = %target.current_id(), "applying patch");
        let mut merged = target.body().clone();
        strategic_merge(&mut merged, &body);
        target.replace_body(merged);
    }
    c.check_unique_ids()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn res(v: Value) -> Resource {
        Resource::new(v).unwrap()
    }

    #[test]
    fn patch_merges_and_deletes() {
        let mut d = res(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"a": "1", "b": "2"}},
            "spec": {"replicas": 1, "template": {"spec": {"containers": [{"name": "web", "image": "nginx:1"}]}}}
        }));
        d.set_name("prod-web").unwrap();
        let mut c = ResourceCollection::from_resources([d]).unwrap();
        let patches = [res(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"b": null}},
            "spec": {"replicas": 3}
        }))];
        apply_patches(&mut c, &patches).unwrap();

        let body = c.resources()[0].body();
        assert_eq!(body["metadata"]["name"], "prod-web");
        assert_eq!(body["metadata"]["labels"], json!({"a": "1"}));
        assert_eq!(body["spec"]["replicas"], 3);
        assert_eq!(body["spec"]["template"]["spec"]["containers"][0]["image"], "nginx:1");
    }

    #[test]
    fn container_patch_keeps_untouched_containers() {
        let d = res(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"template": {"spec": {"containers": [
                {"name": "web", "image": "nginx:1", "args": ["--port=80"], "envFrom": [{"configMapRef": {"name": "settings"}}]},
                {"name": "sidecar", "image": "envoy:1"}
            ]}}}
        }));
        let mut c = ResourceCollection::from_resources([d]).unwrap();
        let patches = [res(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"template": {"spec": {"containers": [{"name": "web", "image": "nginx:2"}]}}}
        }))];
        apply_patches(&mut c, &patches).unwrap();

        let containers = &c.resources()[0].body()["spec"]["template"]["spec"]["containers"];
        assert_eq!(containers.as_array().map(Vec::len), Some(2));
        assert_eq!(containers[0]["image"], "nginx:2");
        assert_eq!(containers[0]["args"], json!(["--port=80"]));
        assert_eq!(containers[0]["envFrom"][0]["configMapRef"]["name"], "settings");
        assert_eq!(containers[1], json!({"name": "sidecar", "image": "envoy:1"}));
    }

    #[test]
    fn patches_apply_in_order_to_the_matched_member() {
        let mut c = ResourceCollection::from_resources([
            res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}, "data": {"k": "a"}})),
            res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "b"}, "data": {"k": "b"}})),
        ])
        .unwrap();
        let patches = [
            res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "b"}, "data": {"k": "b1"}})),
            res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "b"}, "data": {"k": "b2"}})),
        ];
        apply_patches(&mut c, &patches).unwrap();
        assert_eq!(c.resources()[0].body()["data"]["k"], "a");
        assert_eq!(c.resources()[1].body()["data"]["k"], "b2");
    }

    #[test]
    fn patch_without_target_fails() {
        let mut c = ResourceCollection::from_resources([res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}}))])
            .unwrap();
        let patches = [res(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "other"}}))];
        assert!(apply_patches(&mut c, &patches).unwrap_err().is_reference());
    }
}
