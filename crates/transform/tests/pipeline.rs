#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde_json::json;
use stratum_config::TransformerConfig;
use stratum_resource::{Resource, ResourceCollection};
use stratum_transform::{
    HashSuffixTransformer, MapTransformer, NameReferenceTransformer, PrefixSuffixTransformer, Transform, Var,
    VarTransformer,
};

fn deployment() -> Resource {
    Resource::new(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "web"},
        "spec": {
            "selector": {"matchLabels": {"app": "web"}},
            "template": {
                "metadata": {"labels": {"app": "web"}},
                "spec": {
                    "containers": [{
                        "name": "web",
                        "image": "nginx",
                        "args": ["--upstream=$(API_SVC)"],
                        "envFrom": [{"configMapRef": {"name": "settings"}}]
                    }],
                    "volumes": [
                        {"name": "cfg", "configMap": {"name": "settings"}},
                        {"name": "other", "configMap": {"name": "unrelated"}}
                    ]
                }
            }
        }
    }))
    .unwrap()
}

fn settings() -> Resource {
    let mut r = Resource::new(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings"},
        "data": {"a": "x", "b": "y"}
    }))
    .unwrap();
    r.set_needs_hash(true);
    r
}

fn service() -> Resource {
    Resource::new(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": "api"},
        "spec": {"selector": {"app": "api"}}
    }))
    .unwrap()
}

fn run(c: &mut ResourceCollection, cfg: &TransformerConfig, prefix: &str) {
    let stages: Vec<Box<dyn Transform>> = vec![
        Box::new(PrefixSuffixTransformer::new(prefix, "", cfg.name_prefix.clone())),
        Box::new(HashSuffixTransformer),
        Box::new(NameReferenceTransformer::new(cfg.name_reference.clone())),
    ];
    stages.transform(c).unwrap();
}

#[test]
fn prefix_and_hash_propagate_into_deployment_references() {
    let cfg = TransformerConfig::defaults().unwrap();
    let mut c = ResourceCollection::from_resources([settings(), deployment()]).unwrap();
    run(&mut c, &cfg, "prod-");

    let cm = &c.resources()[0];
    assert!(cm.name().starts_with("prod-settings-"), "{}", cm.name());
    assert_eq!(cm.original_id().name, "settings");

    let spec = &c.resources()[1].body()["spec"]["template"]["spec"];
    assert_eq!(spec["volumes"][0]["configMap"]["name"], cm.name());
    assert_eq!(spec["volumes"][1]["configMap"]["name"], "unrelated");
    assert_eq!(spec["containers"][0]["envFrom"][0]["configMapRef"]["name"], cm.name());
    assert_eq!(c.resources()[1].name(), "prod-web");
}

#[test]
fn hash_depends_on_content() {
    let cfg = TransformerConfig::defaults().unwrap();
    let mut a = ResourceCollection::from_resources([settings()]).unwrap();
    run(&mut a, &cfg, "");

    let mut changed = settings();
    changed.body_mut()["data"]["b"] = json!("z");
    let mut b = ResourceCollection::from_resources([changed]).unwrap();
    run(&mut b, &cfg, "");

    assert_ne!(a.resources()[0].name(), b.resources()[0].name());
}

#[test]
fn common_labels_reach_selectors_and_templates() {
    let cfg = TransformerConfig::defaults().unwrap();
    let mut c = ResourceCollection::from_resources([deployment(), service()]).unwrap();
    let pairs = BTreeMap::from([("team".to_string(), "edge".to_string())]);
    MapTransformer::new(cfg.common_labels.clone(), pairs).transform(&mut c).unwrap();

    let d = c.resources()[0].body();
    assert_eq!(d["metadata"]["labels"]["team"], "edge");
    assert_eq!(d["spec"]["selector"]["matchLabels"], json!({"app": "web", "team": "edge"}));
    assert_eq!(d["spec"]["template"]["metadata"]["labels"]["team"], "edge");
    assert_eq!(c.resources()[1].body()["spec"]["selector"], json!({"app": "api", "team": "edge"}));
}

#[test]
fn vars_see_final_names() {
    let cfg = TransformerConfig::defaults().unwrap();
    let mut c = ResourceCollection::from_resources([service(), deployment()]).unwrap();
    run(&mut c, &cfg, "prod-");

    let vars: Vec<Var> =
        serde_yaml::from_str("- name: API_SVC\n  objref: {apiVersion: v1, kind: Service, name: api}\n").unwrap();
    VarTransformer::new(vars, cfg.var_reference.clone()).unwrap().transform(&mut c).unwrap();

    let args = &c.resources()[1].body()["spec"]["template"]["spec"]["containers"][0]["args"];
    assert_eq!(args, &json!(["--upstream=prod-api"]));
}

#[test]
fn name_reference_ambiguity_fails() {
    let cfg = TransformerConfig::defaults().unwrap();
    let mut in_a = settings();
    in_a.set_namespace("a").unwrap();
    let mut in_b = settings();
    in_b.set_namespace("b").unwrap();
    let mut c = ResourceCollection::from_resources([in_a, in_b, deployment()]).unwrap();

    PrefixSuffixTransformer::new("p-", "", cfg.name_prefix.clone()).transform(&mut c).unwrap();
    let err = NameReferenceTransformer::new(cfg.name_reference.clone()).transform(&mut c).unwrap_err();
    assert!(err.is_reference(), "{err}");
}
