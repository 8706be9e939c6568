//! Field-name validation used by generators and label/annotation transformers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

pub trait Validator: Send + Sync {
    fn validate_label(&self, key: &str, value: &str) -> Result<()>;
    fn validate_annotation_key(&self, key: &str) -> Result<()>;
    fn validate_data_key(&self, key: &str) -> Result<()>;
    fn validate_namespace(&self, namespace: &str) -> Result<()>;
}

static NAME_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("name part regex"));
static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("dns subdomain regex")
});
static DNS_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("dns label regex"));
static DATA_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("data key regex"));

fn qualified_name(key: &str) -> Result<()> {
    let (prefix, name) = match key.rsplit_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if let Some(p) = prefix {
        if p.is_empty() || p.len() > 253 || !DNS_SUBDOMAIN.is_match(p) {
            return Err(Error::validation(format!("'{}': prefix must be a DNS subdomain", key)));
        }
    }
    if name.is_empty() || name.len() > 63 || !NAME_PART.is_match(name) {
        return Err(Error::validation(format!(
            "'{}': name part must be 63 alphanumeric characters or less, '-', '_' or '.' inside",
            key
        )));
    }
    Ok(())
}

/// Kubernetes naming rules for label keys/values, annotation keys, data keys
/// and namespaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct K8sValidator;

impl K8sValidator {
    pub fn new() -> Self { Self }
}

impl Validator for K8sValidator {
    fn validate_label(&self, key: &str, value: &str) -> Result<()> {
        qualified_name(key)?;
        if !value.is_empty() && (value.len() > 63 || !NAME_PART.is_match(value)) {
            return Err(Error::validation(format!("label {}: invalid value '{}'", key, value)));
        }
        Ok(())
    }

    fn validate_annotation_key(&self, key: &str) -> Result<()> {
        qualified_name(key)
    }

    fn validate_data_key(&self, key: &str) -> Result<()> {
        if key.len() > 253 || !DATA_KEY.is_match(key) {
            return Err(Error::validation(format!("'{}' is not a valid data key", key)));
        }
        Ok(())
    }

    fn validate_namespace(&self, namespace: &str) -> Result<()> {
        if namespace.len() > 63 || !DNS_LABEL.is_match(namespace) {
            return Err(Error::validation(format!("'{}' is not a valid namespace", namespace)));
        }
        Ok(())
    }
}

/// Accepts everything. Useful when inputs are trusted or already validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator;

impl Validator for PermissiveValidator {
    fn validate_label(&self, _key: &str, _value: &str) -> Result<()> { Ok(()) }
    fn validate_annotation_key(&self, _key: &str) -> Result<()> { Ok(()) }
    fn validate_data_key(&self, _key: &str) -> Result<()> { Ok(()) }
    fn validate_namespace(&self, _namespace: &str) -> Result<()> { Ok(()) }
}
