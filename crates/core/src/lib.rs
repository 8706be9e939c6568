//! Stratum core types: kind selectors, resource ids, field specs and tree navigation.
//!
//! Everything above this crate (config, resources, transforms, plugins) speaks in
//! terms of these types and the typed [`Error`].

#![forbid(unsafe_code)]

pub mod error;
pub mod fieldspec;
pub mod gvk;
pub mod loader;
pub mod tree;
pub mod validator;

pub use error::{Error, Result};
pub use fieldspec::{FieldSpec, FieldSpecSet, PathSegments};
pub use gvk::{Gvk, ResId};
pub use loader::{FsLoader, Loader, MemoryLoader};
pub use validator::{K8sValidator, PermissiveValidator, Validator};

pub mod prelude {
    pub use super::{Error, FieldSpec, FieldSpecSet, Gvk, Loader, ResId, Result, Validator};
}

/// Read a `usize` knob from the environment, falling back to `default`.
pub fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Read a boolean knob from the environment (`1` or `true`, any case).
pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
