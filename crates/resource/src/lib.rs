//! Stratum resources: object trees that remember the identity they were
//! created with, the ordered collection they live in, and how they are built.

#![forbid(unsafe_code)]

pub mod collection;
pub mod factory;
pub mod hash;
pub mod kv;
pub mod merge;
pub mod resource;

pub use collection::ResourceCollection;
pub use factory::ResourceFactory;
pub use hash::hash_resource;
pub use kv::{ConfigMapArgs, GeneratorArgs, GeneratorOptions, SecretArgs};
pub use resource::{Behavior, Resource};
