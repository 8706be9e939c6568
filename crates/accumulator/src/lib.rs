//! Stratum accumulator: reads kustomization directories and folds bases,
//! resources, generators, patches and transformers into one collection.
//!
//! Bases are accumulated depth-first in declaration order. Renames are fixed
//! up and variables substituted once, over the fully accumulated result.

#![forbid(unsafe_code)]

pub mod accumulator;
pub mod kustomization;
pub mod patch;

pub use accumulator::Accumulator;
pub use kustomization::{Kustomization, Label, FILE_NAMES};
pub use patch::apply_patches;
