//! Stratum transform stages.
//!
//! Each stage mutates a [`ResourceCollection`] in place and is fail-fast:
//! the first error aborts the stage and the collection must be discarded.

#![forbid(unsafe_code)]

use stratum_core::Result;
use stratum_resource::ResourceCollection;

pub mod hashsuffix;
pub mod mutator;
pub mod namereference;
pub mod vars;

pub use hashsuffix::HashSuffixTransformer;
pub use mutator::{apply_to_fields, MapTransformer, NamespaceTransformer, PrefixSuffixTransformer};
pub use namereference::NameReferenceTransformer;
pub use vars::{FieldRef, Var, VarObjRef, VarTransformer};

/// One in-place stage over a collection.
pub trait Transform {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()>;
}

/// Runs stages in order, stopping at the first failure.
impl Transform for [Box<dyn Transform>] {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        self.iter().try_for_each(|t| t.transform(c))
    }
}
