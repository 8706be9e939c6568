use stratum_core::Result;
use stratum_resource::{hash_resource, ResourceCollection};
use tracing::debug;

use crate::Transform;

/// Appends `-<content hash>` to the name of every resource that asks for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashSuffixTransformer;

impl Transform for HashSuffixTransformer {
    fn transform(&self, c: &mut ResourceCollection) -> Result<()> {
        for r in c.iter_mut().filter(|r| r.needs_hash()) {
            let h = hash_resource(r.body())?;
            let name = format!("{}-{}", r.name(), h);
            debug!(from = %r.name(), to = %name, "hash suffix");
            r.set_name(name)?;
        }
        c.check_unique_ids()
    }
}
