use crate::cache::CacheStore;
use crate::error::Result;
use crate::migration::OfflineMigration;

/// sys v96 changed nothing the cache stores; recording the version is enough.
pub struct SysV96;

impl OfflineMigration for SysV96 {
    fn app(&self) -> &str {
        "sys"
    }

    fn version(&self) -> u32 {
        96
    }

    fn migrate(&self, _store: &mut CacheStore) -> Result<()> {
        Ok(())
    }
}
