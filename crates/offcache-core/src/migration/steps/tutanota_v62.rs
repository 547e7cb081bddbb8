use crate::cache::CacheStore;
use crate::error::Result;
use crate::migration::OfflineMigration;

/// No cached type changed shape in tutanota v62.
pub struct TutanotaV62;

impl OfflineMigration for TutanotaV62 {
    fn app(&self) -> &str {
        "tutanota"
    }

    fn version(&self) -> u32 {
        62
    }

    fn migrate(&self, _store: &mut CacheStore) -> Result<()> {
        Ok(())
    }
}
