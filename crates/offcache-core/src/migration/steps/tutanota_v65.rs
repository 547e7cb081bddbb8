use tracing::debug;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::migration::standard::{delete_instances_of_type, migrate_all_elements};
use crate::migration::OfflineMigration;

pub const FILE_DATA: &str = "tutanota/FileData";
pub const CALENDAR_GROUP_ROOT: &str = "tutanota/CalendarGroupRoot";

/// FileData was removed from the model. Cached instances are dropped and
/// calendar group roots are rewritten so every payload is re-validated.
pub struct TutanotaV65;

impl OfflineMigration for TutanotaV65 {
    fn app(&self) -> &str {
        "tutanota"
    }

    fn version(&self) -> u32 {
        65
    }

    fn migrate(&self, store: &mut CacheStore) -> Result<()> {
        let dropped = delete_instances_of_type(store, FILE_DATA)?;
        debug!(dropped, "removed cached FileData");
        migrate_all_elements(store, CALENDAR_GROUP_ROOT, &[])?;
        Ok(())
    }
}
