//! Built-in migration steps, one file per `(app, version)`.
//!
//! Adding a step: create `<app>_v<version>.rs`, list it in
//! [`registered_migrations`] and add the version to the current manifest.
//! The completeness test fails until both sides agree.

mod sys_v79;
mod sys_v96;
mod tutanota_v62;
mod tutanota_v65;

use super::OfflineMigration;

pub use sys_v79::CUSTOMER_PROPERTIES;
pub use tutanota_v65::{CALENDAR_GROUP_ROOT, FILE_DATA};

/// Every step this client knows, in registration order.
pub fn registered_migrations() -> Vec<Box<dyn OfflineMigration>> {
    vec![
        Box::new(sys_v79::SysV79),
        Box::new(sys_v96::SysV96),
        Box::new(tutanota_v62::TutanotaV62),
        Box::new(tutanota_v65::TutanotaV65),
    ]
}
