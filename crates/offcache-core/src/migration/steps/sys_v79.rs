use serde_json::Value;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::migration::standard::{add_missing_fields, migrate_all_elements, EntityObject};
use crate::migration::OfflineMigration;

pub const CUSTOMER_PROPERTIES: &str = "sys/CustomerProperties";

/// CustomerProperties gained fields; cached instances get their defaults.
pub struct SysV79;

fn customer_properties_defaults() -> EntityObject {
    EntityObject::from_iter([
        ("_format".to_string(), Value::from("0")),
        ("bigLogo".to_string(), Value::Null),
        ("smallLogo".to_string(), Value::Null),
        ("externalUserWelcomeMessage".to_string(), Value::from("")),
        ("lastUpgradeReminder".to_string(), Value::Null),
        ("notificationMailTemplates".to_string(), Value::Array(Vec::new())),
        ("usageDataOptedOut".to_string(), Value::Bool(false)),
    ])
}

impl OfflineMigration for SysV79 {
    fn app(&self) -> &str {
        "sys"
    }

    fn version(&self) -> u32 {
        79
    }

    fn migrate(&self, store: &mut CacheStore) -> Result<()> {
        migrate_all_elements(
            store,
            CUSTOMER_PROPERTIES,
            &[add_missing_fields(customer_properties_defaults())],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_empty() {
        let defaults = customer_properties_defaults();
        assert_eq!(defaults.get("usageDataOptedOut"), Some(&Value::Bool(false)));
        assert!(defaults.contains_key("notificationMailTemplates"));
    }
}
