use std::path::Path;

use offcache_core::crypto::KEY_LENGTH;
use offcache_core::DatabaseKey;
use zeroize::Zeroizing;

const KEYCHAIN_SERVICE: &str = "offcache";

pub fn generate_key() -> anyhow::Result<DatabaseKey> {
    let mut bytes = Zeroizing::new([0u8; KEY_LENGTH]);
    getrandom::getrandom(&mut bytes[..])
        .map_err(|e| anyhow::anyhow!("Failed to generate key bytes: {}", e))?;
    Ok(DatabaseKey::from_bytes(*bytes))
}

pub fn write_keyfile(path: &Path, key: &DatabaseKey, overwrite: bool) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    if path.exists() && !overwrite {
        return Err(anyhow::anyhow!(
            "Keyfile already exists: {}",
            path.display()
        ));
    }
    std::fs::write(path, key.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to write keyfile {}: {}", path.display(), e))?;
    set_file_permissions(path)?;
    Ok(())
}

pub fn read_keyfile(path: &Path) -> anyhow::Result<DatabaseKey> {
    let bytes = Zeroizing::new(
        std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read keyfile {}: {}", path.display(), e))?,
    );
    DatabaseKey::from_slice(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid keyfile {}: {}", path.display(), e))
}

pub fn keychain_get(account: &str) -> anyhow::Result<Option<DatabaseKey>> {
    let entry = keychain_entry(account)?;
    match entry.get_password() {
        Ok(value) => {
            let value = Zeroizing::new(value);
            let key = DatabaseKey::from_hex(value.trim())
                .map_err(|e| anyhow::anyhow!("Keychain entry is not a cache key: {}", e))?;
            Ok(Some(key))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(anyhow::anyhow!("Keychain read failed: {}", err)),
    }
}

pub fn keychain_set(account: &str, key: &DatabaseKey) -> anyhow::Result<()> {
    let entry = keychain_entry(account)?;
    entry
        .set_password(key.to_hex().as_str())
        .map_err(|e| anyhow::anyhow!("Keychain write failed: {}", e))
}

fn keychain_entry(account: &str) -> anyhow::Result<keyring::Entry> {
    keyring::Entry::new(KEYCHAIN_SERVICE, account)
        .map_err(|e| anyhow::anyhow!("Keychain entry failed: {}", e))
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create keyfile directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    Ok(())
}

fn set_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_keyfile_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("offline.key");
        let key = generate_key().unwrap();

        write_keyfile(&path, &key, false).unwrap();
        let read = read_keyfile(&path).unwrap();
        assert_eq!(read.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_keyfile_not_overwritten_by_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.key");
        let key = generate_key().unwrap();

        write_keyfile(&path, &key, false).unwrap();
        assert!(write_keyfile(&path, &key, false).is_err());
        assert!(write_keyfile(&path, &key, true).is_ok());
    }

    #[test]
    fn test_short_keyfile_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.key");
        std::fs::write(&path, [1u8; 16]).unwrap();
        assert!(read_keyfile(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_keyfile_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.key");
        write_keyfile(&path, &generate_key().unwrap(), false).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
