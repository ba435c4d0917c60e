//! File-backed [`KeyStore`] (Section 4.2 of the design: the migration
//! fallback used when a database-backed store is unavailable).
//!
//! Identical semantics to [`crate::sqlite::SqliteKeyStore`]: same
//! [`KeyRecord`](crate::KeyRecord) shape, same wrapping/AEAD logic. Persists
//! a JSON envelope at a configured path, written atomically (write to a
//! sibling temp file, then rename) with `0600` permissions on Unix.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::crypto::{derive_wrapping_key, generate_raw_key, open_key, seal_key};
use crate::{now_unix, KeyCache, KeyRecord, KeyStore, KeyStoreError, Result, RAW_KEY_LEN};

/// The on-disk JSON envelope: every record ever issued, newest last.
#[derive(Debug, Serialize, Deserialize, Default)]
struct Envelope {
    records: Vec<KeyRecord>,
}

/// A key store backed by a single JSON file.
pub struct FileKeyStore {
    path: PathBuf,
    wrapping_key: [u8; 32],
    cache: RwLock<KeyCache>,
}

impl FileKeyStore {
    pub fn open(path: &Path, master_secret: &str) -> Result<Self> {
        let wrapping_key = derive_wrapping_key(master_secret)?;

        let envelope = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Envelope::default()
        };

        let (envelope, cache) = bootstrap(envelope, &wrapping_key)?;
        write_envelope(path, &envelope)?;

        Ok(Self {
            path: path.to_path_buf(),
            wrapping_key,
            cache: RwLock::new(cache),
        })
    }
}

fn active_record(envelope: &Envelope) -> Result<Option<&KeyRecord>> {
    let active: Vec<&KeyRecord> = envelope.records.iter().filter(|r| r.is_active).collect();
    match active.len() {
        0 => Ok(None),
        1 => Ok(Some(active[0])),
        _ => Err(KeyStoreError::MultipleActiveRecords),
    }
}

fn bootstrap(mut envelope: Envelope, wrapping_key: &[u8; 32]) -> Result<(Envelope, KeyCache)> {
    let record = match active_record(&envelope)?.cloned() {
        Some(record) => record,
        None => {
            let raw_key = generate_raw_key();
            let ciphertext = seal_key(wrapping_key, &raw_key);
            let now = now_unix();
            let record = KeyRecord {
                version: 1,
                ciphertext,
                previous_ciphertext: None,
                is_active: true,
                created_at: now,
                rotated_at: now,
            };
            envelope.records.push(record.clone());
            record
        }
    };

    let current_key = open_key(wrapping_key, &record.ciphertext, record.version)?;
    let previous_key = match &record.previous_ciphertext {
        Some(ct) => Some(open_key(wrapping_key, ct, record.version)?),
        None => None,
    };

    let cache = KeyCache {
        current_version: record.version,
        current_key,
        previous_key,
        rotated_at: SystemTime::UNIX_EPOCH + Duration::from_secs(record.rotated_at),
    };

    Ok((envelope, cache))
}

fn write_envelope(path: &Path, envelope: &Envelope) -> Result<()> {
    let json = serde_json::to_string_pretty(envelope)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl KeyStore for FileKeyStore {
    fn current_key(&self) -> [u8; RAW_KEY_LEN] {
        self.cache.read().expect("key cache lock poisoned").current_key
    }

    fn both_keys(&self) -> (u32, [u8; RAW_KEY_LEN], Option<[u8; RAW_KEY_LEN]>) {
        let cache = self.cache.read().expect("key cache lock poisoned");
        (cache.current_version, cache.current_key, cache.previous_key)
    }

    fn rotate(&self) -> Result<()> {
        let content = fs::read_to_string(&self.path)?;
        let mut envelope: Envelope = serde_json::from_str(&content)?;

        let old_record = active_record(&envelope)?
            .cloned()
            .ok_or(KeyStoreError::NoActiveRecord)?;

        for record in envelope.records.iter_mut() {
            record.is_active = false;
        }

        let new_key = generate_raw_key();
        let new_ciphertext = seal_key(&self.wrapping_key, &new_key);
        let now = now_unix();
        let new_version = old_record.version + 1;
        envelope.records.push(KeyRecord {
            version: new_version,
            ciphertext: new_ciphertext,
            previous_ciphertext: Some(old_record.ciphertext),
            is_active: true,
            created_at: now,
            rotated_at: now,
        });

        write_envelope(&self.path, &envelope)?;

        let mut cache = self.cache.write().expect("key cache lock poisoned");
        let previous_key = cache.current_key;
        cache.current_version = new_version;
        cache.current_key = new_key;
        cache.previous_key = Some(previous_key);
        cache.rotated_at = SystemTime::now();

        Ok(())
    }

    fn age(&self) -> Duration {
        let cache = self.cache.read().expect("key cache lock poisoned");
        SystemTime::now()
            .duration_since(cache.rotated_at)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn secret() -> String {
        "x".repeat(crate::crypto::MIN_MASTER_SECRET_LEN)
    }

    #[test]
    fn test_bootstrap_creates_file_and_initial_key() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        let store = FileKeyStore::open(&path, &secret()).expect("open");
        assert!(path.exists());
        let (version, _key, previous) = store.both_keys();
        assert_eq!(version, 1);
        assert!(previous.is_none());
    }

    #[test]
    fn test_rotate_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");

        let store1 = FileKeyStore::open(&path, &secret()).expect("open");
        store1.rotate().expect("rotate");
        let (version1, key1, _) = store1.both_keys();
        drop(store1);

        let store2 = FileKeyStore::open(&path, &secret()).expect("reopen");
        let (version2, key2, _) = store2.both_keys();
        assert_eq!(version1, version2);
        assert_eq!(key1, key2);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        let _store = FileKeyStore::open(&path, &secret()).expect("open");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
