//! SQLite-backed [`KeyStore`] (Section 4.2 of the design, primary backend).
//!
//! Schema follows the `ochra-db` convention: a single `hmac_keys` table,
//! `PRAGMA user_version` tracking schema version, WAL mode, and an idempotent
//! `run()`-style bootstrap so opening an existing database is a no-op beyond
//! loading the active record.

use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};

use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::{derive_wrapping_key, generate_raw_key, open_key, seal_key};
use crate::{now_unix, KeyCache, KeyStore, KeyStoreError, Result, RAW_KEY_LEN};

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS hmac_keys (
    version             INTEGER PRIMARY KEY,
    ciphertext          TEXT NOT NULL,
    previous_ciphertext TEXT,
    is_active           INTEGER NOT NULL,
    created_at          INTEGER NOT NULL,
    rotated_at          INTEGER NOT NULL
);
";

/// A key store backed by a SQLite `hmac_keys` table.
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
    wrapping_key: [u8; 32],
    cache: RwLock<KeyCache>,
}

impl SqliteKeyStore {
    /// Open (creating if necessary) the key store at `path`, deriving the
    /// wrapping key from `master_secret` and loading or bootstrapping the
    /// active key record.
    pub fn open(path: &Path, master_secret: &str) -> Result<Self> {
        let wrapping_key = derive_wrapping_key(master_secret)?;
        let conn = Connection::open(path)?;
        configure(&conn)?;

        let cache = bootstrap(&conn, &wrapping_key)?;
        Ok(Self {
            conn: Mutex::new(conn),
            wrapping_key,
            cache: RwLock::new(cache),
        })
    }

    /// Open an in-memory store (used by tests).
    pub fn open_memory(master_secret: &str) -> Result<Self> {
        let wrapping_key = derive_wrapping_key(master_secret)?;
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;

        let cache = bootstrap(&conn, &wrapping_key)?;
        Ok(Self {
            conn: Mutex::new(conn),
            wrapping_key,
            cache: RwLock::new(cache),
        })
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.execute_batch(SCHEMA_V1)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Load the single active record, bootstrapping a fresh key if the table is
/// empty. Fails if more than one active record is found or decryption fails
/// (Section 4.2: both are fatal startup conditions).
fn bootstrap(conn: &Connection, wrapping_key: &[u8; 32]) -> Result<KeyCache> {
    let active_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hmac_keys WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;

    if active_count > 1 {
        return Err(KeyStoreError::MultipleActiveRecords);
    }

    if active_count == 0 {
        let raw_key = generate_raw_key();
        let ciphertext = seal_key(wrapping_key, &raw_key);
        let now = now_unix();
        conn.execute(
            "INSERT INTO hmac_keys (version, ciphertext, previous_ciphertext, is_active, created_at, rotated_at)
             VALUES (1, ?1, NULL, 1, ?2, ?2)",
            params![ciphertext, now as i64],
        )?;
        return Ok(KeyCache {
            current_version: 1,
            current_key: raw_key,
            previous_key: None,
            rotated_at: SystemTime::now(),
        });
    }

    let (version, ciphertext, previous_ciphertext, rotated_at): (u32, String, Option<String>, i64) = conn
        .query_row(
            "SELECT version, ciphertext, previous_ciphertext, rotated_at FROM hmac_keys WHERE is_active = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    let current_key = open_key(wrapping_key, &ciphertext, version)?;
    let previous_key = match previous_ciphertext {
        Some(ref ct) => Some(open_key(wrapping_key, ct, version)?),
        None => None,
    };

    Ok(KeyCache {
        current_version: version,
        current_key,
        previous_key,
        rotated_at: SystemTime::UNIX_EPOCH + Duration::from_secs(rotated_at.max(0) as u64),
    })
}

impl KeyStore for SqliteKeyStore {
    fn current_key(&self) -> [u8; RAW_KEY_LEN] {
        self.cache.read().expect("key cache lock poisoned").current_key
    }

    fn both_keys(&self) -> (u32, [u8; RAW_KEY_LEN], Option<[u8; RAW_KEY_LEN]>) {
        let cache = self.cache.read().expect("key cache lock poisoned");
        (cache.current_version, cache.current_key, cache.previous_key)
    }

    fn rotate(&self) -> Result<()> {
        let new_key = generate_raw_key();
        let new_ciphertext = seal_key(&self.wrapping_key, &new_key);
        let now = now_unix();

        let mut conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let tx = conn.transaction()?;

        let (old_version, old_ciphertext): (u32, String) = tx
            .query_row(
                "SELECT version, ciphertext FROM hmac_keys WHERE is_active = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(KeyStoreError::NoActiveRecord)?;

        tx.execute("UPDATE hmac_keys SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            "INSERT INTO hmac_keys (version, ciphertext, previous_ciphertext, is_active, created_at, rotated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![old_version + 1, new_ciphertext, old_ciphertext, now as i64],
        )?;
        tx.commit()?;
        drop(conn);

        let mut cache = self.cache.write().expect("key cache lock poisoned");
        let previous_key = cache.current_key;
        cache.current_version = old_version + 1;
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

    fn secret() -> String {
        "x".repeat(crate::crypto::MIN_MASTER_SECRET_LEN)
    }

    #[test]
    fn test_bootstrap_creates_initial_key() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let (version, _current, previous) = store.both_keys();
        assert_eq!(version, 1);
        assert!(previous.is_none());
    }

    #[test]
    fn test_rotate_bumps_version_and_keeps_previous() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let (_, key_v1, _) = store.both_keys();
        store.rotate().expect("rotate");
        let (version, key_v2, previous) = store.both_keys();
        assert_eq!(version, 2);
        assert_ne!(key_v1, key_v2);
        assert_eq!(previous, Some(key_v1));
    }

    #[test]
    fn test_two_rotations_drop_the_original_key() {
        let store = SqliteKeyStore::open_memory(&secret()).expect("open");
        let (_, key_v1, _) = store.both_keys();
        store.rotate().expect("rotate 1");
        store.rotate().expect("rotate 2");
        let (version, _key_v3, previous) = store.both_keys();
        assert_eq!(version, 3);
        assert_ne!(previous, Some(key_v1));
    }

    #[test]
    fn test_reopen_loads_existing_active_record() {
        use tempfile::tempdir;
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.db");

        let store1 = SqliteKeyStore::open(&path, &secret()).expect("open");
        store1.rotate().expect("rotate");
        let (version1, key1, _) = store1.both_keys();
        drop(store1);

        let store2 = SqliteKeyStore::open(&path, &secret()).expect("reopen");
        let (version2, key2, _) = store2.both_keys();
        assert_eq!(version1, version2);
        assert_eq!(key1, key2);
    }
}
