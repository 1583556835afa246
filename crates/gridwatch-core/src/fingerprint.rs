//! Content fingerprints and change detection.
//!
//! A fingerprint is the SHA-256 digest of the exact bytes fetched for a
//! source. [`ChangeDetector`] compares against the stored digest and persists
//! the new one before reporting a change, so a crash in between re-detects the
//! change on the next run instead of skipping it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::storage::Database;

const KV_PREFIX: &str = "fingerprint:";

/// Digest of one source's payload. Stores key it by `DataKind::source_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub digest: [u8; 32],
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Self { digest }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn from_hex(key: &str, encoded: &str) -> Result<Self, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            key: key.to_string(),
            message,
        };
        let bytes = hex::decode(encoded).map_err(|e| corrupt(e.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| corrupt(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self { digest })
    }
}

/// Persistence for the last accepted fingerprint of each source.
pub trait FingerprintStore: Send + Sync {
    fn get(&self, source_key: &str) -> Result<Option<Fingerprint>, StoreError>;
    fn put(&self, source_key: &str, fingerprint: Fingerprint) -> Result<(), StoreError>;
    fn remove(&self, source_key: &str) -> Result<(), StoreError>;
    /// Drop every stored fingerprint. Returns how many were removed.
    fn clear(&self) -> Result<usize, StoreError>;
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    entries: Mutex<HashMap<String, Fingerprint>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn get(&self, source_key: &str) -> Result<Option<Fingerprint>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(source_key).copied())
    }

    fn put(&self, source_key: &str, fingerprint: Fingerprint) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(source_key.to_string(), fingerprint);
        Ok(())
    }

    fn remove(&self, source_key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(source_key);
        Ok(())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// Fingerprints kept in the SQLite kv table as hex strings.
pub struct SqliteFingerprintStore {
    db: Mutex<Database>,
}

impl SqliteFingerprintStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl FingerprintStore for SqliteFingerprintStore {
    fn get(&self, source_key: &str) -> Result<Option<Fingerprint>, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.kv_get(&format!("{KV_PREFIX}{source_key}"))?
            .map(|hex| Fingerprint::from_hex(source_key, &hex))
            .transpose()
    }

    fn put(&self, source_key: &str, fingerprint: Fingerprint) -> Result<(), StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.kv_set(&format!("{KV_PREFIX}{source_key}"), &fingerprint.to_hex())?;
        Ok(())
    }

    fn remove(&self, source_key: &str) -> Result<(), StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.kv_delete(&format!("{KV_PREFIX}{source_key}"))?;
        Ok(())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.kv_clear_prefix(KV_PREFIX)?)
    }
}

/// Gatekeeper deciding whether freshly fetched bytes are new.
#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn FingerprintStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// Detector backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryFingerprintStore::new()))
    }

    /// Returns `true` when `bytes` differ from the last accepted payload for
    /// `source_key` (or none was stored), persisting the new fingerprint first.
    ///
    /// Store failures fail open: the payload is reported as changed.
    pub fn check_and_update(&self, source_key: &str, bytes: &[u8]) -> bool {
        let fingerprint = Fingerprint::of(bytes);

        match self.store.get(source_key) {
            Ok(Some(stored)) if stored == fingerprint => {
                debug!(source = source_key, "content unchanged");
                return false;
            }
            Ok(_) => {}
            Err(e) => warn!(source = source_key, "fingerprint lookup failed, assuming changed: {e}"),
        }

        if let Err(e) = self.store.put(source_key, fingerprint) {
            warn!(source = source_key, "failed to persist fingerprint: {e}");
        }
        debug!(source = source_key, digest = %fingerprint.to_hex(), "content changed");
        true
    }

    /// Forget the stored fingerprint so the next payload counts as changed.
    ///
    /// Used when accepted bytes could not be parsed.
    pub fn forget(&self, source_key: &str) {
        if let Err(e) = self.store.remove(source_key) {
            warn!(source = source_key, "failed to drop fingerprint: {e}");
        }
    }

    /// Forget every stored fingerprint.
    pub fn reset(&self) -> Result<usize, StoreError> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct BrokenStore;

    impl FingerprintStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<Fingerprint>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn put(&self, _: &str, _: Fingerprint) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn remove(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn clear(&self) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn first_sight_is_a_change_then_stable() {
        let detector = ChangeDetector::in_memory();
        assert!(detector.check_and_update("schedule", b"abc"));
        assert!(!detector.check_and_update("schedule", b"abc"));
        assert!(detector.check_and_update("schedule", b"abd"));
        assert!(!detector.check_and_update("schedule", b"abd"));
    }

    #[test]
    fn sources_are_independent() {
        let detector = ChangeDetector::in_memory();
        assert!(detector.check_and_update("schedule", b"same"));
        assert!(detector.check_and_update("next_event", b"same"));
    }

    #[test]
    fn store_failures_fail_open() {
        let detector = ChangeDetector::new(Arc::new(BrokenStore));
        assert!(detector.check_and_update("schedule", b"abc"));
        assert!(detector.check_and_update("schedule", b"abc"));
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridwatch.db");
        {
            let detector =
                ChangeDetector::new(Arc::new(SqliteFingerprintStore::new(Database::open_at(&path).unwrap())));
            assert!(detector.check_and_update("schedule", b"payload"));
        }
        let detector =
            ChangeDetector::new(Arc::new(SqliteFingerprintStore::new(Database::open_at(&path).unwrap())));
        assert!(!detector.check_and_update("schedule", b"payload"));
    }

    #[test]
    fn forget_and_reset_rearm_detection() {
        let detector = ChangeDetector::in_memory();
        assert!(detector.check_and_update("schedule", b"abc"));
        assert!(detector.check_and_update("standings", b"xyz"));

        detector.forget("schedule");
        assert!(detector.check_and_update("schedule", b"abc"));
        assert!(!detector.check_and_update("standings", b"xyz"));

        assert_eq!(detector.reset().unwrap(), 2);
        assert!(detector.check_and_update("standings", b"xyz"));
    }

    #[test]
    fn sqlite_reset_clears_namespace_only() {
        let db = Database::open_memory().unwrap();
        db.kv_set("unrelated", "1").unwrap();
        let store = SqliteFingerprintStore::new(db);
        store.put("schedule", Fingerprint::of(b"a")).unwrap();
        store.put("next_event", Fingerprint::of(b"b")).unwrap();
        store.remove("next_event").unwrap();
        assert!(store.get("next_event").unwrap().is_none());
        assert_eq!(store.clear().unwrap(), 1);
    }

    #[test]
    fn corrupt_hex_is_rejected() {
        assert!(Fingerprint::from_hex("k", "zz").is_err());
        assert!(Fingerprint::from_hex("k", "abcd").is_err());
        let fp = Fingerprint::of(b"x");
        assert_eq!(Fingerprint::from_hex("k", &fp.to_hex()).unwrap(), fp);
    }

    proptest! {
        #[test]
        fn identical_bytes_change_once(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let detector = ChangeDetector::in_memory();
            prop_assert!(detector.check_and_update("k", &bytes));
            prop_assert!(!detector.check_and_update("k", &bytes));
        }
    }
}
