//! In-memory storage backends.

use super::{Disposition, KeyBackend, PendingLinkBackend, UsageBackend};
use crate::errors::{KeygateError, KeygateResult};
use crate::meter::usage::UsageLogEntry;
use crate::store::keys::LicenseKey;
use crate::store::pending::PendingLink;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

fn poisoned<T>(_: PoisonError<T>) -> KeygateError {
    KeygateError::Storage("store lock poisoned".to_string())
}

/// Pending links held in a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryPendingLinks {
    links: Mutex<HashMap<String, PendingLink>>,
}

impl MemoryPendingLinks {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingLinkBackend for MemoryPendingLinks {
    fn insert(&self, link: PendingLink) -> KeygateResult<()> {
        let mut links = self.links.lock().map_err(poisoned)?;
        if links.contains_key(&link.id) {
            return Err(KeygateError::Storage(
                "pending link id already exists".to_string(),
            ));
        }
        links.insert(link.id.clone(), link);
        Ok(())
    }

    fn get(&self, id: &str) -> KeygateResult<Option<PendingLink>> {
        let links = self.links.lock().map_err(poisoned)?;
        Ok(links.get(id).cloned())
    }

    fn modify(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut PendingLink) -> Disposition,
    ) -> KeygateResult<Option<PendingLink>> {
        let mut links = self.links.lock().map_err(poisoned)?;
        let Some(link) = links.get_mut(id) else {
            return Ok(None);
        };
        let disposition = apply(link);
        let snapshot = link.clone();
        if disposition == Disposition::Remove {
            links.remove(id);
        }
        Ok(Some(snapshot))
    }

    fn remove_created_before(&self, cutoff: DateTime<Utc>) -> KeygateResult<usize> {
        let mut links = self.links.lock().map_err(poisoned)?;
        let before = links.len();
        links.retain(|_, link| link.created_at >= cutoff);
        Ok(before - links.len())
    }

    fn len(&self) -> KeygateResult<usize> {
        Ok(self.links.lock().map_err(poisoned)?.len())
    }
}

/// License keys held in a read-write-locked map.
#[derive(Debug, Default)]
pub struct MemoryKeys {
    keys: RwLock<HashMap<String, LicenseKey>>,
}

impl MemoryKeys {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyBackend for MemoryKeys {
    fn insert(&self, key: LicenseKey) -> KeygateResult<()> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        if keys.contains_key(&key.key) {
            return Err(KeygateError::Storage("license key already exists".to_string()));
        }
        keys.insert(key.key.clone(), key);
        Ok(())
    }

    fn get(&self, key: &str) -> KeygateResult<Option<LicenseKey>> {
        let keys = self.keys.read().map_err(poisoned)?;
        Ok(keys.get(key).cloned())
    }

    fn modify(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut LicenseKey),
    ) -> KeygateResult<Option<LicenseKey>> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        Ok(keys.get_mut(key).map(|record| {
            apply(record);
            record.clone()
        }))
    }

    fn delete(&self, key: &str) -> KeygateResult<bool> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        Ok(keys.remove(key).is_some())
    }

    fn list(&self) -> KeygateResult<Vec<LicenseKey>> {
        let keys = self.keys.read().map_err(poisoned)?;
        Ok(keys.values().cloned().collect())
    }
}

/// Usage log held in a mutex-guarded vector.
#[derive(Debug, Default)]
pub struct MemoryUsage {
    entries: Mutex<Vec<UsageLogEntry>>,
}

impl MemoryUsage {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageBackend for MemoryUsage {
    fn append(&self, entry: UsageLogEntry) -> KeygateResult<()> {
        self.entries.lock().map_err(poisoned)?.push(entry);
        Ok(())
    }

    fn entries(&self) -> KeygateResult<Vec<UsageLogEntry>> {
        Ok(self.entries.lock().map_err(poisoned)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys::KeyStatus;
    use chrono::TimeZone;

    fn link(id: &str, minute: u32) -> PendingLink {
        PendingLink {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, minute, 0).unwrap(),
            requester_ip: "1.1.1.1".to_string(),
            completed: false,
        }
    }

    #[test]
    fn test_pending_insert_rejects_duplicate_id() {
        let store = MemoryPendingLinks::new();
        store.insert(link("a", 0)).unwrap();
        assert!(matches!(
            store.insert(link("a", 1)),
            Err(KeygateError::Storage(_))
        ));
    }

    #[test]
    fn test_pending_modify_remove_returns_snapshot() {
        let store = MemoryPendingLinks::new();
        store.insert(link("a", 0)).unwrap();

        let snapshot = store
            .modify("a", &mut |l| {
                l.completed = true;
                Disposition::Remove
            })
            .unwrap();

        assert!(snapshot.unwrap().completed);
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_pending_modify_missing_skips_closure() {
        let store = MemoryPendingLinks::new();
        let mut called = false;
        let result = store
            .modify("missing", &mut |_| {
                called = true;
                Disposition::Keep
            })
            .unwrap();
        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn test_pending_remove_created_before() {
        let store = MemoryPendingLinks::new();
        store.insert(link("old", 0)).unwrap();
        store.insert(link("edge", 10)).unwrap();
        store.insert(link("new", 20)).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2025, 1, 15, 12, 10, 0).unwrap();
        assert_eq!(store.remove_created_before(cutoff).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get("old").unwrap().is_none());
    }

    #[test]
    fn test_keys_modify_and_delete() {
        let store = MemoryKeys::new();
        let record = LicenseKey {
            key: "KEY-1".to_string(),
            ip_lock: None,
            hwid_lock: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            expires_at: None,
            status: KeyStatus::Active,
            used_count: 0,
        };
        store.insert(record.clone()).unwrap();
        assert!(store.insert(record).is_err());

        let updated = store.modify("KEY-1", &mut |k| k.used_count += 1).unwrap();
        assert_eq!(updated.unwrap().used_count, 1);

        assert!(store.delete("KEY-1").unwrap());
        assert!(!store.delete("KEY-1").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
