//! Issued license keys.

use super::KeyBackend;
use crate::errors::{KeygateError, KeygateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle status of a license key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Key can be validated.
    Active,
    /// Key passed its expiry; discovered lazily at validation time.
    Expired,
    /// Key was revoked by an administrator. Terminal.
    Revoked,
}

/// An issued license key and its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseKey {
    /// The opaque key string handed to the client.
    pub key: String,

    /// IP the key is bound to. `None` means any IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_lock: Option<String>,

    /// Hardware id the key is bound to. `None` means any hardware.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwid_lock: Option<String>,

    /// When the key was minted.
    pub created_at: DateTime<Utc>,

    /// When the key stops validating. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Current status.
    pub status: KeyStatus,

    /// Successful validations so far.
    pub used_count: u64,
}

impl LicenseKey {
    /// A fresh active key with no uses.
    pub fn new(key: String, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            ip_lock: None,
            hwid_lock: None,
            created_at,
            expires_at: None,
            status: KeyStatus::Active,
            used_count: 0,
        }
    }

    /// Whether `expires_at` has passed at `now`.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Keyed access to license keys.
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn KeyBackend>,
}

impl KeyStore {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<dyn KeyBackend>) -> Self {
        Self { backend }
    }

    /// Insert a newly minted key.
    pub fn insert(&self, key: LicenseKey) -> KeygateResult<()> {
        self.backend.insert(key)
    }

    /// Snapshot of a key.
    pub fn get(&self, key: &str) -> KeygateResult<Option<LicenseKey>> {
        self.backend.get(key)
    }

    /// Atomically read and mutate a key. Returns the record after `apply`.
    pub fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut LicenseKey),
    ) -> KeygateResult<Option<LicenseKey>> {
        self.backend.modify(key, apply)
    }

    /// Increment the usage counter. Returns the new count.
    ///
    /// # Errors
    /// - `InvalidKey` - no such key
    pub fn record_success(&self, key: &str) -> KeygateResult<u64> {
        self.update(key, &mut |record| record.used_count += 1)?
            .map(|record| record.used_count)
            .ok_or(KeygateError::InvalidKey)
    }

    /// Set the status of a key. Returns the updated record.
    ///
    /// # Errors
    /// - `InvalidKey` - no such key
    pub fn set_status(&self, key: &str, status: KeyStatus) -> KeygateResult<LicenseKey> {
        self.update(key, &mut |record| record.status = status)?
            .ok_or(KeygateError::InvalidKey)
    }

    /// Delete a key.
    ///
    /// # Errors
    /// - `InvalidKey` - no such key
    pub fn delete(&self, key: &str) -> KeygateResult<()> {
        if self.backend.delete(key)? {
            Ok(())
        } else {
            Err(KeygateError::InvalidKey)
        }
    }

    /// Every key, newest first.
    pub fn list(&self) -> KeygateResult<Vec<LicenseKey>> {
        let mut keys = self.backend.list()?;
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryKeys;
    use chrono::TimeZone;

    fn store_with(key: &str) -> KeyStore {
        let store = KeyStore::new(Arc::new(MemoryKeys::new()));
        store
            .insert(LicenseKey::new(
                key.to_string(),
                Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_record_success_increments() {
        let store = store_with("KEY-1");
        assert_eq!(store.record_success("KEY-1").unwrap(), 1);
        assert_eq!(store.record_success("KEY-1").unwrap(), 2);
        assert_eq!(store.get("KEY-1").unwrap().unwrap().used_count, 2);
    }

    #[test]
    fn test_record_success_unknown_key() {
        let store = store_with("KEY-1");
        assert!(matches!(
            store.record_success("KEY-2"),
            Err(KeygateError::InvalidKey)
        ));
    }

    #[test]
    fn test_set_status() {
        let store = store_with("KEY-1");
        let updated = store.set_status("KEY-1", KeyStatus::Revoked).unwrap();
        assert_eq!(updated.status, KeyStatus::Revoked);
    }

    #[test]
    fn test_delete() {
        let store = store_with("KEY-1");
        store.delete("KEY-1").unwrap();
        assert!(store.get("KEY-1").unwrap().is_none());
        assert!(matches!(store.delete("KEY-1"), Err(KeygateError::InvalidKey)));
    }

    #[test]
    fn test_list_newest_first() {
        let store = store_with("KEY-OLD");
        store
            .insert(LicenseKey::new(
                "KEY-NEW".to_string(),
                Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            ))
            .unwrap();
        let keys: Vec<String> = store.list().unwrap().into_iter().map(|k| k.key).collect();
        assert_eq!(keys, vec!["KEY-NEW", "KEY-OLD"]);
    }

    #[test]
    fn test_serialized_field_names() {
        let mut key = LicenseKey::new(
            "KEY-1".to_string(),
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        );
        key.ip_lock = Some("192.168.1.100".to_string());
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["ip_lock"], "192.168.1.100");
        assert_eq!(json["status"], "active");
        assert_eq!(json["used_count"], 0);
        assert!(json.get("hwid_lock").is_none());
    }

    #[test]
    fn test_past_expiry() {
        let mut key = LicenseKey::new(
            "KEY-1".to_string(),
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        );
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();
        assert!(!key.is_past_expiry(now));
        key.expires_at = Some(Utc.with_ymd_and_hms(2025, 1, 19, 0, 0, 0).unwrap());
        assert!(key.is_past_expiry(now));
    }
}
