//! Administrative operations over the shared stores.
//!
//! Listing, revocation, deletion, usage reporting and bulk key generation.
//! None of this participates in issuance or validation correctness; it only
//! reads and writes through the same stores.

use crate::clock::Clock;
use crate::crypto::digest::key_fingerprint;
use crate::crypto::token::TokenGenerator;
use crate::errors::{KeygateError, KeygateResult};
use crate::meter::usage::{UsageLog, UsageLogEntry, UsageSummary};
use crate::store::keys::{KeyStatus, KeyStore, LicenseKey};
use std::sync::Arc;
use tracing::info;

/// Administrative view of the key store and usage log.
#[derive(Clone)]
pub struct AdminService {
    keys: KeyStore,
    usage: UsageLog,
    tokens: TokenGenerator,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    key_bytes: usize,
    max_bulk_keys: usize,
}

impl AdminService {
    /// Create the service.
    pub fn new(
        keys: KeyStore,
        usage: UsageLog,
        tokens: TokenGenerator,
        clock: Arc<dyn Clock>,
        key_prefix: String,
        key_bytes: usize,
        max_bulk_keys: usize,
    ) -> Self {
        Self {
            keys,
            usage,
            tokens,
            clock,
            key_prefix,
            key_bytes,
            max_bulk_keys,
        }
    }

    /// Mint `count` unlocked active keys, optionally expiring after `expiry_days`.
    ///
    /// # Errors
    /// - `InvalidRequest` - `count` outside `1..=max_bulk_keys`, or an expiry
    ///   past the representable date range
    /// - `GeneratorFailure` - no secure randomness; keys minted so far are kept
    pub fn generate_keys(
        &self,
        count: i64,
        expiry_days: Option<u32>,
    ) -> KeygateResult<Vec<LicenseKey>> {
        let max = self.max_bulk_keys;
        let count = usize::try_from(count)
            .ok()
            .filter(|c| (1..=max).contains(c))
            .ok_or_else(|| {
                KeygateError::InvalidRequest(format!("Invalid key count (1-{})", max))
            })?;

        let now = self.clock.now_utc();
        let expires_at = match expiry_days {
            Some(days) => Some(
                chrono::Duration::try_days(i64::from(days))
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| {
                        KeygateError::InvalidRequest("Invalid expiry days".to_string())
                    })?,
            ),
            None => None,
        };

        let mut minted = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.tokens.license_key(&self.key_prefix, self.key_bytes)?;
            let mut record = LicenseKey::new(key, now);
            record.expires_at = expires_at;
            self.keys.insert(record.clone())?;
            minted.push(record);
        }

        info!(count, ?expiry_days, "bulk generated license keys");
        Ok(minted)
    }

    /// Every key, newest first.
    pub fn list_keys(&self) -> KeygateResult<Vec<LicenseKey>> {
        self.keys.list()
    }

    /// Revoke a key. Revoked keys never validate again.
    pub fn revoke(&self, key: &str) -> KeygateResult<LicenseKey> {
        let record = self.keys.set_status(key, KeyStatus::Revoked)?;
        info!(key = %key_fingerprint(key), "license key revoked");
        Ok(record)
    }

    /// Delete a key.
    pub fn delete(&self, key: &str) -> KeygateResult<()> {
        self.keys.delete(key)?;
        info!(key = %key_fingerprint(key), "license key deleted");
        Ok(())
    }

    /// Up to `limit` usage log entries, newest first.
    pub fn logs(&self, limit: usize) -> KeygateResult<Vec<UsageLogEntry>> {
        self.usage.recent(limit)
    }

    /// Aggregate usage figures.
    pub fn analytics(&self) -> KeygateResult<UsageSummary> {
        let keys = self.keys.list()?;
        self.usage.summary(&keys)
    }
}
