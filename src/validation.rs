//! Validation engine.
//!
//! Evaluates a submitted key against the key store and appends one usage
//! log entry per attempt. The lookup, policy check and counter increment
//! happen inside one atomic `update` on the key, so concurrent validations
//! of the same key never lose an increment.

use crate::clock::Clock;
use crate::crypto::digest::key_fingerprint;
use crate::errors::{KeygateError, KeygateResult};
use crate::meter::usage::UsageLog;
use crate::policy::access::check_access;
use crate::store::keys::{KeyStatus, KeyStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated {
    /// Usage count after this validation.
    pub usage_count: u64,
}

/// Key validation over the key store and usage log.
#[derive(Clone)]
pub struct ValidationEngine {
    keys: KeyStore,
    usage: UsageLog,
    clock: Arc<dyn Clock>,
}

impl ValidationEngine {
    /// Create an engine.
    pub fn new(keys: KeyStore, usage: UsageLog, clock: Arc<dyn Clock>) -> Self {
        Self { keys, usage, clock }
    }

    /// Validate `key` presented from `ip` with optional `hwid`.
    ///
    /// On success the usage count is incremented. A key found past its
    /// expiry is marked expired as a side effect, unless it is already
    /// revoked: revocation is terminal and is never overwritten by expiry.
    ///
    /// Every outcome is logged. For an existing key the log entry is
    /// appended inside the same `update` as the counter change, and a
    /// failed append leaves the record untouched, so `used_count` always
    /// matches the successful entries in the log.
    ///
    /// # Errors
    /// - `InvalidKey` - key does not exist
    /// - `KeyExpired` - past expiry
    /// - `KeyRevoked` - revoked
    /// - `IpLockMismatch` / `HwidLockMismatch` - bound elsewhere
    /// - `Storage` - the key store or usage log failed
    pub fn validate(&self, key: &str, ip: &str, hwid: Option<&str>) -> KeygateResult<Validated> {
        let now = self.clock.now_utc();
        let mut outcome = Err(KeygateError::InvalidKey);
        let mut found = false;

        self.keys.update(key, &mut |record| {
            found = true;
            let checked = check_access(record, ip, hwid, now);
            if let Err(e) = self.usage.append(key, ip, hwid, checked.is_ok()) {
                outcome = Err(e);
                return;
            }
            outcome = match checked {
                Ok(()) => {
                    record.used_count += 1;
                    Ok(record.used_count)
                }
                Err(KeygateError::KeyExpired) => {
                    if record.status == KeyStatus::Active {
                        record.status = KeyStatus::Expired;
                    }
                    Err(KeygateError::KeyExpired)
                }
                Err(e) => Err(e),
            };
        })?;

        if !found {
            self.usage.append(key, ip, hwid, false)?;
        }

        let fingerprint = key_fingerprint(key);
        match outcome {
            Ok(usage_count) => {
                debug!(key = %fingerprint, usage_count, "key validated");
                Ok(Validated { usage_count })
            }
            Err(e @ KeygateError::Storage(_)) => {
                warn!(key = %fingerprint, error = %e, "usage log append failed");
                Err(e)
            }
            Err(e) => {
                info!(key = %fingerprint, ip = %ip, reason = %e, "key validation rejected");
                Err(e)
            }
        }
    }
}
