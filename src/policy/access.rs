//! Key access policy.
//!
//! Checks run in a fixed order so the log distinguishes "expired" from
//! "revoked" from "wrong machine":
//! 1. Expiry (`expires_at` checked live, then stored status)
//! 2. Revocation
//! 3. IP lock
//! 4. Hardware id lock
//!
//! Existence is checked by the caller before a record is available.

use crate::store::keys::{KeyStatus, LicenseKey};
use crate::KeygateError;
use chrono::{DateTime, Utc};

/// Whether a presented value satisfies a lock.
///
/// An absent lock is unlocked and matches anything, including an absent
/// value. A present lock matches only an identical presented value.
pub fn lock_matches(lock: Option<&str>, presented: Option<&str>) -> bool {
    match lock {
        None => true,
        Some(lock) => presented == Some(lock),
    }
}

/// Check that a key may be used from `ip` with `hwid` at `now`.
///
/// # Returns
/// * `Ok(())` - Access granted
/// * `Err(KeyExpired)` - Past `expires_at`, or status already expired
/// * `Err(KeyRevoked)` - Key was revoked
/// * `Err(IpLockMismatch)` - Bound to another IP
/// * `Err(HwidLockMismatch)` - Bound to another hardware id
pub fn check_access(
    record: &LicenseKey,
    ip: &str,
    hwid: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), KeygateError> {
    if record.is_past_expiry(now) || record.status == KeyStatus::Expired {
        return Err(KeygateError::KeyExpired);
    }

    if record.status == KeyStatus::Revoked {
        return Err(KeygateError::KeyRevoked);
    }

    if !lock_matches(record.ip_lock.as_deref(), Some(ip)) {
        return Err(KeygateError::IpLockMismatch);
    }

    if !lock_matches(record.hwid_lock.as_deref(), hwid) {
        return Err(KeygateError::HwidLockMismatch);
    }

    Ok(())
}
