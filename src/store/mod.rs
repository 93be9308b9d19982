//! Storage layer.
//!
//! Each record type is owned by exactly one backend. Backends expose a small
//! keyed contract; every read-then-write on a single record goes through
//! `modify`, which must run the closure under exclusive access to that
//! record. The in-memory backends in [`memory`] are the reference
//! implementation; a durable backend must execute `modify` as one bounded
//! transaction.

pub mod keys;
pub mod memory;
pub mod pending;

use crate::errors::KeygateResult;
use crate::meter::usage::UsageLogEntry;
use chrono::{DateTime, Utc};
use keys::LicenseKey;
use pending::PendingLink;

/// What `modify` should do with a pending link after the closure ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the (possibly mutated) entry.
    Keep,
    /// Delete the entry.
    Remove,
}

/// Backing storage for pending links.
pub trait PendingLinkBackend: Send + Sync {
    /// Insert a new pending link. Fails if the id is already present.
    fn insert(&self, link: PendingLink) -> KeygateResult<()>;

    /// Snapshot of a pending link.
    fn get(&self, id: &str) -> KeygateResult<Option<PendingLink>>;

    /// Atomically apply `apply` to the entry for `id`.
    ///
    /// Returns the entry as `apply` left it (taken before removal), or
    /// `None` without calling `apply` if no entry exists.
    fn modify(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut PendingLink) -> Disposition,
    ) -> KeygateResult<Option<PendingLink>>;

    /// Delete every entry created strictly before `cutoff`. Returns the count removed.
    fn remove_created_before(&self, cutoff: DateTime<Utc>) -> KeygateResult<usize>;

    /// Number of stored entries.
    fn len(&self) -> KeygateResult<usize>;
}

/// Backing storage for issued license keys.
pub trait KeyBackend: Send + Sync {
    /// Insert a new key. Fails if the key string is already present.
    fn insert(&self, key: LicenseKey) -> KeygateResult<()>;

    /// Snapshot of a key.
    fn get(&self, key: &str) -> KeygateResult<Option<LicenseKey>>;

    /// Atomically apply `apply` to the record for `key`.
    ///
    /// Returns the record after `apply`, or `None` without calling `apply`
    /// if the key does not exist.
    fn modify(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut LicenseKey),
    ) -> KeygateResult<Option<LicenseKey>>;

    /// Delete a key. Returns whether it existed.
    fn delete(&self, key: &str) -> KeygateResult<bool>;

    /// Snapshot of every key.
    fn list(&self) -> KeygateResult<Vec<LicenseKey>>;
}

/// Append-only backing storage for usage log entries.
pub trait UsageBackend: Send + Sync {
    /// Append an entry.
    fn append(&self, entry: UsageLogEntry) -> KeygateResult<()>;

    /// Snapshot of every entry in append order.
    fn entries(&self) -> KeygateResult<Vec<UsageLogEntry>>;
}
