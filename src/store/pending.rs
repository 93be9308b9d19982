//! Pending-link store.
//!
//! A pending link represents one in-flight issuance attempt. It is created
//! when a client asks for a monetized link, completed by the provider
//! callback, and consumed by redemption. Expired links are swept on every
//! `create`, so the store stays bounded without a scheduler.

use super::{Disposition, PendingLinkBackend};
use crate::clock::Clock;
use crate::crypto::token::TokenGenerator;
use crate::errors::{KeygateError, KeygateResult, MismatchSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An in-flight issuance attempt awaiting provider completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLink {
    /// Random link id, the lookup key.
    pub id: String,

    /// When the link was created.
    pub created_at: DateTime<Utc>,

    /// Client IP that requested the link.
    pub requester_ip: String,

    /// Set once by the provider callback.
    pub completed: bool,
}

/// Observable state of an issuance attempt.
///
/// A link the client has not yet been redirected for is indistinguishable
/// from one awaiting the callback, so both are `AwaitingCompletion`. A
/// redeemed link no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Callback has not completed the link yet.
    AwaitingCompletion,
    /// Callback completed the link; it can be redeemed.
    Completed,
}

impl PendingLink {
    /// Current state of this link.
    pub fn state(&self) -> LinkState {
        if self.completed {
            LinkState::Completed
        } else {
            LinkState::AwaitingCompletion
        }
    }

    /// Whether the link is older than `ttl` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Result of a successful `mark_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// This call flipped the link to completed.
    Completed,
    /// The link was already completed; nothing changed.
    AlreadyCompleted,
}

/// Pending-link lifecycle over a storage backend.
#[derive(Clone)]
pub struct PendingLinkStore {
    backend: Arc<dyn PendingLinkBackend>,
    tokens: TokenGenerator,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    id_bytes: usize,
}

impl PendingLinkStore {
    /// Create a store over `backend`.
    pub fn new(
        backend: Arc<dyn PendingLinkBackend>,
        tokens: TokenGenerator,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        id_bytes: usize,
    ) -> Self {
        Self {
            backend,
            tokens,
            clock,
            ttl,
            id_bytes,
        }
    }

    /// Create a pending link for `requester_ip` and sweep expired links.
    ///
    /// # Errors
    /// - `GeneratorFailure` - no secure randomness for the link id
    pub fn create(&self, requester_ip: &str) -> KeygateResult<PendingLink> {
        let id = self.tokens.new_token(self.id_bytes)?;
        let link = PendingLink {
            id,
            created_at: self.clock.now_utc(),
            requester_ip: requester_ip.to_string(),
            completed: false,
        };
        self.backend.insert(link.clone())?;
        debug!(link_id = %link.id, ip = %requester_ip, "pending link created");

        self.sweep_expired()?;
        Ok(link)
    }

    /// Delete every link older than the TTL. Returns the count removed.
    pub fn sweep_expired(&self) -> KeygateResult<usize> {
        let cutoff = self
            .clock
            .now_utc()
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.backend.remove_created_before(cutoff)?;
        if removed > 0 {
            debug!(removed, "swept expired pending links");
        }
        Ok(removed)
    }

    /// Mark a link completed on behalf of the provider callback.
    ///
    /// Idempotent for the requesting IP. A mismatched IP leaves the link
    /// untouched so a retry from the right network can still succeed.
    ///
    /// # Errors
    /// - `NotFound` - no such link
    /// - `IpMismatch` (retryable) - `caller_ip` is not the requester
    pub fn mark_completed(&self, id: &str, caller_ip: &str) -> KeygateResult<Completion> {
        let mut outcome = Err(KeygateError::NotFound);
        self.backend.modify(id, &mut |link| {
            outcome = if link.requester_ip != caller_ip {
                Err(KeygateError::IpMismatch {
                    severity: MismatchSeverity::Retryable,
                })
            } else if link.completed {
                Ok(Completion::AlreadyCompleted)
            } else {
                link.completed = true;
                Ok(Completion::Completed)
            };
            Disposition::Keep
        })?;

        match &outcome {
            Ok(Completion::Completed) => info!(link_id = %id, "pending link completed"),
            Ok(Completion::AlreadyCompleted) => {
                debug!(link_id = %id, "duplicate completion callback")
            }
            Err(KeygateError::IpMismatch { .. }) => {
                warn!(link_id = %id, ip = %caller_ip, "completion callback from foreign IP")
            }
            Err(_) => debug!(link_id = %id, "completion callback for unknown link"),
        }
        outcome
    }

    /// Consume a completed link.
    ///
    /// Checks run in order: existence, completion, IP, age. Success deletes
    /// the link, so a second redemption fails with `NotFound`.
    ///
    /// # Errors
    /// - `NotFound` - no such link
    /// - `NotCompleted` - callback has not completed the link (link kept)
    /// - `IpMismatch` (destructive) - `caller_ip` is not the requester (link deleted)
    /// - `Expired` - link is older than the TTL (link deleted)
    pub fn redeem(&self, id: &str, caller_ip: &str) -> KeygateResult<PendingLink> {
        let now = self.clock.now_utc();
        let ttl = self.ttl;
        let mut outcome = Err(KeygateError::NotFound);

        let snapshot = self.backend.modify(id, &mut |link| {
            if !link.completed {
                outcome = Err(KeygateError::NotCompleted);
                return Disposition::Keep;
            }
            if link.requester_ip != caller_ip {
                outcome = Err(KeygateError::IpMismatch {
                    severity: MismatchSeverity::Destructive,
                });
                return Disposition::Remove;
            }
            if link.is_expired(now, ttl) {
                outcome = Err(KeygateError::Expired);
                return Disposition::Remove;
            }
            outcome = Ok(());
            Disposition::Remove
        })?;

        if let Err(e) = outcome {
            if e.is_bypass_attempt() {
                warn!(link_id = %id, ip = %caller_ip, "bypass attempt: redemption from foreign IP, link revoked");
            } else {
                debug!(link_id = %id, error = %e, "redemption rejected");
            }
            return Err(e);
        }
        snapshot.ok_or(KeygateError::NotFound)
    }

    /// Snapshot of a link, if present.
    pub fn get(&self, id: &str) -> KeygateResult<Option<PendingLink>> {
        self.backend.get(id)
    }

    /// Number of links currently stored, including expired but unswept ones.
    pub fn len(&self) -> KeygateResult<usize> {
        self.backend.len()
    }

    /// Whether no links are stored.
    pub fn is_empty(&self) -> KeygateResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::crypto::token::testing::FailingEntropy;
    use crate::store::memory::MemoryPendingLinks;

    const IP_A: &str = "203.0.113.10";
    const IP_B: &str = "198.51.100.7";

    fn setup() -> (PendingLinkStore, Arc<MockClock>) {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let store = PendingLinkStore::new(
            Arc::new(MemoryPendingLinks::new()),
            TokenGenerator::default(),
            clock.clone(),
            chrono::Duration::minutes(10),
            16,
        );
        (store, clock)
    }

    #[test]
    fn test_create_initial_state() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();
        assert_eq!(link.id.len(), 32);
        assert_eq!(link.requester_ip, IP_A);
        assert_eq!(link.state(), LinkState::AwaitingCompletion);
        assert_eq!(store.get(&link.id).unwrap(), Some(link));
    }

    #[test]
    fn test_create_fails_hard_without_entropy() {
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let store = PendingLinkStore::new(
            Arc::new(MemoryPendingLinks::new()),
            TokenGenerator::new(Arc::new(FailingEntropy)),
            clock,
            chrono::Duration::minutes(10),
            16,
        );
        assert!(matches!(
            store.create(IP_A),
            Err(KeygateError::GeneratorFailure(_))
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_create_sweeps_expired_links() {
        let (store, clock) = setup();
        let ids: Vec<String> = (0..5).map(|_| store.create(IP_A).unwrap().id).collect();

        clock.advance(chrono::Duration::minutes(11));
        assert_eq!(store.len().unwrap(), 5);

        let fresh = store.create(IP_A).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        for id in &ids {
            assert!(store.get(id).unwrap().is_none());
        }
        assert!(store.get(&fresh.id).unwrap().is_some());
    }

    #[test]
    fn test_link_exactly_at_ttl_survives_sweep() {
        let (store, clock) = setup();
        let link = store.create(IP_A).unwrap();
        clock.advance(chrono::Duration::minutes(10));
        store.create(IP_B).unwrap();
        assert!(store.get(&link.id).unwrap().is_some());
    }

    #[test]
    fn test_mark_completed_is_idempotent() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();

        assert_eq!(
            store.mark_completed(&link.id, IP_A).unwrap(),
            Completion::Completed
        );
        assert_eq!(
            store.mark_completed(&link.id, IP_A).unwrap(),
            Completion::AlreadyCompleted
        );
        let stored = store.get(&link.id).unwrap().unwrap();
        assert_eq!(stored.state(), LinkState::Completed);
    }

    #[test]
    fn test_mark_completed_unknown_link() {
        let (store, _) = setup();
        assert!(matches!(
            store.mark_completed("nope", IP_A),
            Err(KeygateError::NotFound)
        ));
    }

    #[test]
    fn test_mark_completed_ip_mismatch_keeps_link() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();

        let err = store.mark_completed(&link.id, IP_B).unwrap_err();
        assert!(matches!(
            err,
            KeygateError::IpMismatch {
                severity: MismatchSeverity::Retryable
            }
        ));
        let stored = store.get(&link.id).unwrap().unwrap();
        assert!(!stored.completed);

        store.mark_completed(&link.id, IP_A).unwrap();
        let redeemed = store.redeem(&link.id, IP_A).unwrap();
        assert_eq!(redeemed.id, link.id);
    }

    #[test]
    fn test_redeem_is_single_use() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();
        store.mark_completed(&link.id, IP_A).unwrap();

        let redeemed = store.redeem(&link.id, IP_A).unwrap();
        assert!(redeemed.completed);
        assert!(matches!(
            store.redeem(&link.id, IP_A),
            Err(KeygateError::NotFound)
        ));
    }

    #[test]
    fn test_redeem_not_completed_keeps_link() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();
        assert!(matches!(
            store.redeem(&link.id, IP_A),
            Err(KeygateError::NotCompleted)
        ));
        assert!(store.get(&link.id).unwrap().is_some());
    }

    #[test]
    fn test_redeem_ip_mismatch_deletes_completed_link() {
        let (store, _) = setup();
        let link = store.create(IP_A).unwrap();
        store.mark_completed(&link.id, IP_A).unwrap();

        let err = store.redeem(&link.id, IP_B).unwrap_err();
        assert!(err.is_bypass_attempt());
        assert!(store.get(&link.id).unwrap().is_none());
        assert!(matches!(
            store.redeem(&link.id, IP_A),
            Err(KeygateError::NotFound)
        ));
    }

    #[test]
    fn test_redeem_expired_deletes_link() {
        let (store, clock) = setup();
        let link = store.create(IP_A).unwrap();
        store.mark_completed(&link.id, IP_A).unwrap();

        clock.advance(chrono::Duration::minutes(10) + chrono::Duration::seconds(1));
        assert!(matches!(
            store.redeem(&link.id, IP_A),
            Err(KeygateError::Expired)
        ));
        assert!(store.get(&link.id).unwrap().is_none());
    }

    #[test]
    fn test_sweep_expired_without_create() {
        let (store, clock) = setup();
        store.create(IP_A).unwrap();
        store.create(IP_B).unwrap();
        clock.advance(chrono::Duration::minutes(15));
        assert_eq!(store.sweep_expired().unwrap(), 2);
        assert!(store.is_empty().unwrap());
    }
}
