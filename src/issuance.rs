//! Issuance state machine.
//!
//! `request_link` → client follows the monetized link → provider calls
//! `handle_external_callback` → client calls `redeem` and receives a key.
//! The pending-link store enforces every transition; this module composes
//! URLs, mints keys and translates callback failures into redirect codes.

use crate::clock::Clock;
use crate::config::KeygateConfig;
use crate::crypto::digest::key_fingerprint;
use crate::crypto::token::TokenGenerator;
use crate::errors::{KeygateError, KeygateResult};
use crate::store::keys::{KeyStore, LicenseKey};
use crate::store::pending::PendingLinkStore;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// A freshly requested pending link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    /// Pending link id the client redeems later.
    pub link_id: String,

    /// Provider URL the client is sent to, carrying our callback URL.
    pub monetized_url: String,
}

/// How the provider callback resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The link is completed.
    Completed {
        /// The completed link id.
        link_id: String,
    },
    /// The callback was rejected with a machine-readable code.
    Rejected {
        /// One of `invalid_callback`, `expired_link`, `ip_mismatch`, `callback_failed`.
        code: &'static str,
    },
}

impl CallbackOutcome {
    /// Redirect target relative to the public base URL:
    /// `/?completed={link_id}` or `/?error={code}`.
    pub fn redirect_url(&self, base: &Url) -> String {
        let mut target = base.clone();
        target.set_path("/");
        target.set_query(None);
        match self {
            CallbackOutcome::Completed { link_id } => {
                target.query_pairs_mut().append_pair("completed", link_id);
            }
            CallbackOutcome::Rejected { code } => {
                target.query_pairs_mut().append_pair("error", code);
            }
        }
        target.to_string()
    }
}

/// Orchestrates link request, provider completion and key redemption.
#[derive(Clone)]
pub struct IssuanceFlow {
    links: PendingLinkStore,
    keys: KeyStore,
    tokens: TokenGenerator,
    clock: Arc<dyn Clock>,
    callback_url: Url,
    provider_url: Url,
    public_base: Url,
    key_prefix: String,
    key_bytes: usize,
}

impl IssuanceFlow {
    /// Create the flow. URLs in `config` are parsed once here.
    ///
    /// # Errors
    /// - `ConfigError` - a configured URL does not parse
    pub fn new(
        config: &KeygateConfig,
        links: PendingLinkStore,
        keys: KeyStore,
        tokens: TokenGenerator,
        clock: Arc<dyn Clock>,
    ) -> KeygateResult<Self> {
        let public_base = parse_url("public_base_url", &config.public_base_url)?;
        let callback_url = public_base.join(&config.callback_path).map_err(|e| {
            KeygateError::ConfigError(format!("invalid callback_path: {}", e))
        })?;
        let provider_url = parse_url("provider_url", &config.provider_url)?;

        Ok(Self {
            links,
            keys,
            tokens,
            clock,
            callback_url,
            provider_url,
            public_base,
            key_prefix: config.key_prefix.clone(),
            key_bytes: config.key_bytes,
        })
    }

    /// Public base URL redirects are resolved against.
    pub fn public_base(&self) -> &Url {
        &self.public_base
    }

    /// Create a pending link for `client_ip` and wrap our callback in the
    /// provider's redirect URL.
    ///
    /// # Errors
    /// - `GeneratorFailure` - no secure randomness for the link id
    pub fn request_link(&self, client_ip: &str) -> KeygateResult<LinkRequest> {
        let link = self.links.create(client_ip)?;

        let mut callback = self.callback_url.clone();
        callback.query_pairs_mut().append_pair("linkId", &link.id);

        let mut monetized = self.provider_url.clone();
        monetized
            .query_pairs_mut()
            .append_pair("r", callback.as_str());

        Ok(LinkRequest {
            link_id: link.id,
            monetized_url: monetized.to_string(),
        })
    }

    /// Handle the provider calling back for `link_id` from `caller_ip`.
    ///
    /// Never fails: every error becomes a `Rejected` code. Replays from the
    /// requesting IP resolve to `Completed` without further effect.
    pub fn handle_external_callback(
        &self,
        link_id: Option<&str>,
        caller_ip: &str,
    ) -> CallbackOutcome {
        let Some(link_id) = link_id.filter(|id| !id.is_empty()) else {
            return CallbackOutcome::Rejected {
                code: KeygateError::InvalidRequest("missing linkId".to_string()).callback_code(),
            };
        };

        match self.links.mark_completed(link_id, caller_ip) {
            Ok(_) => CallbackOutcome::Completed {
                link_id: link_id.to_string(),
            },
            Err(e) => {
                if matches!(e, KeygateError::Storage(_)) {
                    warn!(error = %e, "completion callback failed");
                }
                CallbackOutcome::Rejected {
                    code: e.callback_code(),
                }
            }
        }
    }

    /// Exchange a completed link for a license key locked to `caller_ip`
    /// and, when given, `hwid`.
    ///
    /// The key is generated before the link is consumed, so an entropy
    /// failure leaves the link redeemable.
    ///
    /// # Errors
    /// - `NotFound` / `NotCompleted` / `Expired` - from the pending-link store
    /// - `IpMismatch` (destructive) - bypass attempt; the link is gone
    /// - `GeneratorFailure` - no secure randomness for the key
    pub fn redeem(
        &self,
        link_id: &str,
        caller_ip: &str,
        hwid: Option<&str>,
    ) -> KeygateResult<LicenseKey> {
        let key = self.tokens.license_key(&self.key_prefix, self.key_bytes)?;
        self.links.redeem(link_id, caller_ip)?;

        let mut record = LicenseKey::new(key, self.clock.now_utc());
        record.ip_lock = Some(caller_ip.to_string());
        record.hwid_lock = hwid.map(str::to_string);
        self.keys.insert(record.clone())?;

        info!(
            key = %key_fingerprint(&record.key),
            ip = %caller_ip,
            hwid_locked = record.hwid_lock.is_some(),
            "license key issued"
        );
        Ok(record)
    }
}

fn parse_url(field: &str, value: &str) -> KeygateResult<Url> {
    Url::parse(value)
        .map_err(|e| KeygateError::ConfigError(format!("{} is not a valid URL: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::crypto::token::testing::FailingEntropy;
    use crate::errors::MismatchSeverity;
    use crate::store::keys::KeyStatus;
    use crate::store::memory::{MemoryKeys, MemoryPendingLinks};

    const IP_A: &str = "203.0.113.10";
    const IP_B: &str = "198.51.100.7";

    struct Fixture {
        flow: IssuanceFlow,
        links: PendingLinkStore,
        keys: KeyStore,
        clock: Arc<MockClock>,
    }

    fn setup_with(tokens: TokenGenerator) -> Fixture {
        let config = KeygateConfig {
            public_base_url: "https://keys.example.com".to_string(),
            provider_url: "https://linkvertise.com/123/abc".to_string(),
            ..KeygateConfig::default()
        };
        let clock = Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z"));
        let links = PendingLinkStore::new(
            Arc::new(MemoryPendingLinks::new()),
            TokenGenerator::default(),
            clock.clone(),
            config.pending_ttl_chrono(),
            config.link_id_bytes,
        );
        let keys = KeyStore::new(Arc::new(MemoryKeys::new()));
        let flow = IssuanceFlow::new(&config, links.clone(), keys.clone(), tokens, clock.clone())
            .unwrap();
        Fixture {
            flow,
            links,
            keys,
            clock,
        }
    }

    fn setup() -> Fixture {
        setup_with(TokenGenerator::default())
    }

    #[test]
    fn test_request_link_embeds_callback() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();

        let monetized = Url::parse(&request.monetized_url).unwrap();
        assert_eq!(monetized.host_str(), Some("linkvertise.com"));
        assert_eq!(monetized.path(), "/123/abc");

        let callback = monetized
            .query_pairs()
            .find(|(k, _)| k == "r")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let callback = Url::parse(&callback).unwrap();
        assert_eq!(callback.path(), "/api/linkvertise-callback");
        let link_id = callback
            .query_pairs()
            .find(|(k, _)| k == "linkId")
            .map(|(_, v)| v.into_owned());
        assert_eq!(link_id.as_deref(), Some(request.link_id.as_str()));
    }

    #[test]
    fn test_callback_missing_link_id() {
        let f = setup();
        assert_eq!(
            f.flow.handle_external_callback(None, IP_A),
            CallbackOutcome::Rejected {
                code: "invalid_callback"
            }
        );
        assert_eq!(
            f.flow.handle_external_callback(Some(""), IP_A),
            CallbackOutcome::Rejected {
                code: "invalid_callback"
            }
        );
    }

    #[test]
    fn test_callback_codes() {
        let f = setup();
        assert_eq!(
            f.flow.handle_external_callback(Some("unknown"), IP_A),
            CallbackOutcome::Rejected {
                code: "expired_link"
            }
        );

        let request = f.flow.request_link(IP_A).unwrap();
        assert_eq!(
            f.flow.handle_external_callback(Some(&request.link_id), IP_B),
            CallbackOutcome::Rejected {
                code: "ip_mismatch"
            }
        );
    }

    #[test]
    fn test_callback_replay_is_harmless() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        for _ in 0..3 {
            assert_eq!(
                f.flow
                    .handle_external_callback(Some(&request.link_id), IP_A),
                CallbackOutcome::Completed {
                    link_id: request.link_id.clone()
                }
            );
        }
        assert_eq!(f.links.len().unwrap(), 1);
    }

    #[test]
    fn test_redirect_urls() {
        let base = Url::parse("https://keys.example.com/app?x=1").unwrap();
        let ok = CallbackOutcome::Completed {
            link_id: "abc123".to_string(),
        };
        assert_eq!(ok.redirect_url(&base), "https://keys.example.com/?completed=abc123");
        let err = CallbackOutcome::Rejected {
            code: "ip_mismatch",
        };
        assert_eq!(err.redirect_url(&base), "https://keys.example.com/?error=ip_mismatch");
    }

    #[test]
    fn test_full_flow_mints_locked_key() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);

        let key = f
            .flow
            .redeem(&request.link_id, IP_A, Some("HWID-1"))
            .unwrap();
        assert!(key.key.starts_with("KEY-"));
        assert_eq!(key.ip_lock.as_deref(), Some(IP_A));
        assert_eq!(key.hwid_lock.as_deref(), Some("HWID-1"));
        assert_eq!(key.status, KeyStatus::Active);
        assert_eq!(key.used_count, 0);
        assert_eq!(f.keys.get(&key.key).unwrap(), Some(key));
        assert!(f.links.is_empty().unwrap());
    }

    #[test]
    fn test_redeem_without_completion() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        assert!(matches!(
            f.flow.redeem(&request.link_id, IP_A, None),
            Err(KeygateError::NotCompleted)
        ));
        assert!(f.keys.list().unwrap().is_empty());
    }

    #[test]
    fn test_redeem_twice() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);
        f.flow.redeem(&request.link_id, IP_A, None).unwrap();
        assert!(matches!(
            f.flow.redeem(&request.link_id, IP_A, None),
            Err(KeygateError::NotFound)
        ));
        assert_eq!(f.keys.list().unwrap().len(), 1);
    }

    #[test]
    fn test_redeem_from_other_ip_is_bypass() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);

        let err = f.flow.redeem(&request.link_id, IP_B, None).unwrap_err();
        assert!(matches!(
            err,
            KeygateError::IpMismatch {
                severity: MismatchSeverity::Destructive
            }
        ));
        assert!(matches!(
            f.flow.redeem(&request.link_id, IP_A, None),
            Err(KeygateError::NotFound)
        ));
        assert!(f.keys.list().unwrap().is_empty());
    }

    #[test]
    fn test_redeem_after_ttl() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);
        f.clock.advance(chrono::Duration::minutes(11));
        assert!(matches!(
            f.flow.redeem(&request.link_id, IP_A, None),
            Err(KeygateError::Expired)
        ));
    }

    #[test]
    fn test_generator_failure_keeps_link() {
        let f = setup_with(TokenGenerator::new(Arc::new(FailingEntropy)));
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);

        assert!(matches!(
            f.flow.redeem(&request.link_id, IP_A, None),
            Err(KeygateError::GeneratorFailure(_))
        ));
        assert!(f.links.get(&request.link_id).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_redemption_has_one_winner() {
        let f = setup();
        let request = f.flow.request_link(IP_A).unwrap();
        f.flow
            .handle_external_callback(Some(&request.link_id), IP_A);

        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| f.flow.redeem(&request.link_id, IP_A, None).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(winners, 1);
        assert_eq!(f.keys.list().unwrap().len(), 1);
    }
}
