//! Keygate configuration.

use crate::crypto::token::MIN_TOKEN_BYTES;
use crate::KeygateError;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Default lifetime of a pending link (10 minutes).
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(10 * 60);

/// Policy for resolving the client IP at the HTTP boundary.
///
/// The core never looks at headers; it receives the IP this policy resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Header carrying the original client IP (e.g. `x-forwarded-for`).
    /// `None` means only the socket peer address is used.
    pub forwarded_header: Option<String>,

    /// Peers allowed to set `forwarded_header`. Empty trusts every peer.
    pub trusted_proxies: Vec<IpAddr>,
}

impl TrustPolicy {
    /// Resolve the client IP from the socket peer and the forwarded header value.
    ///
    /// The leftmost entry of a comma-separated header is the originating client.
    /// An entry that is not an IP address is ignored in favor of the peer.
    pub fn resolve(&self, peer: Option<IpAddr>, forwarded: Option<&str>) -> Option<String> {
        let peer_trusted = match peer {
            Some(ip) => self.trusted_proxies.is_empty() || self.trusted_proxies.contains(&ip),
            None => self.trusted_proxies.is_empty(),
        };

        if self.forwarded_header.is_some() && peer_trusted {
            let client = forwarded
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok());
            if let Some(client) = client {
                return Some(client.to_string());
            }
        }

        peer.map(|ip| ip.to_string())
    }
}

/// Configuration for the issuance flow, validation engine and HTTP surface.
#[derive(Debug, Clone)]
pub struct KeygateConfig {
    /// Public origin of this service, used for callback URLs and redirects.
    pub public_base_url: String,

    /// Monetized link of the completion provider. The callback URL is
    /// appended as its `r` query parameter.
    pub provider_url: String,

    /// Path the provider calls back on.
    pub callback_path: String,

    /// Lifetime of a pending link, measured from creation.
    pub pending_ttl: Duration,

    /// Random bytes per link id (hex-encoded).
    pub link_id_bytes: usize,

    /// Random bytes per license key (hex-encoded).
    pub key_bytes: usize,

    /// Prefix prepended to every minted license key.
    pub key_prefix: String,

    /// Client IP resolution policy.
    pub trust: TrustPolicy,

    /// Interval of the background sweep. `None` relies on sweep-on-create only.
    pub sweep_interval: Option<Duration>,

    /// Upper bound on keys minted by one bulk generation request.
    pub max_bulk_keys: usize,
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            provider_url: "https://linkvertise.com/YOUR_USER_ID/YOUR_LINK_ID".to_string(),
            callback_path: "/api/linkvertise-callback".to_string(),
            pending_ttl: DEFAULT_PENDING_TTL,
            link_id_bytes: 16,
            key_bytes: 16,
            key_prefix: "KEY-".to_string(),
            trust: TrustPolicy::default(),
            sweep_interval: None,
            max_bulk_keys: 100,
        }
    }
}

impl KeygateConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), KeygateError> {
        Url::parse(&self.public_base_url).map_err(|e| {
            KeygateError::ConfigError(format!("public_base_url is not a valid URL: {}", e))
        })?;
        Url::parse(&self.provider_url).map_err(|e| {
            KeygateError::ConfigError(format!("provider_url is not a valid URL: {}", e))
        })?;
        if !self.callback_path.starts_with('/') {
            return Err(KeygateError::ConfigError(
                "callback_path must start with '/'".to_string(),
            ));
        }
        if self.link_id_bytes < MIN_TOKEN_BYTES || self.key_bytes < MIN_TOKEN_BYTES {
            return Err(KeygateError::ConfigError(format!(
                "link_id_bytes and key_bytes must be at least {}, got {} and {}",
                MIN_TOKEN_BYTES, self.link_id_bytes, self.key_bytes
            )));
        }
        if self.pending_ttl.is_zero() {
            return Err(KeygateError::ConfigError(
                "pending_ttl cannot be zero".to_string(),
            ));
        }
        if self.max_bulk_keys == 0 {
            return Err(KeygateError::ConfigError(
                "max_bulk_keys cannot be zero".to_string(),
            ));
        }
        if matches!(self.sweep_interval, Some(d) if d.is_zero()) {
            return Err(KeygateError::ConfigError(
                "sweep_interval cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Pending TTL as a chrono duration for timestamp arithmetic.
    pub fn pending_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.pending_ttl).unwrap_or(chrono::Duration::MAX)
    }
}
