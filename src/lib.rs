//! # Keygate
//!
//! **Task-gated license key issuance and IP/HWID-locked key validation.**
//!
//! A client earns a license key by completing a third-party monetized
//! redirect. Keygate tracks each attempt as a short-lived pending link,
//! accepts the provider's completion callback only from the requesting IP,
//! and mints a key on redemption. Keys are then validated against their IP
//! and hardware-id locks, expiry and revocation, with every attempt logged.
//!
//! ## Features
//!
//! - **Single-use pending links**: redemption deletes the link atomically
//! - **Anti-bypass checks**: skipped tasks, replayed callbacks and
//!   foreign-IP redemptions are rejected; the last one burns the link
//! - **Self-expiring store**: links older than the TTL are swept on every
//!   link creation, with an optional background sweeper
//! - **Lock-bound keys**: optional IP and hardware-id locks, lazy expiry,
//!   terminal revocation
//! - **Usage log**: one entry per validation attempt, success or not
//!
//! ## Quickstart
//!
//! ```no_run
//! use keygate::{Keygate, KeygateConfig};
//!
//! fn main() -> Result<(), keygate::KeygateError> {
//!     let keygate = Keygate::new(KeygateConfig::default())?;
//!
//!     let request = keygate.issuance().request_link("203.0.113.10")?;
//!     // ... the client completes the task; the provider calls back ...
//!     keygate
//!         .issuance()
//!         .handle_external_callback(Some(&request.link_id), "203.0.113.10");
//!
//!     let key = keygate
//!         .issuance()
//!         .redeem(&request.link_id, "203.0.113.10", Some("HWID-1"))?;
//!     let validated = keygate
//!         .validation()
//!         .validate(&key.key, "203.0.113.10", Some("HWID-1"))?;
//!     println!("uses: {}", validated.usage_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Keygate rejects:
//! - **Skipped tasks**: redemption before the callback fails
//! - **Callback replay**: completion is idempotent and IP-checked
//! - **Double redemption**: the link no longer exists after first use
//! - **Key sharing**: locked keys fail from another IP or machine
//!
//! Keygate does **not** sign keys or verify hardware ids. A hardware id is
//! an opaque client-supplied string and can be spoofed by a determined
//! client. The IP check is the only anti-automation measure.

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Storage layer
pub mod store;

// Metering layer
pub mod meter;

// Policy layer
pub mod policy;

// Issuance and validation
pub mod issuance;
pub mod validation;

// Administrative collaborator
pub mod admin;

// Protocol layer
pub mod protocol;

// Manager (main public API)
pub mod manager;

// HTTP layer
pub mod server;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::{KeygateConfig, TrustPolicy};
pub use errors::{KeygateError, KeygateResult, MismatchSeverity};
pub use issuance::{CallbackOutcome, IssuanceFlow, LinkRequest};
pub use manager::{Backends, Keygate};
pub use store::keys::{KeyStatus, LicenseKey};
pub use store::pending::{LinkState, PendingLink};
pub use validation::{Validated, ValidationEngine};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
