//! Keygate - the main public API.
//!
//! `Keygate` wires the stores, the issuance flow, the validation engine and
//! the administrative service over one set of backends, one clock and one
//! token generator. Create one instance per process and share it.

use crate::admin::AdminService;
use crate::clock::{Clock, SystemClock};
use crate::config::KeygateConfig;
use crate::crypto::token::TokenGenerator;
use crate::errors::KeygateResult;
use crate::issuance::IssuanceFlow;
use crate::meter::usage::UsageLog;
use crate::store::keys::KeyStore;
use crate::store::memory::{MemoryKeys, MemoryPendingLinks, MemoryUsage};
use crate::store::pending::PendingLinkStore;
use crate::store::{KeyBackend, PendingLinkBackend, UsageBackend};
use crate::validation::ValidationEngine;
use std::sync::Arc;

/// Storage backends, one per record type.
#[derive(Clone)]
pub struct Backends {
    /// Pending links.
    pub links: Arc<dyn PendingLinkBackend>,
    /// Issued keys.
    pub keys: Arc<dyn KeyBackend>,
    /// Usage log.
    pub usage: Arc<dyn UsageBackend>,
}

impl Backends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            links: Arc::new(MemoryPendingLinks::new()),
            keys: Arc::new(MemoryKeys::new()),
            usage: Arc::new(MemoryUsage::new()),
        }
    }
}

/// The assembled service.
pub struct Keygate {
    config: KeygateConfig,
    links: PendingLinkStore,
    keys: KeyStore,
    issuance: IssuanceFlow,
    validation: ValidationEngine,
    admin: AdminService,
}

impl Keygate {
    /// Create a service over in-memory backends with the system clock and
    /// the OS random source.
    ///
    /// # Errors
    /// - `ConfigError` - configuration validation fails
    pub fn new(config: KeygateConfig) -> KeygateResult<Self> {
        Self::with_parts(
            config,
            Backends::in_memory(),
            Arc::new(SystemClock),
            TokenGenerator::default(),
        )
    }

    /// Create a service from explicit parts: durable backends in
    /// production, a controllable clock in tests.
    ///
    /// # Errors
    /// - `ConfigError` - configuration validation fails
    pub fn with_parts(
        config: KeygateConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
        tokens: TokenGenerator,
    ) -> KeygateResult<Self> {
        config.validate()?;

        let links = PendingLinkStore::new(
            backends.links,
            tokens.clone(),
            clock.clone(),
            config.pending_ttl_chrono(),
            config.link_id_bytes,
        );
        let keys = KeyStore::new(backends.keys);
        let usage = UsageLog::new(backends.usage, clock.clone());

        let issuance = IssuanceFlow::new(
            &config,
            links.clone(),
            keys.clone(),
            tokens.clone(),
            clock.clone(),
        )?;
        let validation = ValidationEngine::new(keys.clone(), usage.clone(), clock.clone());
        let admin = AdminService::new(
            keys.clone(),
            usage,
            tokens,
            clock,
            config.key_prefix.clone(),
            config.key_bytes,
            config.max_bulk_keys,
        );

        Ok(Self {
            config,
            links,
            keys,
            issuance,
            validation,
            admin,
        })
    }

    /// Issuance state machine.
    pub fn issuance(&self) -> &IssuanceFlow {
        &self.issuance
    }

    /// Validation engine.
    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    /// Administrative operations.
    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    /// Pending-link store, for sweeping and inspection.
    pub fn links(&self) -> &PendingLinkStore {
        &self.links
    }

    /// Key store.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Get the current configuration.
    pub fn config(&self) -> &KeygateConfig {
        &self.config
    }
}
