//! Secure random token generation for link ids and license keys.
//!
//! Tokens are hex-encoded so they are safe in URLs, query strings and headers.
//! The entropy source is injectable for tests, but the only production source
//! is the operating system CSPRNG. A failing source is a hard error; there is
//! no fallback generator.

use crate::KeygateError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

/// Minimum random bytes per token (128 bits).
pub const MIN_TOKEN_BYTES: usize = 16;

/// Source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely with random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), KeygateError>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), KeygateError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| KeygateError::GeneratorFailure(e.to_string()))
    }
}

/// Token generator over an entropy source.
#[derive(Clone)]
pub struct TokenGenerator {
    source: Arc<dyn EntropySource>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy))
    }
}

impl TokenGenerator {
    /// Create a generator drawing from `source`.
    pub fn new(source: Arc<dyn EntropySource>) -> Self {
        Self { source }
    }

    /// Generate `byte_length` random bytes, lowercase hex-encoded.
    ///
    /// # Errors
    /// - `ConfigError` - `byte_length` is below 128 bits
    /// - `GeneratorFailure` - the entropy source is unavailable
    pub fn new_token(&self, byte_length: usize) -> Result<String, KeygateError> {
        if byte_length < MIN_TOKEN_BYTES {
            return Err(KeygateError::ConfigError(format!(
                "token length must be at least {} bytes, got {}",
                MIN_TOKEN_BYTES, byte_length
            )));
        }
        let mut buf = vec![0u8; byte_length];
        self.source.fill(&mut buf)?;
        Ok(hex::encode(buf))
    }

    /// Generate a license key: `prefix` followed by uppercase hex.
    pub fn license_key(&self, prefix: &str, byte_length: usize) -> Result<String, KeygateError> {
        let body = self.new_token(byte_length)?.to_uppercase();
        Ok(format!("{}{}", prefix, body))
    }
}
