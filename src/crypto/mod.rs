//! Cryptographic primitives: secure token generation and key fingerprints.

pub mod digest;
pub mod token;
