//! Access policy for license keys.

pub mod access;
