//! Usage accounting.

pub mod usage;
