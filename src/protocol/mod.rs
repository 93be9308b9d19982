//! JSON wire types for the HTTP surface.

pub mod models;
