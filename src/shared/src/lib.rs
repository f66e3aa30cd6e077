//! Shared types for the studio lead pipeline

pub mod types;

pub use types::*;
