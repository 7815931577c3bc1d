//! Shared types, error definitions, and utilities used across all walink crates.

pub mod error;
pub mod types;

pub use error::{Error, Result};
