//! Common types and utilities for RiskStream
//!
//! This crate provides the shared domain types used by every layer of the
//! live risk pipeline.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Instrument keys, market data values, instrument definitions
//! - [`registry`] - Explicitly constructed instrument lookup

pub mod error;
pub mod registry;
pub mod types;

pub use error::{Error, Result};
pub use registry::InstrumentRegistry;
pub use types::*;
