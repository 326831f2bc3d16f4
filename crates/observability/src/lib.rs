//! Observability infrastructure for RiskStream
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//! - Per-service metric handles for the pub-sub layers
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("riskstream", LogFormat::Pretty)?;
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, ServiceMetrics};
