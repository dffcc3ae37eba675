//! Tracing/logging setup shared by every process embedding the ledger.

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use crate::tracing::{DEFAULT_FILTER, init, init_for_tests};
