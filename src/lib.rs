//! Quarry - columnar, pull-driven query execution core
//!
//! Quarry runs chains of composable operators over typed columnar pages:
//! a source zipping independent column sources, streaming filter and
//! projection, and hash aggregation with partial/final merge.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use quarry_core as core;
pub use quarry_engine as engine;

/// Quarry version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
