//! Error types and result aliases for Quarry.
//!
//! Every crate in the workspace reports failures through [`QuarryError`] so
//! that a driver can tell usage defects apart from resource exhaustion.

mod error;

pub use error::{GenericError, QuarryError, QuarryResult};
