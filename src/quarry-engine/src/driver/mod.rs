//! Pipelines and the drivers that run them.
//!
//! A [`Pipeline`] is an immutable chain of operator factories. Each
//! [`Driver`] instantiates one operator per factory and moves pages from
//! the head of the chain to the tail, one pass at a time.

mod driver;
mod pipeline;
mod result;

pub use driver::{Driver, Progress};
pub use pipeline::Pipeline;
pub use result::DriverResult;
