//! Runtime configuration and the contexts operators run in.

mod driver;
mod operator;

pub use driver::{CancellationHandle, DriverContext, RuntimeConfig};
pub use operator::OperatorContext;
