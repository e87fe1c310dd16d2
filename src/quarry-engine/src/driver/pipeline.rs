//! Operator factory chains.

use std::sync::Arc;

use common_error::{QuarryError, QuarryResult};
use quarry_core::TypeDescriptor;

use super::Driver;
use crate::context::DriverContext;
use crate::operators::OperatorFactory;

/// An ordered chain of operator factories, head first.
///
/// The head is a source operator; every later factory consumes the pages
/// of the one before it.
#[derive(Debug, Clone)]
pub struct Pipeline {
    factories: Vec<Arc<dyn OperatorFactory>>,
}

impl Pipeline {
    /// Create a pipeline over `factories`.
    pub fn new(factories: Vec<Arc<dyn OperatorFactory>>) -> QuarryResult<Self> {
        if factories.is_empty() {
            return Err(QuarryError::invalid_parameter(
                "pipeline needs at least one operator factory",
            ));
        }
        Ok(Self { factories })
    }

    /// Get the factories.
    pub fn factories(&self) -> &[Arc<dyn OperatorFactory>] {
        &self.factories
    }

    /// Types of the pages the pipeline emits.
    pub fn output_types(&self) -> &TypeDescriptor {
        // non-empty by construction
        self.factories[self.factories.len() - 1].output_types()
    }

    /// Create a driver running a fresh operator chain in `ctx`.
    pub fn instantiate(&self, ctx: DriverContext) -> QuarryResult<Driver> {
        let operators = self
            .factories
            .iter()
            .map(|factory| factory.create_operator(&ctx))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(Driver::new(ctx, operators))
    }

    /// Close every factory. No driver may be instantiated afterwards.
    pub fn close(&self) {
        for factory in &self.factories {
            factory.close();
        }
    }
}
