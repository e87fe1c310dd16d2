//! Operator contract and factories.

use std::fmt::Debug;

use futures::FutureExt;
use futures::future::BoxFuture;

use common_error::QuarryResult;
use quarry_core::{Page, TypeDescriptor};

use crate::context::{DriverContext, OperatorContext};

/// Future an operator returns while it cannot make progress.
pub type BlockedFuture = BoxFuture<'static, ()>;

/// A future that is already resolved.
pub fn not_blocked() -> BlockedFuture {
    futures::future::ready(()).boxed()
}

/// A streaming stage of a pipeline.
///
/// Operators never call each other. A driver moves pages between adjacent
/// operators using the calls below, and an operator only ever reacts.
///
/// # Lifecycle
///
/// ```text
/// (needs_input → add_input | get_output)* → finish → get_output* → is_finished
/// ```
///
/// - `add_input` may only be called while `needs_input` is true. Calling it
///   otherwise is a usage defect reported as `IllegalState`.
/// - `get_output` returns `None` when nothing is ready yet; that is not the
///   end of the stream. The end is `is_finished`.
/// - `finish` announces that no more input will arrive. It is idempotent.
/// - Once `is_finished` is true it stays true, `needs_input` is false and
///   `get_output` returns `None`.
/// - Every page returned matches `output_types` channel for channel.
pub trait Operator: Send + Debug {
    /// Accounting for this operator.
    fn operator_context(&self) -> &OperatorContext;

    /// Types of the pages this operator emits.
    fn output_types(&self) -> &TypeDescriptor;

    /// Check if the operator will accept a page now.
    fn needs_input(&self) -> bool;

    /// Hand the operator one page.
    fn add_input(&mut self, page: Page) -> QuarryResult<()>;

    /// Take the next ready page, if any.
    fn get_output(&mut self) -> QuarryResult<Option<Page>>;

    /// Future that resolves once the operator can make progress again.
    fn is_blocked(&self) -> BlockedFuture {
        not_blocked()
    }

    /// Announce the end of input.
    fn finish(&mut self);

    /// Check if the operator has emitted everything it ever will.
    fn is_finished(&self) -> bool;
}

/// Boxed operator for dynamic dispatch.
pub type BoxedOperator = Box<dyn Operator>;

/// Creates one operator per driver.
///
/// Factories are immutable once built and shared between drivers, so all
/// per-execution state lives in the operators they create.
pub trait OperatorFactory: Send + Sync + Debug {
    /// Types of the pages the created operators emit.
    fn output_types(&self) -> &TypeDescriptor;

    /// Create an operator bound to `ctx`.
    fn create_operator(&self, ctx: &DriverContext) -> QuarryResult<BoxedOperator>;

    /// Release anything the factory holds once no more drivers start.
    fn close(&self) {}
}
