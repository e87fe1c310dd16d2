//! Pipeline operators.
//!
//! Every operator implements the [`Operator`] contract and is created per
//! driver by an [`OperatorFactory`].
//!
//! | Operator | Role | Blocking |
//! |----------|------|----------|
//! | `AlignmentOperator` | source | No |
//! | `FilterProjectOperator` | streaming | No |
//! | `HashAggregationOperator` | grouping | Yes |

mod alignment;
mod filter_project;
mod traits;

pub use alignment::{AlignmentOperator, AlignmentOperatorFactory};
pub use filter_project::{
    ChannelProjection, FilterProjectOperator, FilterProjectOperatorFactory, PageProcessor,
};
pub use traits::{BlockedFuture, BoxedOperator, Operator, OperatorFactory, not_blocked};
