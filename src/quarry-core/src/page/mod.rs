//! Pages and page builders.

mod builder;
mod page;

pub use builder::{PageBuilder, PageBuilderState};
pub use page::Page;
