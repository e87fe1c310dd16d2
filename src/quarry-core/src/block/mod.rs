//! Columnar blocks, their cursors and builders.

mod block;
mod builder;
mod cursor;

pub use block::Block;
pub use builder::BlockBuilder;
pub use cursor::BlockCursor;
