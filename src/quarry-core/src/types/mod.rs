//! Type system for Quarry columns.
//!
//! [`ColumnType`] tags a single column, [`TypeDescriptor`] orders the tags of a
//! page stream, and [`Value`] carries one cell across API edges.

mod column_type;
mod descriptor;
mod value;

pub use column_type::ColumnType;
pub use descriptor::TypeDescriptor;
pub use value::Value;
