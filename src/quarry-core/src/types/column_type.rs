//! Column type tags.

use arrow::datatypes::DataType as ArrowDataType;
use serde::{Deserialize, Serialize};

use common_error::{QuarryError, QuarryResult};

/// Type tag of one column.
///
/// The set is closed: every block, builder and accumulator matches on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit IEEE floating point.
    Float64,
    /// Variable-length byte string.
    VarBinary,
}

impl ColumnType {
    /// Width in bytes of one value, or `None` for variable-length types.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int64 | Self::Float64 => Some(8),
            Self::VarBinary => None,
        }
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// The Arrow data type backing blocks of this type.
    pub const fn arrow_type(&self) -> ArrowDataType {
        match self {
            Self::Int64 => ArrowDataType::Int64,
            Self::Float64 => ArrowDataType::Float64,
            Self::VarBinary => ArrowDataType::Binary,
        }
    }

    /// Map an Arrow data type back to a column type.
    pub fn try_from_arrow(data_type: &ArrowDataType) -> QuarryResult<Self> {
        match data_type {
            ArrowDataType::Int64 => Ok(Self::Int64),
            ArrowDataType::Float64 => Ok(Self::Float64),
            ArrowDataType::Binary => Ok(Self::VarBinary),
            other => Err(QuarryError::type_error(format!(
                "unsupported arrow type {other}"
            ))),
        }
    }

    /// Get the display name for this type.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Int64 => "Int64",
            Self::Float64 => "Float64",
            Self::VarBinary => "VarBinary",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size() {
        assert_eq!(ColumnType::Int64.fixed_size(), Some(8));
        assert_eq!(ColumnType::Float64.fixed_size(), Some(8));
        assert_eq!(ColumnType::VarBinary.fixed_size(), None);
    }

    #[test]
    fn test_arrow_mapping() {
        for ty in [ColumnType::Int64, ColumnType::Float64, ColumnType::VarBinary] {
            assert_eq!(ColumnType::try_from_arrow(&ty.arrow_type()).unwrap(), ty);
        }
        assert!(ColumnType::try_from_arrow(&ArrowDataType::Utf8).is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(ColumnType::VarBinary.to_string(), "VarBinary");
    }
}
