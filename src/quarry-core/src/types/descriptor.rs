//! Ordered column type lists.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use common_error::{QuarryError, QuarryResult};

use super::ColumnType;

/// The fixed schema of a page stream: one type per channel, in order.
///
/// A descriptor is immutable once built. Operators declare one for their
/// output and every page they emit must match it channel for channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeDescriptor {
    types: Vec<ColumnType>,
}

impl TypeDescriptor {
    /// Create a descriptor from an ordered list of types.
    pub fn new(types: impl Into<Vec<ColumnType>>) -> Self {
        Self {
            types: types.into(),
        }
    }

    /// A descriptor with no channels.
    pub const fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the descriptor has no channels.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type of one channel.
    pub fn get(&self, channel: usize) -> Option<ColumnType> {
        self.types.get(channel).copied()
    }

    /// Type of one channel, failing if the channel does not exist.
    pub fn channel(&self, channel: usize) -> QuarryResult<ColumnType> {
        self.get(channel).ok_or_else(|| {
            QuarryError::invalid_parameter(format!(
                "channel {channel} out of range for {} channels",
                self.len()
            ))
        })
    }

    /// All types in channel order.
    pub fn types(&self) -> &[ColumnType] {
        &self.types
    }

    /// Iterate over channel types.
    pub fn iter(&self) -> impl Iterator<Item = ColumnType> + '_ {
        self.types.iter().copied()
    }

    /// Descriptor made of the selected channels, in the given order.
    pub fn project(&self, channels: &[usize]) -> QuarryResult<Self> {
        channels
            .iter()
            .map(|&channel| self.channel(channel))
            .collect::<QuarryResult<Vec<_>>>()
            .map(Self::new)
    }

    /// Descriptor with `other`'s channels appended after this one's.
    pub fn concat(&self, other: &Self) -> Self {
        let mut types = self.types.clone();
        types.extend_from_slice(&other.types);
        Self::new(types)
    }
}

impl Index<usize> for TypeDescriptor {
    type Output = ColumnType;

    fn index(&self, channel: usize) -> &ColumnType {
        &self.types[channel]
    }
}

impl From<Vec<ColumnType>> for TypeDescriptor {
    fn from(types: Vec<ColumnType>) -> Self {
        Self::new(types)
    }
}

impl FromIterator<ColumnType> for TypeDescriptor {
    fn from_iter<I: IntoIterator<Item = ColumnType>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect::<Vec<_>>())
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}
