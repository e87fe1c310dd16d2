//! Group key hashing.
//!
//! Each row's key columns are encoded into one byte string:
//!
//! ```text
//! per column: tag (0 = null, 1 = value), then
//!   Int64     8 bytes little-endian
//!   Float64   8 bytes of the IEEE bit pattern, little-endian
//!   VarBinary 4-byte little-endian length, then the bytes
//! ```
//!
//! The encoding is prefix free, so two rows share a group exactly when
//! their keys are equal value by value (bit-wise for floats, byte-wise for
//! binary, and null equal to null).

use std::collections::HashMap;
use std::mem::size_of;

use common_error::{QuarryError, QuarryResult};
use quarry_core::{Block, ColumnType, Page, PageBuilder, TypeDescriptor};

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;

/// Per-entry bookkeeping charged on top of the key bytes.
const ENTRY_OVERHEAD: usize = size_of::<Box<[u8]>>() + size_of::<usize>() + size_of::<u64>();

/// Maps group keys to dense group ids in first-seen order.
#[derive(Debug)]
pub struct GroupByHash {
    channels: Vec<usize>,
    types: TypeDescriptor,
    groups: HashMap<Box<[u8]>, usize>,
    key_bytes: usize,
    scratch: Vec<u8>,
}

impl GroupByHash {
    /// Group by `channels` of pages typed `input_types`.
    pub fn try_new(
        input_types: &TypeDescriptor,
        channels: Vec<usize>,
        expected_groups: usize,
    ) -> QuarryResult<Self> {
        let types = input_types.project(&channels)?;
        Ok(Self {
            channels,
            types,
            groups: HashMap::with_capacity(expected_groups),
            key_bytes: 0,
            scratch: Vec::new(),
        })
    }

    /// Types of the key columns.
    pub const fn types(&self) -> &TypeDescriptor {
        &self.types
    }

    /// Number of groups seen so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Group id of every row of `page`, creating groups for new keys.
    pub fn get_group_ids(&mut self, page: &Page) -> QuarryResult<Vec<usize>> {
        let blocks = self
            .channels
            .iter()
            .map(|&c| page.block(c))
            .collect::<QuarryResult<Vec<_>>>()?;

        let mut group_ids = Vec::with_capacity(page.position_count());
        for position in 0..page.position_count() {
            self.scratch.clear();
            for block in &blocks {
                encode_value(block, position, &mut self.scratch)?;
            }
            let group_id = match self.groups.get(self.scratch.as_slice()) {
                Some(&group_id) => group_id,
                None => self.insert_scratch(),
            };
            group_ids.push(group_id);
        }
        Ok(group_ids)
    }

    /// Create the group with the empty key. Used by global aggregations,
    /// which have no key columns and always produce one group.
    pub fn ensure_global_group(&mut self) {
        if self.channels.is_empty() && self.groups.is_empty() {
            self.scratch.clear();
            self.insert_scratch();
        }
    }

    /// Estimated heap footprint of the table.
    pub fn estimated_size(&self) -> usize {
        self.key_bytes + self.groups.capacity() * ENTRY_OVERHEAD
    }

    /// Consume the table, returning keys ordered by group id.
    pub fn into_keys(self) -> GroupKeys {
        let mut entries: Vec<(usize, Box<[u8]>)> = self
            .groups
            .into_iter()
            .map(|(key, group_id)| (group_id, key))
            .collect();
        entries.sort_unstable_by_key(|(group_id, _)| *group_id);
        GroupKeys {
            types: self.types,
            keys: entries.into_iter().map(|(_, key)| key).collect(),
        }
    }

    fn insert_scratch(&mut self) -> usize {
        let group_id = self.groups.len();
        self.key_bytes += self.scratch.len();
        self.groups
            .insert(self.scratch.clone().into_boxed_slice(), group_id);
        group_id
    }
}

/// Encoded group keys in group id order, ready for emission.
#[derive(Debug)]
pub struct GroupKeys {
    types: TypeDescriptor,
    keys: Vec<Box<[u8]>>,
}

impl GroupKeys {
    /// Number of groups.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of key columns.
    pub fn key_count(&self) -> usize {
        self.types.len()
    }

    /// Estimated heap footprint.
    pub fn estimated_size(&self) -> usize {
        self.keys.iter().map(|k| k.len() + size_of::<Box<[u8]>>()).sum()
    }

    /// Decode the key of `group_id` into channels `0..key columns` of
    /// `builder`.
    pub fn append_key(&self, group_id: usize, builder: &mut PageBuilder) -> QuarryResult<()> {
        let key = self
            .keys
            .get(group_id)
            .ok_or_else(|| QuarryError::internal(format!("group {group_id} out of range")))?;
        let mut reader = KeyReader { bytes: key };
        for (channel, column_type) in self.types.iter().enumerate() {
            if reader.take(1)?[0] == NULL_TAG {
                builder.append_null(channel)?;
                continue;
            }
            match column_type {
                ColumnType::Int64 => {
                    let value = i64::from_le_bytes(reader.take_8()?);
                    builder.append_i64(channel, value)?;
                }
                ColumnType::Float64 => {
                    let value = f64::from_bits(u64::from_le_bytes(reader.take_8()?));
                    builder.append_f64(channel, value)?;
                }
                ColumnType::VarBinary => {
                    let len = u32::from_le_bytes(reader.take_4()?) as usize;
                    builder.append_bytes(channel, reader.take(len)?)?;
                }
            }
        }
        Ok(())
    }
}

fn encode_value(block: &Block, position: usize, out: &mut Vec<u8>) -> QuarryResult<()> {
    if block.is_null(position)? {
        out.push(NULL_TAG);
        return Ok(());
    }
    out.push(VALUE_TAG);
    match block.column_type() {
        ColumnType::Int64 => out.extend_from_slice(&block.get_i64(position)?.to_le_bytes()),
        ColumnType::Float64 => {
            out.extend_from_slice(&block.get_f64(position)?.to_bits().to_le_bytes());
        }
        ColumnType::VarBinary => {
            let bytes = block.get_bytes(position)?;
            let len = u32::try_from(bytes.len()).map_err(|_| {
                QuarryError::value_error(format!("group key of {} bytes", bytes.len()))
            })?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(bytes);
        }
    }
    Ok(())
}

struct KeyReader<'a> {
    bytes: &'a [u8],
}

impl<'a> KeyReader<'a> {
    fn take(&mut self, n: usize) -> QuarryResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(QuarryError::internal("truncated group key"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn take_4(&mut self) -> QuarryResult<[u8; 4]> {
        let mut out = [0; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(out)
    }

    fn take_8(&mut self) -> QuarryResult<[u8; 8]> {
        let mut out = [0; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(out)
    }
}
