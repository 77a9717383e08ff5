//! Loadable segment descriptors and the fixed-capacity segment table

use crate::{config::MAX_EXEC_SEGS, error::ExecError, mm::SegmentPerms};

/// One loadable segment as recorded for demand loading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Page-aligned start address in the image
    pub virtual_address: u64,
    /// Bytes occupied in memory
    pub memory_size: u64,
    /// Bytes present in the file; the rest of `memory_size` is zero fill
    pub file_size: u64,
    /// Offset of the segment contents in the file
    pub file_offset: u64,
    pub permissions: SegmentPerms,
}

impl SegmentDescriptor {
    /// One past the last address. Validated not to wrap by the scanner.
    pub fn end(&self) -> u64 {
        self.virtual_address.saturating_add(self.memory_size)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.virtual_address && addr < self.end()
    }
}

/// Segment table with a statically sized backing array.
///
/// Pushing past [`MAX_EXEC_SEGS`] fails; entries are never truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTable {
    entries: [SegmentDescriptor; MAX_EXEC_SEGS],
    len: usize,
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentTable {
    pub const fn new() -> Self {
        Self {
            entries: [SegmentDescriptor {
                virtual_address: 0,
                memory_size: 0,
                file_size: 0,
                file_offset: 0,
                permissions: SegmentPerms::empty(),
            }; MAX_EXEC_SEGS],
            len: 0,
        }
    }

    pub fn push(&mut self, segment: SegmentDescriptor) -> Result<(), ExecError> {
        if self.len == MAX_EXEC_SEGS {
            return Err(ExecError::Capacity {
                limit: MAX_EXEC_SEGS,
            });
        }
        self.entries[self.len] = segment;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[SegmentDescriptor] {
        &self.entries[..self.len]
    }

    pub fn iter(&self) -> core::slice::Iter<'_, SegmentDescriptor> {
        self.as_slice().iter()
    }

    /// The segment covering `addr`, if any
    pub fn find(&self, addr: u64) -> Option<&SegmentDescriptor> {
        self.iter().find(|s| s.contains(addr))
    }
}

impl<'a> IntoIterator for &'a SegmentTable {
    type Item = &'a SegmentDescriptor;
    type IntoIter = core::slice::Iter<'a, SegmentDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
