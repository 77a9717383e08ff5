//! Address-space primitives
//!
//! [`PageTables`] is the interface to the page-table layer. Exec only needs
//! `create`, `destroy` and `write_bytes`; the fault resolver additionally
//! uses `map_page` and `is_mapped`. [`UserSpace`] owns one address space and
//! destroys it, sized to whatever was reserved so far, when dropped.

use alloc::sync::Arc;
use core::fmt;

use super::SegmentPerms;
use crate::{config::PAGE_SIZE, error::VmError, process::ProcessId};

/// Identifier of an address space inside a [`PageTables`] backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub u64);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vas#{}", self.0)
    }
}

/// Page-table layer operations
pub trait PageTables: Send + Sync {
    /// Allocate an empty user address space carrying the fixed kernel
    /// mappings every process needs.
    fn create(&self, owner: ProcessId) -> Result<SpaceId, VmError>;

    /// Free every user page below `size` and the page-table pages.
    fn destroy(&self, space: SpaceId, size: u64);

    /// Copy `bytes` to `addr` in `space`, backing untouched pages with zeroed
    /// frames as needed. Never routes through the current process.
    fn write_bytes(&self, space: SpaceId, addr: u64, bytes: &[u8]) -> Result<(), VmError>;

    /// Install one page with the given contents and permissions.
    fn map_page(
        &self,
        space: SpaceId,
        page: u64,
        contents: &[u8; PAGE_SIZE as usize],
        perms: SegmentPerms,
    ) -> Result<(), VmError>;

    fn is_mapped(&self, space: SpaceId, page: u64) -> bool;
}

/// Owned user address space.
///
/// Move-only. Dropping it calls [`PageTables::destroy`] with the size
/// recorded in [`UserSpace::set_size`].
pub struct UserSpace {
    tables: Arc<dyn PageTables>,
    id: SpaceId,
    size: u64,
}

impl UserSpace {
    /// Allocate a fresh space owned by `owner`.
    pub fn create(tables: &Arc<dyn PageTables>, owner: ProcessId) -> Result<Self, VmError> {
        let id = tables.create(owner)?;
        Ok(Self {
            tables: Arc::clone(tables),
            id,
            size: 0,
        })
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Bytes of user address space accounted to this space
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn write_bytes(&self, addr: u64, bytes: &[u8]) -> Result<(), VmError> {
        self.tables.write_bytes(self.id, addr, bytes)
    }

    pub fn map_page(
        &self,
        page: u64,
        contents: &[u8; PAGE_SIZE as usize],
        perms: SegmentPerms,
    ) -> Result<(), VmError> {
        self.tables.map_page(self.id, page, contents, perms)
    }

    pub fn is_mapped(&self, page: u64) -> bool {
        self.tables.is_mapped(self.id, page)
    }
}

impl fmt::Debug for UserSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpace")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

impl Drop for UserSpace {
    fn drop(&mut self) {
        log::trace!("[VAS] destroying {} (size {:#x})", self.id, self.size);
        self.tables.destroy(self.id, self.size);
    }
}
