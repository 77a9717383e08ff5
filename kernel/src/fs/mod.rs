//! File layer interface used by exec
//!
//! [`FileSystem`] is the inode/transaction layer exec consumes. The RAII
//! handles here pair every acquisition with exactly one release:
//!
//! - [`Transaction`] brackets metadata reads (`begin`/`end`),
//! - [`LockedInode`] is the looked-up, locked inode used for scanning,
//! - [`InodeRef`] is an independent, unlocked reference that outlives the
//!   scan and is kept by the process for demand loading.

use alloc::sync::Arc;
use core::fmt;

use crate::error::FsError;

pub mod ramfs;

/// Inode number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeNum(pub u64);

impl fmt::Display for InodeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ino#{}", self.0)
    }
}

/// Inode and transaction layer operations
pub trait FileSystem: Send + Sync {
    fn begin_transaction(&self);
    fn end_transaction(&self);

    /// Resolve `path` to an inode, taking one reference on it.
    fn lookup(&self, path: &str) -> Result<InodeNum, FsError>;

    fn lock(&self, ino: InodeNum) -> Result<(), FsError>;

    /// Unlock `ino` and drop one reference.
    fn unlock_and_release(&self, ino: InodeNum);

    /// Take one more reference on `ino`.
    fn duplicate_reference(&self, ino: InodeNum) -> InodeNum;

    /// Drop one reference; the inode is freed in memory at zero.
    fn release(&self, ino: InodeNum);

    /// Read up to `buf.len()` bytes at `offset`. Returns bytes read.
    fn read_at(&self, ino: InodeNum, offset: u64, buf: &mut [u8]) -> Result<usize, FsError>;
}

/// Open filesystem transaction, ended on drop
pub struct Transaction<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> Transaction<'a> {
    pub fn begin(fs: &'a dyn FileSystem) -> Self {
        fs.begin_transaction();
        Self { fs }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.fs.end_transaction();
    }
}

/// Looked-up and locked inode. Unlocked and released on drop.
pub struct LockedInode<'a> {
    fs: &'a Arc<dyn FileSystem>,
    ino: InodeNum,
}

impl<'a> LockedInode<'a> {
    /// Look `path` up and lock the result.
    ///
    /// Must be called inside a [`Transaction`].
    pub fn open(fs: &'a Arc<dyn FileSystem>, path: &str) -> Result<Self, FsError> {
        let ino = fs.lookup(path)?;
        if let Err(e) = fs.lock(ino) {
            fs.release(ino);
            return Err(e);
        }
        Ok(Self { fs, ino })
    }

    pub fn ino(&self) -> InodeNum {
        self.ino
    }

    /// Fill `buf` from `offset`, failing on a short read.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), FsError> {
        let got = self.fs.read_at(self.ino, offset, buf)?;
        if got != buf.len() {
            return Err(FsError::ShortRead {
                offset,
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }

    /// Take an independent reference that survives this lock.
    pub fn duplicate(&self) -> InodeRef {
        let ino = self.fs.duplicate_reference(self.ino);
        InodeRef {
            fs: Arc::clone(self.fs),
            ino,
        }
    }
}

impl Drop for LockedInode<'_> {
    fn drop(&mut self) {
        self.fs.unlock_and_release(self.ino);
    }
}

/// Counted, unlocked inode reference. Released exactly once, on drop.
pub struct InodeRef {
    fs: Arc<dyn FileSystem>,
    ino: InodeNum,
}

impl InodeRef {
    pub fn ino(&self) -> InodeNum {
        self.ino
    }

    /// Read without holding the inode lock. Used by the fault resolver.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        self.fs.read_at(self.ino, offset, buf)
    }
}

impl fmt::Debug for InodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InodeRef").field(&self.ino).finish()
    }
}

impl Drop for InodeRef {
    fn drop(&mut self) {
        self.fs.release(self.ino);
    }
}
