//! RAM filesystem
//!
//! A flat in-memory inode store implementing [`FileSystem`]. Reference
//! counts, lock state and transaction depth are tracked so callers can check
//! that every acquisition was paired with a release.

use alloc::{collections::BTreeMap, string::String, vec::Vec};

use spin::Mutex;

use super::{FileSystem, InodeNum};
use crate::error::FsError;

/// RAM filesystem node
struct RamNode {
    data: Vec<u8>,
    /// In-memory references
    refs: usize,
    locked: bool,
}

#[derive(Default)]
struct RamState {
    next_ino: u64,
    names: BTreeMap<String, InodeNum>,
    nodes: BTreeMap<InodeNum, RamNode>,
    tx_depth: usize,
    /// Pairing violations: release at zero, unlock while unlocked
    bad_releases: usize,
}

/// In-memory filesystem
#[derive(Default)]
pub struct RamFs {
    state: Mutex<RamState>,
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the file at `path`
    pub fn add_file(&self, path: &str, data: &[u8]) -> InodeNum {
        let mut state = self.state.lock();
        if let Some(&ino) = state.names.get(normalize(path)) {
            if let Some(node) = state.nodes.get_mut(&ino) {
                node.data = data.to_vec();
            }
            return ino;
        }
        state.next_ino += 1;
        let ino = InodeNum(state.next_ino);
        state.names.insert(String::from(normalize(path)), ino);
        state.nodes.insert(
            ino,
            RamNode {
                data: data.to_vec(),
                refs: 0,
                locked: false,
            },
        );
        ino
    }

    /// References currently held on `ino`
    pub fn refs(&self, ino: InodeNum) -> usize {
        self.state.lock().nodes.get(&ino).map_or(0, |n| n.refs)
    }

    /// References held across every inode
    pub fn total_refs(&self) -> usize {
        self.state.lock().nodes.values().map(|n| n.refs).sum()
    }

    pub fn is_locked(&self, ino: InodeNum) -> bool {
        self.state.lock().nodes.get(&ino).is_some_and(|n| n.locked)
    }

    pub fn any_locked(&self) -> bool {
        self.state.lock().nodes.values().any(|n| n.locked)
    }

    pub fn transaction_depth(&self) -> usize {
        self.state.lock().tx_depth
    }

    pub fn bad_releases(&self) -> usize {
        self.state.lock().bad_releases
    }
}

impl FileSystem for RamFs {
    fn begin_transaction(&self) {
        self.state.lock().tx_depth += 1;
    }

    fn end_transaction(&self) {
        let mut state = self.state.lock();
        if state.tx_depth == 0 {
            log::error!("[RAMFS] end_transaction without begin");
            state.bad_releases += 1;
            return;
        }
        state.tx_depth -= 1;
    }

    fn lookup(&self, path: &str) -> Result<InodeNum, FsError> {
        let mut state = self.state.lock();
        let ino = *state.names.get(normalize(path)).ok_or(FsError::NotFound)?;
        let node = state
            .nodes
            .get_mut(&ino)
            .ok_or(FsError::BadInode { ino: ino.0 })?;
        node.refs += 1;
        Ok(ino)
    }

    fn lock(&self, ino: InodeNum) -> Result<(), FsError> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&ino)
            .ok_or(FsError::BadInode { ino: ino.0 })?;
        if node.refs == 0 {
            return Err(FsError::BadInode { ino: ino.0 });
        }
        if node.locked {
            return Err(FsError::Locked { ino: ino.0 });
        }
        node.locked = true;
        Ok(())
    }

    fn unlock_and_release(&self, ino: InodeNum) {
        {
            let mut state = self.state.lock();
            let was_locked = match state.nodes.get_mut(&ino) {
                Some(node) => core::mem::replace(&mut node.locked, false),
                None => false,
            };
            if !was_locked {
                log::error!("[RAMFS] unlock of unlocked {}", ino);
                state.bad_releases += 1;
            }
        }
        self.release(ino);
    }

    fn duplicate_reference(&self, ino: InodeNum) -> InodeNum {
        let mut state = self.state.lock();
        match state.nodes.get_mut(&ino) {
            Some(node) => node.refs += 1,
            None => {
                log::error!("[RAMFS] dup of unknown {}", ino);
                state.bad_releases += 1;
            }
        }
        ino
    }

    fn release(&self, ino: InodeNum) {
        let mut state = self.state.lock();
        let ok = match state.nodes.get_mut(&ino) {
            Some(node) if node.refs > 0 => {
                node.refs -= 1;
                true
            }
            _ => false,
        };
        if !ok {
            log::error!("[RAMFS] release of unreferenced {}", ino);
            state.bad_releases += 1;
        }
    }

    fn read_at(&self, ino: InodeNum, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        let state = self.state.lock();
        let node = state.nodes.get(&ino).ok_or(FsError::BadInode { ino: ino.0 })?;
        if node.refs == 0 {
            return Err(FsError::BadInode { ino: ino.0 });
        }
        let len = node.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len() as u64, len - offset) as usize;
        let start = offset as usize;
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        Ok(n)
    }
}
