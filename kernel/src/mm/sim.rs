//! In-memory page-table backend
//!
//! Keeps each address space as a map from page address to a private frame.
//! Used on hosts without an MMU and by the test suite, which relies on the
//! live-space count, the destroy log and the frame budget to observe exactly
//! what exec acquired and released.

use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};

use spin::Mutex;

use super::{
    vas::{PageTables, SpaceId},
    SegmentPerms,
};
use crate::{
    config::{MAX_USER_VA, PAGE_SIZE},
    error::VmError,
    process::ProcessId,
};

type Frame = Box<[u8; PAGE_SIZE as usize]>;

struct SimPage {
    frame: Frame,
    perms: SegmentPerms,
}

struct SimSpace {
    owner: ProcessId,
    pages: BTreeMap<u64, SimPage>,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    spaces: BTreeMap<SpaceId, SimSpace>,
    /// Remaining frames, `None` for unlimited
    frame_budget: Option<usize>,
    fail_create: bool,
    destroyed: Vec<(SpaceId, u64)>,
    bad_destroys: usize,
}

impl SimState {
    fn take_frame(&mut self) -> Result<Frame, VmError> {
        if let Some(budget) = self.frame_budget.as_mut() {
            if *budget == 0 {
                return Err(VmError::OutOfMemory);
            }
            *budget -= 1;
        }
        Ok(Box::new([0u8; PAGE_SIZE as usize]))
    }

    fn return_frames(&mut self, count: usize) {
        if let Some(budget) = self.frame_budget.as_mut() {
            *budget += count;
        }
    }
}

/// Page tables simulated in kernel heap memory
#[derive(Default)]
pub struct SimPageTables {
    state: Mutex<SimState>,
}

impl SimPageTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of user frames that can be handed out
    pub fn with_frame_budget(frames: usize) -> Self {
        let tables = Self::new();
        tables.state.lock().frame_budget = Some(frames);
        tables
    }

    /// Make every subsequent `create` fail with `OutOfMemory`
    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn set_frame_budget(&self, frames: Option<usize>) {
        self.state.lock().frame_budget = frames;
    }

    /// Number of address spaces currently allocated
    pub fn live_spaces(&self) -> usize {
        self.state.lock().spaces.len()
    }

    /// Every `(space, size)` passed to `destroy`, in call order
    pub fn destroy_log(&self) -> Vec<(SpaceId, u64)> {
        self.state.lock().destroyed.clone()
    }

    /// `destroy` calls naming a space that did not exist
    pub fn bad_destroys(&self) -> usize {
        self.state.lock().bad_destroys
    }

    pub fn owner(&self, space: SpaceId) -> Option<ProcessId> {
        self.state.lock().spaces.get(&space).map(|s| s.owner)
    }

    pub fn mapped_pages(&self, space: SpaceId) -> usize {
        self.state
            .lock()
            .spaces
            .get(&space)
            .map_or(0, |s| s.pages.len())
    }

    pub fn page_perms(&self, space: SpaceId, page: u64) -> Option<SegmentPerms> {
        self.state
            .lock()
            .spaces
            .get(&space)
            .and_then(|s| s.pages.get(&page))
            .map(|p| p.perms)
    }

    /// Read back user memory. Unmapped bytes read as `None`.
    pub fn read_bytes(&self, space: SpaceId, addr: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let sim = state.spaces.get(&space)?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            let a = addr.checked_add(i)?;
            let page = sim.pages.get(&(a & !(PAGE_SIZE - 1)))?;
            out.push(page.frame[(a % PAGE_SIZE) as usize]);
        }
        Some(out)
    }

    /// Read a little-endian u64 from user memory
    pub fn read_u64(&self, space: SpaceId, addr: u64) -> Option<u64> {
        let bytes = self.read_bytes(space, addr, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Some(u64::from_le_bytes(word))
    }
}

impl PageTables for SimPageTables {
    fn create(&self, owner: ProcessId) -> Result<SpaceId, VmError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(VmError::OutOfMemory);
        }
        state.next_id += 1;
        let id = SpaceId(state.next_id);
        // Kernel trampoline and trap-frame mappings live outside the user
        // range and are not tracked as user pages.
        state.spaces.insert(
            id,
            SimSpace {
                owner,
                pages: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn destroy(&self, space: SpaceId, size: u64) {
        let mut state = self.state.lock();
        state.destroyed.push((space, size));
        match state.spaces.remove(&space) {
            Some(sim) => {
                let freed = sim.pages.len();
                state.return_frames(freed);
            }
            None => {
                state.bad_destroys += 1;
                log::error!("[SIMVM] destroy of unknown {}", space);
            }
        }
    }

    fn write_bytes(&self, space: SpaceId, addr: u64, bytes: &[u8]) -> Result<(), VmError> {
        let end = addr
            .checked_add(bytes.len() as u64)
            .ok_or(VmError::BadAddress { addr })?;
        if end > MAX_USER_VA {
            return Err(VmError::BadAddress { addr });
        }

        let mut state = self.state.lock();
        if !state.spaces.contains_key(&space) {
            return Err(VmError::NoSuchSpace { id: space.0 });
        }

        let mut cursor = addr;
        let mut src = bytes;
        while !src.is_empty() {
            let page = cursor & !(PAGE_SIZE - 1);
            let offset = (cursor - page) as usize;
            let n = core::cmp::min(src.len(), PAGE_SIZE as usize - offset);

            let present = state
                .spaces
                .get(&space)
                .is_some_and(|s| s.pages.contains_key(&page));
            if !present {
                let frame = state.take_frame()?;
                if let Some(sim) = state.spaces.get_mut(&space) {
                    sim.pages.insert(
                        page,
                        SimPage {
                            frame,
                            perms: SegmentPerms::READ | SegmentPerms::WRITE,
                        },
                    );
                }
            }

            let sim = state
                .spaces
                .get_mut(&space)
                .ok_or(VmError::NoSuchSpace { id: space.0 })?;
            let target = sim
                .pages
                .get_mut(&page)
                .ok_or(VmError::BadAddress { addr: cursor })?;
            target.frame[offset..offset + n].copy_from_slice(&src[..n]);

            cursor += n as u64;
            src = &src[n..];
        }
        Ok(())
    }

    fn map_page(
        &self,
        space: SpaceId,
        page: u64,
        contents: &[u8; PAGE_SIZE as usize],
        perms: SegmentPerms,
    ) -> Result<(), VmError> {
        if page % PAGE_SIZE != 0 || page >= MAX_USER_VA {
            return Err(VmError::BadAddress { addr: page });
        }
        let mut state = self.state.lock();
        let already = state
            .spaces
            .get(&space)
            .ok_or(VmError::NoSuchSpace { id: space.0 })?
            .pages
            .contains_key(&page);
        if already {
            return Err(VmError::AlreadyMapped { addr: page });
        }
        let mut frame = state.take_frame()?;
        frame.copy_from_slice(contents);
        if let Some(sim) = state.spaces.get_mut(&space) {
            sim.pages.insert(page, SimPage { frame, perms });
        }
        Ok(())
    }

    fn is_mapped(&self, space: SpaceId, page: u64) -> bool {
        self.state
            .lock()
            .spaces
            .get(&space)
            .is_some_and(|s| s.pages.contains_key(&page))
    }
}
