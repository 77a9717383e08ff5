//! Demand paging for exec'd images
//!
//! Exec records where each loadable segment lives and never copies segment
//! contents. The first access to a page of the installed image faults, and
//! [`DemandPager::handle_fault`] backs it:
//!
//! - inside a segment: the file-backed part of the page is read through the
//!   process's retained executable reference, the rest is zero filled, and
//!   the page is mapped with the segment's permissions;
//! - inside the stack range recorded at exec: a zero-filled read/write page;
//! - the guard page below the stack and anything else: an error.
//!
//! ## Exec in progress
//! While a process is marked [`ExecState::InProgress`](crate::process::ExecState)
//! its installed image is still the old one. Faults raised on its behalf
//! then belong to the candidate, which the caller passes in explicitly,
//! and only zero-filled pages of the candidate's stack may be added there. Exec
//! itself writes the argument block through the candidate handle directly,
//! so it does not depend on this path.

use alloc::boxed::Box;

use super::{page_round_down, SegmentPerms};
use crate::{
    config::PAGE_SIZE,
    error::{FaultError, FsError},
    exec::{builder::CandidateSpace, segment::SegmentDescriptor},
    process::{Process, ProcessImage},
};

/// How a faulting page gets its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPlan {
    /// `len` bytes from `file_offset`, zero fill after them
    FileBacked {
        page: u64,
        file_offset: u64,
        len: usize,
        perms: SegmentPerms,
    },
    /// All zeroes
    ZeroFill { page: u64, perms: SegmentPerms },
}

impl FaultPlan {
    pub fn page(&self) -> u64 {
        match *self {
            Self::FileBacked { page, .. } | Self::ZeroFill { page, .. } => page,
        }
    }

    pub fn perms(&self) -> SegmentPerms {
        match *self {
            Self::FileBacked { perms, .. } | Self::ZeroFill { perms, .. } => perms,
        }
    }
}

const STACK_PERMS: SegmentPerms = SegmentPerms::READ.union(SegmentPerms::WRITE);

/// Resolves page faults against the segment table and stack range exec
/// recorded in the process image
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandPager;

impl DemandPager {
    pub fn new() -> Self {
        Self
    }

    /// Decide how to back the page containing `addr` in `image`.
    pub fn plan(&self, image: &ProcessImage, addr: u64) -> Result<FaultPlan, FaultError> {
        if addr >= image.size() {
            return Err(FaultError::OutsideImage { addr });
        }
        let page = page_round_down(addr);

        if let Some(segment) = image.segments().find(addr) {
            return segment_plan(segment, page);
        }

        let stack = image.stack().ok_or(FaultError::OutsideImage { addr })?;
        if stack.contains(addr) {
            return Ok(FaultPlan::ZeroFill {
                page,
                perms: STACK_PERMS,
            });
        }
        if page == stack.guard_page() {
            return Err(FaultError::GuardPage { addr });
        }
        Err(FaultError::OutsideImage { addr })
    }

    /// Back the page containing `addr` for `process`.
    ///
    /// `candidate` is only consulted while the process is exec-in-progress.
    /// Returns the plan that was carried out.
    pub fn handle_fault(
        &self,
        process: &Process,
        addr: u64,
        candidate: Option<&CandidateSpace>,
    ) -> Result<FaultPlan, FaultError> {
        if process.is_exec_in_progress() {
            let candidate = candidate.ok_or(FaultError::NoCandidate)?;
            return self.fault_candidate(process, candidate, addr);
        }

        let image = process.image();
        let space = image.space().ok_or(FaultError::NoImage)?;
        let plan = self.plan(image, addr)?;
        if space.is_mapped(plan.page()) {
            return Err(FaultError::AlreadyMapped { addr });
        }

        let mut frame = Box::new([0u8; PAGE_SIZE as usize]);
        if let FaultPlan::FileBacked {
            file_offset, len, ..
        } = plan
        {
            let file = image.exec_file().ok_or(FaultError::NoBackingFile)?;
            let got = file
                .read_at(file_offset, &mut frame[..len])
                .map_err(|reason| FaultError::Read {
                    offset: file_offset,
                    reason,
                })?;
            if got != len {
                return Err(FaultError::Read {
                    offset: file_offset,
                    reason: FsError::ShortRead {
                        offset: file_offset,
                        wanted: len,
                        got,
                    },
                });
            }
        }

        space.map_page(plan.page(), &frame, plan.perms())?;
        log::trace!("[FAULT] pid {}: {:#x} -> {:?}", process.pid, addr, plan);
        Ok(plan)
    }

    fn fault_candidate(
        &self,
        process: &Process,
        candidate: &CandidateSpace,
        addr: u64,
    ) -> Result<FaultPlan, FaultError> {
        if !candidate.stack.contains(addr) {
            return Err(FaultError::NotStack { addr });
        }

        let space = &candidate.space;
        let plan = FaultPlan::ZeroFill {
            page: page_round_down(addr),
            perms: STACK_PERMS,
        };
        if space.is_mapped(plan.page()) {
            return Err(FaultError::AlreadyMapped { addr });
        }
        let frame = Box::new([0u8; PAGE_SIZE as usize]);
        space.map_page(plan.page(), &frame, plan.perms())?;
        log::trace!(
            "[FAULT] pid {}: {:#x} -> candidate {} stack",
            process.pid,
            addr,
            space.id()
        );
        Ok(plan)
    }
}

fn segment_plan(segment: &SegmentDescriptor, page: u64) -> Result<FaultPlan, FaultError> {
    // Segments start page aligned, so `page` is never below the segment.
    let into = page - segment.virtual_address;
    if into >= segment.file_size {
        return Ok(FaultPlan::ZeroFill {
            page,
            perms: segment.permissions,
        });
    }
    let file_offset = segment
        .file_offset
        .checked_add(into)
        .ok_or(FaultError::BadFileRange { addr: page })?;
    Ok(FaultPlan::FileBacked {
        page,
        file_offset,
        len: core::cmp::min(segment.file_size - into, PAGE_SIZE) as usize,
        perms: segment.permissions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(va: u64, memsz: u64, filesz: u64, off: u64) -> SegmentDescriptor {
        SegmentDescriptor {
            virtual_address: va,
            memory_size: memsz,
            file_size: filesz,
            file_offset: off,
            permissions: SegmentPerms::READ | SegmentPerms::EXEC,
        }
    }

    #[test]
    fn test_segment_plan_partial_page() {
        let seg = segment(0x1000, 0x2000, 0x1500, 0x40);

        assert_eq!(
            segment_plan(&seg, 0x1000),
            Ok(FaultPlan::FileBacked {
                page: 0x1000,
                file_offset: 0x40,
                len: 0x1000,
                perms: seg.permissions,
            })
        );
        assert_eq!(
            segment_plan(&seg, 0x2000),
            Ok(FaultPlan::FileBacked {
                page: 0x2000,
                file_offset: 0x1040,
                len: 0x500,
                perms: seg.permissions,
            })
        );
    }

    #[test]
    fn test_segment_plan_bss_page() {
        let seg = segment(0x1000, 0x3000, 0x800, 0);
        assert_eq!(
            segment_plan(&seg, 0x3000),
            Ok(FaultPlan::ZeroFill {
                page: 0x3000,
                perms: seg.permissions,
            })
        );
    }

    #[test]
    fn test_segment_plan_file_offset_wraps() {
        let seg = segment(0x1000, 0x2000, 0x2000, u64::MAX - 0x10);
        assert!(matches!(
            segment_plan(&seg, 0x1000),
            Ok(FaultPlan::FileBacked { .. })
        ));
        assert_eq!(
            segment_plan(&seg, 0x2000),
            Err(FaultError::BadFileRange { addr: 0x2000 })
        );
    }
}
