//! Address space builder
//!
//! Allocates the candidate address space and fixes the image layout:
//!
//! ```text
//! 0 ........ image_end | pad to page | guard page | stack pages | size
//! ```
//!
//! Nothing above `image_end` is backed here. The stack range is accounted
//! in the image size only; its pages appear when exec writes the argument
//! block or when the process faults on them later.

use alloc::sync::Arc;

use crate::{
    config::{ExecConfig, PAGE_SIZE},
    error::{ExecError, ExecResult, FormatError},
    mm::{page_round_up, PageTables, UserSpace},
    process::ProcessId,
};

/// Reserved stack range of a candidate image, `[base, top)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    pub base: u64,
    pub top: u64,
}

impl StackRegion {
    /// The unmapped page directly below the stack
    pub fn guard_page(&self) -> u64 {
        self.base - PAGE_SIZE
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.top
    }
}

/// A freshly allocated, not yet installed address space
#[derive(Debug)]
pub struct CandidateSpace {
    pub space: UserSpace,
    pub size: u64,
    pub stack: StackRegion,
}

/// Total image size for an image ending at `image_end`.
///
/// Returns the size and the stack region. Allocates nothing.
pub fn image_layout(image_end: u64, config: &ExecConfig) -> ExecResult<(u64, StackRegion)> {
    let too_large = ExecError::Format(FormatError::ImageTooLarge);

    let image_top = page_round_up(image_end).ok_or(too_large)?;
    let reserve = (config.stack_pages as u64)
        .checked_add(1)
        .and_then(|pages| pages.checked_mul(PAGE_SIZE))
        .ok_or(too_large)?;
    let size = image_top.checked_add(reserve).ok_or(too_large)?;

    if size > config.user_va_limit {
        return Err(ExecError::Resource {
            resource: "user address range",
        });
    }

    let stack = StackRegion {
        base: size - config.stack_bytes(),
        top: size,
    };
    Ok((size, stack))
}

/// Allocate the candidate space for `owner` and size it for the image.
pub fn build_space(
    tables: &Arc<dyn PageTables>,
    owner: ProcessId,
    image_end: u64,
    config: &ExecConfig,
) -> ExecResult<CandidateSpace> {
    let (size, stack) = image_layout(image_end, config)?;

    let mut space = UserSpace::create(tables, owner)?;
    space.set_size(size);

    log::debug!(
        "[EXEC] pid {}: built {} size {:#x}, stack [{:#x}, {:#x})",
        owner,
        space.id(),
        size,
        stack.base,
        stack.top
    );

    Ok(CandidateSpace { space, size, stack })
}
