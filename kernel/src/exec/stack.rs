//! Argument layout engine
//!
//! Copies the argument strings to the top of the candidate stack, highest
//! first, then the null-terminated pointer table below them:
//!
//! ```text
//! top  -> | argv[0] "\0" pad | argv[1] "\0" pad | ... |
//!         | argv ptr 0 | argv ptr 1 | ... | 0 | pad  |  <- final sp
//! base -> | unused                                   |
//! ```
//!
//! Every string start and the final stack pointer are 16-byte aligned.
//! Writes go straight to the candidate [`UserSpace`]; nothing here touches
//! the calling process's installed image.

use alloc::vec::Vec;

use super::builder::StackRegion;
use crate::{
    config::{POINTER_SIZE, STACK_ALIGN},
    error::{ExecError, ExecResult},
    mm::UserSpace,
};

/// Register-visible result of the argument layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Initial user stack pointer; also the address of the pointer table
    pub sp: u64,
    pub argc: usize,
    /// Pointer table as written, null sentinel included
    pub argv_ptrs: Vec<u64>,
}

/// Push `argv` onto `stack` inside `space`.
pub fn push_args(
    space: &UserSpace,
    stack: StackRegion,
    argv: &[&[u8]],
    max_args: usize,
) -> ExecResult<StackFrame> {
    let overflow = |sp: u64| ExecError::StackOverflow {
        sp,
        stack_base: stack.base,
    };

    if argv.len() > max_args {
        return Err(overflow(stack.top));
    }

    let mut sp = stack.top;
    let mut argv_ptrs = Vec::with_capacity(argv.len() + 1);

    for arg in argv {
        sp = sp
            .checked_sub(arg.len() as u64 + 1)
            .ok_or_else(|| overflow(0))?;
        sp -= sp % STACK_ALIGN;
        if sp < stack.base {
            return Err(overflow(sp));
        }
        write(space, sp, arg)?;
        write(space, sp + arg.len() as u64, &[0])?;
        log::trace!("[EXEC] arg {} at {:#x} ({} bytes)", argv_ptrs.len(), sp, arg.len());
        argv_ptrs.push(sp);
    }
    argv_ptrs.push(0);

    let table_len = argv_ptrs.len() as u64 * POINTER_SIZE;
    sp = sp.checked_sub(table_len).ok_or_else(|| overflow(0))?;
    sp -= sp % STACK_ALIGN;
    if sp < stack.base {
        return Err(overflow(sp));
    }

    let mut table = Vec::with_capacity(table_len as usize);
    for ptr in &argv_ptrs {
        table.extend_from_slice(&ptr.to_le_bytes());
    }
    write(space, sp, &table)?;

    Ok(StackFrame {
        sp,
        argc: argv.len(),
        argv_ptrs,
    })
}

fn write(space: &UserSpace, addr: u64, bytes: &[u8]) -> ExecResult<()> {
    space
        .write_bytes(addr, bytes)
        .map_err(|reason| ExecError::Transfer { addr, reason })
}
