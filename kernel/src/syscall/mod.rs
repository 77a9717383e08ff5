//! System call surface for exec
//!
//! The caller sees only success with argc or the single failure value `-1`.
//! The classified error is logged here and otherwise discarded.

use crate::{
    exec::{replace_image, ExecContext},
    process::Process,
};

/// Failure value returned to user space
pub const EXEC_FAILED: isize = -1;

/// Handle `exec(path, argv)` for `process`.
///
/// `path` and `argv` are already copied in from user memory.
pub fn sys_exec(ctx: &ExecContext, process: &mut Process, path: &str, argv: &[&[u8]]) -> isize {
    match replace_image(ctx, process, path, argv) {
        Ok(argc) => argc as isize,
        Err(e) => {
            log::debug!(
                "[SYSCALL] exec from pid {} failed ({:?}): {}",
                process.pid,
                e.kind(),
                e
            );
            EXEC_FAILED
        }
    }
}
