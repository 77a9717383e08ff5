//! Process image replacement (exec)
//!
//! [`replace_image`] runs four phases in order:
//!
//! 1. [`scan`]: validate the ELF image and collect its loadable segments,
//! 2. [`builder`]: allocate the candidate address space and size it,
//! 3. [`stack`]: lay the argument vector out on the candidate stack,
//! 4. commit: swap the candidate into the process and release the old image.
//!
//! Every resource taken in phases 1-3 is held by an RAII handle, so any
//! failure unwinds them in reverse acquisition order: the retained file
//! reference, the candidate space, then (if still held) the inode lock and
//! the filesystem transaction. The process is not written until commit.

pub mod builder;
pub mod scan;
pub mod segment;
pub mod stack;

use alloc::sync::Arc;
use core::fmt;

use self::{builder::build_space, scan::scan_image, stack::push_args};
use crate::{
    config::ExecConfig,
    error::ExecResult,
    fs::{FileSystem, LockedInode, Transaction},
    mm::PageTables,
    process::{ExecInProgress, Process, ProcessImage, ProcessName},
};

/// Collaborators and limits exec runs against
#[derive(Clone)]
pub struct ExecContext {
    pub fs: Arc<dyn FileSystem>,
    pub vm: Arc<dyn PageTables>,
    pub config: ExecConfig,
}

impl ExecContext {
    pub fn new(fs: Arc<dyn FileSystem>, vm: Arc<dyn PageTables>, config: ExecConfig) -> Self {
        Self { fs, vm, config }
    }
}

/// Phase an exec attempt reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPhase {
    Scanning,
    Building,
    Layout,
    Commit,
}

impl fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanning => "scanning",
            Self::Building => "building",
            Self::Layout => "layout",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Replace the image of `process` with the executable at `path`.
///
/// Returns argc on success. On failure the process is left exactly as it
/// was and nothing acquired on its behalf remains held.
pub fn replace_image(
    ctx: &ExecContext,
    process: &mut Process,
    path: &str,
    argv: &[&[u8]],
) -> ExecResult<usize> {
    let pid = process.pid;
    let mut phase = ExecPhase::Scanning;
    log::debug!("[EXEC] pid {}: exec {} argc {}", pid, path, argv.len());

    match run(ctx, process, path, argv, &mut phase) {
        Ok(argc) => Ok(argc),
        Err(e) => {
            log::warn!("[EXEC] pid {}: exec {} aborted in {}: {}", pid, path, phase, e);
            Err(e)
        }
    }
}

fn run(
    ctx: &ExecContext,
    process: &mut Process,
    path: &str,
    argv: &[&[u8]],
    phase: &mut ExecPhase,
) -> ExecResult<usize> {
    ctx.config.validate()?;
    let pid = process.pid;

    let tx = Transaction::begin(ctx.fs.as_ref());
    let inode = LockedInode::open(&ctx.fs, path)?;
    let scanned = scan_image(&inode)?;
    log::debug!(
        "[EXEC] pid {}: {} loadable segments, entry {:#x}, image end {:#x}",
        pid,
        scanned.segments.len(),
        scanned.entry,
        scanned.image_end
    );

    *phase = ExecPhase::Building;
    let candidate = build_space(&ctx.vm, pid, scanned.image_end, &ctx.config)?;
    let exec_file = inode.duplicate();
    drop(inode);
    drop(tx);

    *phase = ExecPhase::Layout;
    let in_exec = ExecInProgress::enter(&mut *process);
    let frame = push_args(
        &candidate.space,
        candidate.stack,
        argv,
        ctx.config.max_args,
    )?;
    drop(in_exec);

    *phase = ExecPhase::Commit;
    let old = process.install_image(
        ProcessImage {
            space: Some(candidate.space),
            size: candidate.size,
            segments: scanned.segments,
            stack: Some(candidate.stack),
            exec_file: Some(exec_file),
        },
        ProcessName::from_path(path),
    );
    process.trapframe.epc = scanned.entry;
    process.trapframe.sp = frame.sp;
    process.trapframe.a0 = frame.argc as u64;
    process.trapframe.a1 = frame.sp;

    log::info!(
        "[EXEC] pid {}: now running {} (entry {:#x}, sp {:#x}, size {:#x})",
        pid,
        process.name(),
        scanned.entry,
        frame.sp,
        candidate.size
    );

    drop(old);
    Ok(frame.argc)
}
