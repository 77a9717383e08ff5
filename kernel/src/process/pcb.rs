//! Process Control Block (PCB) implementation
//!
//! The image fields of a process change only when exec commits. Between
//! exec calls they always describe the address space that is installed.

use core::{
    fmt,
    ops::{Deref, DerefMut},
};

use crate::{
    config::PROC_NAME_LEN,
    exec::{builder::StackRegion, segment::SegmentTable},
    fs::{InodeNum, InodeRef},
    mm::vas::{SpaceId, UserSpace},
};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-size, NUL-terminated display name
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcessName([u8; PROC_NAME_LEN]);

impl ProcessName {
    /// Copy at most `PROC_NAME_LEN - 1` bytes of `name`
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; PROC_NAME_LEN];
        let bytes = name.as_bytes();
        let n = core::cmp::min(bytes.len(), PROC_NAME_LEN - 1);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    /// Name derived from the last component of `path`
    pub fn from_path(path: &str) -> Self {
        let last = match path.rfind('/') {
            Some(i) => &path[i + 1..],
            None => path,
        };
        Self::new(last)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(PROC_NAME_LEN);
        &self.0[..len]
    }

    /// The name as text. A multi-byte character cut by truncation is dropped.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User register state restored on return to user mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// User program counter
    pub epc: u64,
    /// User stack pointer
    pub sp: u64,
    /// First argument / return value register
    pub a0: u64,
    /// Second argument register
    pub a1: u64,
}

/// Exec-in-progress marker.
///
/// While `InProgress`, faults raised by exec's own stack writes belong to
/// the candidate address space, not the installed one. The fault resolver
/// must check this field before choosing a target space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Idle,
    InProgress,
}

/// Everything that describes the installed user image
#[derive(Debug, Default)]
pub struct ProcessImage {
    pub(crate) space: Option<UserSpace>,
    pub(crate) size: u64,
    pub(crate) segments: SegmentTable,
    pub(crate) stack: Option<StackRegion>,
    pub(crate) exec_file: Option<InodeRef>,
}

impl ProcessImage {
    pub fn space(&self) -> Option<&UserSpace> {
        self.space.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    /// Stack range reserved when this image was built
    pub fn stack(&self) -> Option<StackRegion> {
        self.stack
    }

    pub fn exec_file(&self) -> Option<&InodeRef> {
        self.exec_file.as_ref()
    }
}

/// Comparable copy of a process's image-related state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSnapshot {
    pub space: Option<SpaceId>,
    pub size: u64,
    pub segments: SegmentTable,
    pub stack: Option<StackRegion>,
    pub exec_file: Option<InodeNum>,
    pub trapframe: TrapFrame,
    pub name: ProcessName,
}

/// Process Control Block
#[derive(Debug)]
pub struct Process {
    /// Process ID
    pub pid: ProcessId,

    /// Name shown by debugging tools
    name: ProcessName,

    /// Installed user image
    image: ProcessImage,

    /// Saved user registers
    pub trapframe: TrapFrame,

    exec_state: ExecState,
}

impl Process {
    /// A process with no user image yet
    pub fn new(pid: ProcessId, name: &str) -> Self {
        Self {
            pid,
            name: ProcessName::new(name),
            image: ProcessImage::default(),
            trapframe: TrapFrame::default(),
            exec_state: ExecState::Idle,
        }
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    pub fn image(&self) -> &ProcessImage {
        &self.image
    }

    pub fn exec_state(&self) -> ExecState {
        self.exec_state
    }

    pub fn is_exec_in_progress(&self) -> bool {
        self.exec_state == ExecState::InProgress
    }

    pub fn snapshot(&self) -> ImageSnapshot {
        ImageSnapshot {
            space: self.image.space.as_ref().map(UserSpace::id),
            size: self.image.size,
            segments: self.image.segments.clone(),
            stack: self.image.stack,
            exec_file: self.image.exec_file.as_ref().map(InodeRef::ino),
            trapframe: self.trapframe,
            name: self.name,
        }
    }

    /// Swap in a new image and return the old one, still holding its
    /// resources. The caller drops it after the swap.
    pub(crate) fn install_image(&mut self, image: ProcessImage, name: ProcessName) -> ProcessImage {
        self.name = name;
        core::mem::replace(&mut self.image, image)
    }
}

/// Marks a process exec-in-progress for the guard's lifetime.
///
/// Dropping the guard clears the marker, so every exit path, success or
/// abort, leaves the process in [`ExecState::Idle`].
pub struct ExecInProgress<'p> {
    process: &'p mut Process,
}

impl<'p> ExecInProgress<'p> {
    pub fn enter(process: &'p mut Process) -> Self {
        process.exec_state = ExecState::InProgress;
        Self { process }
    }
}

impl Deref for ExecInProgress<'_> {
    type Target = Process;

    fn deref(&self) -> &Self::Target {
        self.process
    }
}

impl DerefMut for ExecInProgress<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.process
    }
}

impl Drop for ExecInProgress<'_> {
    fn drop(&mut self) {
        self.process.exec_state = ExecState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_path() {
        assert_eq!(ProcessName::from_path("/bin/echo").as_str(), "echo");
        assert_eq!(ProcessName::from_path("echo").as_str(), "echo");
        assert_eq!(ProcessName::from_path("/usr/bin/").as_str(), "");
    }

    #[test]
    fn test_name_truncates() {
        let name = ProcessName::from_path("/a_really_long_program_name");
        assert_eq!(name.as_bytes().len(), PROC_NAME_LEN - 1);
        assert_eq!(name.as_str(), "a_really_long_p");
    }

    #[test]
    fn test_name_truncation_keeps_utf8_valid() {
        // 14 ASCII bytes then a 2-byte character cut at byte 15
        let name = ProcessName::new("abcdefghijklmné");
        assert_eq!(name.as_str(), "abcdefghijklmn");
    }

    #[test]
    fn test_exec_marker_cleared_on_drop() {
        let mut process = Process::new(ProcessId(7), "init");
        {
            let guard = ExecInProgress::enter(&mut process);
            assert!(guard.is_exec_in_progress());
        }
        assert_eq!(process.exec_state(), ExecState::Idle);
    }

    #[test]
    fn test_new_process_has_empty_image() {
        let process = Process::new(ProcessId(1), "init");
        let snap = process.snapshot();
        assert_eq!(snap.space, None);
        assert_eq!(snap.size, 0);
        assert!(snap.segments.is_empty());
        assert_eq!(snap.stack, None);
        assert_eq!(snap.exec_file, None);
    }
}
