//! Error types for the exec path
//!
//! [`ExecError`] is the taxonomy exec reports internally. The file layer and
//! the address-space primitives have their own small error enums; `From`
//! conversions classify them into the exec taxonomy at the phase boundary.

use core::fmt;

/// Main exec error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The executable path did not resolve
    Lookup,

    /// Bad magic, truncated headers or invalid segment geometry
    Format(FormatError),

    /// Too many loadable segments for the fixed segment table
    Capacity {
        limit: usize,
    },

    /// Address-space allocation failed or the image is too large to host
    Resource {
        resource: &'static str,
    },

    /// Arguments do not fit in the reserved stack region
    StackOverflow {
        sp: u64,
        stack_base: u64,
    },

    /// Copying into the candidate address space failed
    Transfer {
        addr: u64,
        reason: VmError,
    },

    /// The exec limits themselves are unusable
    Config {
        reason: &'static str,
    },
}

/// Reasons an image is rejected by the format scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Header or program header could not be read in full
    Truncated { offset: u64 },
    /// ELF magic mismatch
    BadMagic,
    /// `p_memsz < p_filesz`
    MemSmallerThanFile { index: usize },
    /// `p_vaddr + p_memsz` wraps the address space
    AddressOverflow { index: usize },
    /// `p_offset + p_filesz` wraps
    FileRangeOverflow { index: usize },
    /// `p_vaddr` is not page aligned
    Misaligned { index: usize, vaddr: u64 },
    /// Image plus stack reservation wraps the address space
    ImageTooLarge,
}

/// Flat classification, used for diagnostics and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    Lookup,
    Format,
    Capacity,
    Resource,
    StackOverflow,
    Transfer,
    Config,
}

/// File layer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    ShortRead { offset: u64, wanted: usize, got: usize },
    BadInode { ino: u64 },
    Locked { ino: u64 },
}

/// Address-space primitive errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    OutOfMemory,
    BadAddress { addr: u64 },
    NoSuchSpace { id: u64 },
    AlreadyMapped { addr: u64 },
}

/// Demand-paging fault resolution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// The process has no installed address space
    NoImage,
    /// Address at or above the image size, or in no segment or stack page
    OutsideImage { addr: u64 },
    /// Access to the unmapped page below the stack
    GuardPage { addr: u64 },
    /// Page is already present; not a demand fault
    AlreadyMapped { addr: u64 },
    /// Exec is in progress but no candidate space was supplied
    NoCandidate,
    /// During exec only the candidate's stack pages may be faulted in
    NotStack { addr: u64 },
    /// File-backed page but the process retains no executable reference
    NoBackingFile,
    /// Segment file range wraps; rejected by exec, never produced by it
    BadFileRange { addr: u64 },
    /// Reading segment contents failed
    Read { offset: u64, reason: FsError },
    /// Installing the page failed
    Map(VmError),
}

/// Result type alias for exec operations
pub type ExecResult<T> = Result<T, ExecError>;

impl ExecError {
    pub fn kind(&self) -> ExecErrorKind {
        match self {
            Self::Lookup => ExecErrorKind::Lookup,
            Self::Format(_) => ExecErrorKind::Format,
            Self::Capacity { .. } => ExecErrorKind::Capacity,
            Self::Resource { .. } => ExecErrorKind::Resource,
            Self::StackOverflow { .. } => ExecErrorKind::StackOverflow,
            Self::Transfer { .. } => ExecErrorKind::Transfer,
            Self::Config { .. } => ExecErrorKind::Config,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "executable not found"),
            Self::Format(e) => write!(f, "bad executable: {}", e),
            Self::Capacity { limit } => {
                write!(f, "too many loadable segments (limit {})", limit)
            }
            Self::Resource { resource } => write!(f, "resource exhausted: {}", resource),
            Self::StackOverflow { sp, stack_base } => {
                write!(
                    f,
                    "arguments overflow stack: sp 0x{:x} below base 0x{:x}",
                    sp, stack_base
                )
            }
            Self::Transfer { addr, reason } => {
                write!(f, "copy to 0x{:x} failed: {}", addr, reason)
            }
            Self::Config { reason } => write!(f, "invalid exec config: {}", reason),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset } => write!(f, "short read at offset 0x{:x}", offset),
            Self::BadMagic => write!(f, "bad ELF magic"),
            Self::MemSmallerThanFile { index } => {
                write!(f, "segment {}: memsz smaller than filesz", index)
            }
            Self::AddressOverflow { index } => {
                write!(f, "segment {}: vaddr + memsz overflows", index)
            }
            Self::FileRangeOverflow { index } => {
                write!(f, "segment {}: offset + filesz overflows", index)
            }
            Self::Misaligned { index, vaddr } => {
                write!(f, "segment {}: vaddr 0x{:x} not page aligned", index, vaddr)
            }
            Self::ImageTooLarge => write!(f, "image size overflows"),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file"),
            Self::ShortRead {
                offset,
                wanted,
                got,
            } => write!(
                f,
                "short read at 0x{:x}: wanted {} bytes, got {}",
                offset, wanted, got
            ),
            Self::BadInode { ino } => write!(f, "stale inode {}", ino),
            Self::Locked { ino } => write!(f, "inode {} already locked", ino),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::BadAddress { addr } => write!(f, "bad user address 0x{:x}", addr),
            Self::NoSuchSpace { id } => write!(f, "no address space {}", id),
            Self::AlreadyMapped { addr } => write!(f, "page 0x{:x} already mapped", addr),
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoImage => write!(f, "no address space installed"),
            Self::OutsideImage { addr } => write!(f, "0x{:x} outside image", addr),
            Self::GuardPage { addr } => write!(f, "0x{:x} hits stack guard page", addr),
            Self::AlreadyMapped { addr } => write!(f, "0x{:x} already mapped", addr),
            Self::NoCandidate => write!(f, "exec in progress without candidate space"),
            Self::NotStack { addr } => {
                write!(f, "0x{:x} is not a stack page of the candidate", addr)
            }
            Self::BadFileRange { addr } => {
                write!(f, "0x{:x}: segment file offset overflows", addr)
            }
            Self::NoBackingFile => write!(f, "no executable reference for file-backed page"),
            Self::Read { offset, reason } => {
                write!(f, "reading segment at 0x{:x}: {}", offset, reason)
            }
            Self::Map(e) => write!(f, "mapping page: {}", e),
        }
    }
}

// Conversion implementations
impl From<FormatError> for ExecError {
    fn from(err: FormatError) -> Self {
        Self::Format(err)
    }
}

impl From<FsError> for ExecError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Self::Lookup,
            FsError::ShortRead { offset, .. } => Self::Format(FormatError::Truncated { offset }),
            FsError::BadInode { .. } | FsError::Locked { .. } => Self::Resource {
                resource: "inode",
            },
        }
    }
}

impl From<VmError> for ExecError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::OutOfMemory => Self::Resource {
                resource: "address space",
            },
            VmError::BadAddress { addr } | VmError::AlreadyMapped { addr } => Self::Transfer {
                addr,
                reason: err,
            },
            VmError::NoSuchSpace { .. } => Self::Resource {
                resource: "address space",
            },
        }
    }
}

impl From<VmError> for FaultError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::AlreadyMapped { addr } => Self::AlreadyMapped { addr },
            other => Self::Map(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_classification() {
        assert_eq!(ExecError::from(FsError::NotFound), ExecError::Lookup);
        assert_eq!(
            ExecError::from(FsError::ShortRead {
                offset: 0x40,
                wanted: 56,
                got: 3
            })
            .kind(),
            ExecErrorKind::Format
        );
    }

    #[test]
    fn test_vm_error_classification() {
        assert_eq!(
            ExecError::from(VmError::OutOfMemory).kind(),
            ExecErrorKind::Resource
        );
        assert_eq!(
            ExecError::from(VmError::BadAddress { addr: 0x10 }).kind(),
            ExecErrorKind::Transfer
        );
    }

    #[test]
    fn test_display_mentions_addresses() {
        let e = ExecError::StackOverflow {
            sp: 0x4ff0,
            stack_base: 0x5000,
        };
        let text = format!("{}", e);
        assert!(text.contains("0x4ff0"));
        assert!(text.contains("0x5000"));
    }
}
