//! Demand-paged exec for a small Unix-like kernel
//!
//! This library implements the process-image replacement operation: it
//! validates an ELF64 image, builds a fresh address space for the calling
//! process, lays out the argument vector on the new stack, and then either
//! commits the new image atomically or rolls every acquired resource back.
//! Segment contents are never copied during exec; the segment table recorded
//! at commit time is consumed later by [`mm::demand_paging`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod elf;
pub mod error;
pub mod exec;
pub mod fs;
pub mod mm;
pub mod process;
pub mod syscall;

pub use config::ExecConfig;
pub use error::{ExecError, ExecErrorKind, ExecResult};
pub use exec::{replace_image, ExecContext};
pub use process::{Process, ProcessId};
