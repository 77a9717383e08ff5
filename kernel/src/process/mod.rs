//! Process entity as seen by exec
//!
//! Only the image-related fields of the process control block live here:
//! the installed address space, its size, the segment table and retained
//! executable reference, the trap frame and the exec-in-progress marker.

pub mod pcb;

pub use pcb::{
    ExecInProgress, ExecState, ImageSnapshot, Process, ProcessId, ProcessImage, ProcessName,
    TrapFrame,
};
