//! ELF64 image format
//!
//! Header layouts consumed by the exec format scanner. Decoding assumes a
//! little-endian host, as on every architecture this kernel targets.

#[cfg(not(target_endian = "little"))]
compile_error!("ELF64 headers are decoded in host byte order, which must be little-endian");

mod types;

pub use types::*;
