//! ELF64 type definitions
//!
//! On-disk layouts of the file header and program header, as read by the
//! exec format scanner. Only the fields exec consumes are interpreted.

use core::mem;

/// ELF magic number
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Segment is executable
pub const PF_X: u32 = 0x1;
/// Segment is writable
pub const PF_W: u32 = 0x2;
/// Segment is readable
pub const PF_R: u32 = 0x4;

/// Program header type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgramType {
    Null = 0,
    Load = 1,
    Dynamic = 2,
    Interp = 3,
    Note = 4,
    Shlib = 5,
    Phdr = 6,
    Tls = 7,
}

/// ELF header
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elf64Header {
    pub magic: [u8; 4],
    pub class: u8,
    pub data: u8,
    pub version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
    pub padding: [u8; 7],
    pub elf_type: u16,
    pub machine: u16,
    pub version2: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// Program header
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

pub const ELF_HEADER_SIZE: usize = mem::size_of::<Elf64Header>();
pub const PROGRAM_HEADER_SIZE: usize = mem::size_of::<Elf64ProgramHeader>();

impl Elf64Header {
    /// Decode a header from its on-disk bytes
    pub fn from_bytes(raw: &[u8; ELF_HEADER_SIZE]) -> Self {
        // SAFETY: `raw` is exactly size_of::<Elf64Header>() bytes. The header
        // is #[repr(C)] and made only of integers and byte arrays, so every
        // bit pattern is a valid value. read_unaligned copies out without
        // requiring the buffer to be aligned.
        unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Elf64Header) }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == ELF_MAGIC
    }

    /// Encode back into on-disk bytes
    pub fn to_bytes(&self) -> [u8; ELF_HEADER_SIZE] {
        let mut raw = [0u8; ELF_HEADER_SIZE];
        // SAFETY: `raw` has room for exactly one Elf64Header and
        // write_unaligned has no alignment requirement.
        unsafe { core::ptr::write_unaligned(raw.as_mut_ptr() as *mut Elf64Header, *self) };
        raw
    }
}

impl Elf64ProgramHeader {
    /// Decode a program header from its on-disk bytes
    pub fn from_bytes(raw: &[u8; PROGRAM_HEADER_SIZE]) -> Self {
        // SAFETY: same reasoning as Elf64Header::from_bytes: exact size,
        // #[repr(C)] integer-only layout, unaligned read.
        unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Elf64ProgramHeader) }
    }

    pub fn is_load(&self) -> bool {
        self.p_type == ProgramType::Load as u32
    }

    /// Encode back into on-disk bytes
    pub fn to_bytes(&self) -> [u8; PROGRAM_HEADER_SIZE] {
        let mut raw = [0u8; PROGRAM_HEADER_SIZE];
        // SAFETY: `raw` has room for exactly one Elf64ProgramHeader and
        // write_unaligned has no alignment requirement.
        unsafe {
            core::ptr::write_unaligned(raw.as_mut_ptr() as *mut Elf64ProgramHeader, *self)
        };
        raw
    }
}
