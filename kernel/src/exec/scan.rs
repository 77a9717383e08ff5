//! Format scanner
//!
//! Reads the ELF header and program-header table through a locked inode and
//! turns every `PT_LOAD` entry into a [`SegmentDescriptor`]. Segment contents
//! are never read here. This is the only validation gate before an address
//! space is allocated, so every geometry check happens in this pass.

use super::segment::{SegmentDescriptor, SegmentTable};
use crate::{
    config::PAGE_SIZE,
    elf::{Elf64Header, Elf64ProgramHeader, ELF_HEADER_SIZE, PROGRAM_HEADER_SIZE},
    error::{ExecResult, FormatError},
    fs::LockedInode,
    mm::SegmentPerms,
};

/// What the scanner learned about an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Entry program counter
    pub entry: u64,
    /// Highest `p_vaddr + p_memsz` over loadable segments, not rounded
    pub image_end: u64,
    /// Loadable segments in program-header order
    pub segments: SegmentTable,
}

/// Validate `inode` as an executable and collect its loadable segments.
pub fn scan_image(inode: &LockedInode<'_>) -> ExecResult<ScanResult> {
    let mut raw = [0u8; ELF_HEADER_SIZE];
    inode.read_exact_at(0, &mut raw)?;
    let header = Elf64Header::from_bytes(&raw);
    if !header.has_valid_magic() {
        return Err(FormatError::BadMagic.into());
    }

    let mut segments = SegmentTable::new();
    let mut image_end = 0u64;

    for index in 0..header.phnum as usize {
        let offset = (index as u64)
            .checked_mul(PROGRAM_HEADER_SIZE as u64)
            .and_then(|rel| header.phoff.checked_add(rel))
            .ok_or(FormatError::Truncated {
                offset: header.phoff,
            })?;

        let mut raw = [0u8; PROGRAM_HEADER_SIZE];
        inode.read_exact_at(offset, &mut raw)?;
        let ph = Elf64ProgramHeader::from_bytes(&raw);
        if !ph.is_load() {
            continue;
        }

        let segment = check_segment(index, &ph)?;
        segments.push(segment)?;
        image_end = image_end.max(segment.end());

        log::trace!(
            "[EXEC] segment {}: va {:#x} memsz {:#x} filesz {:#x} off {:#x} {:?}",
            index,
            segment.virtual_address,
            segment.memory_size,
            segment.file_size,
            segment.file_offset,
            segment.permissions
        );
    }

    Ok(ScanResult {
        entry: header.entry,
        image_end,
        segments,
    })
}

fn check_segment(index: usize, ph: &Elf64ProgramHeader) -> Result<SegmentDescriptor, FormatError> {
    if ph.p_memsz < ph.p_filesz {
        return Err(FormatError::MemSmallerThanFile { index });
    }
    if ph.p_vaddr.checked_add(ph.p_memsz).is_none() {
        return Err(FormatError::AddressOverflow { index });
    }
    if ph.p_offset.checked_add(ph.p_filesz).is_none() {
        return Err(FormatError::FileRangeOverflow { index });
    }
    if ph.p_vaddr % PAGE_SIZE != 0 {
        return Err(FormatError::Misaligned {
            index,
            vaddr: ph.p_vaddr,
        });
    }

    Ok(SegmentDescriptor {
        virtual_address: ph.p_vaddr,
        memory_size: ph.p_memsz,
        file_size: ph.p_filesz,
        file_offset: ph.p_offset,
        permissions: SegmentPerms::from_elf_flags(ph.p_flags),
    })
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec::Vec};

    use super::*;
    use crate::{
        config::MAX_EXEC_SEGS,
        elf::{ProgramType, ELF_MAGIC, PF_R, PF_W, PF_X},
        error::ExecError,
        fs::{ramfs::RamFs, FileSystem, Transaction},
    };

    fn load(va: u64, memsz: u64, filesz: u64, flags: u32) -> Elf64ProgramHeader {
        Elf64ProgramHeader {
            p_type: ProgramType::Load as u32,
            p_flags: flags,
            p_offset: 0,
            p_vaddr: va,
            p_paddr: va,
            p_filesz: filesz,
            p_memsz: memsz,
            p_align: PAGE_SIZE,
        }
    }

    fn image(entry: u64, phdrs: &[Elf64ProgramHeader]) -> Vec<u8> {
        let header = Elf64Header {
            magic: ELF_MAGIC,
            entry,
            phoff: ELF_HEADER_SIZE as u64,
            phentsize: PROGRAM_HEADER_SIZE as u16,
            phnum: phdrs.len() as u16,
            ..Default::default()
        };
        let mut out = header.to_bytes().to_vec();
        for ph in phdrs {
            out.extend_from_slice(&ph.to_bytes());
        }
        out
    }

    fn scan(bytes: &[u8]) -> ExecResult<ScanResult> {
        let ramfs = Arc::new(RamFs::new());
        ramfs.add_file("/bin/t", bytes);
        let fs: Arc<dyn FileSystem> = ramfs.clone();
        let result = {
            let _tx = Transaction::begin(fs.as_ref());
            let inode = LockedInode::open(&fs, "/bin/t")?;
            scan_image(&inode)
        };
        assert!(!ramfs.any_locked());
        assert_eq!(ramfs.transaction_depth(), 0);
        result
    }

    #[test]
    fn test_skips_non_load_entries() {
        let mut note = load(0, 0, 0, 0);
        note.p_type = ProgramType::Note as u32;
        let bytes = image(
            0x1000,
            &[
                load(0x1000, 0x1800, 0x1000, PF_R | PF_X),
                note,
                load(0x4000, 0x1000, 0x10, PF_R | PF_W),
            ],
        );

        let result = scan(&bytes).unwrap();
        assert_eq!(result.entry, 0x1000);
        assert_eq!(result.image_end, 0x5000);
        assert_eq!(result.segments.len(), 2);
        assert_eq!(
            result.segments.as_slice()[0].permissions,
            SegmentPerms::READ | SegmentPerms::EXEC
        );
        assert_eq!(
            result.segments.as_slice()[1].permissions,
            SegmentPerms::READ | SegmentPerms::WRITE
        );
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = image(0, &[]);
        bytes[0] = 0;
        assert_eq!(scan(&bytes), Err(ExecError::Format(FormatError::BadMagic)));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let bytes = image(0, &[]);
        assert_eq!(
            scan(&bytes[..32]),
            Err(ExecError::Format(FormatError::Truncated { offset: 0 }))
        );
    }

    #[test]
    fn test_rejects_truncated_program_table() {
        let bytes = image(0, &[load(0x1000, 0x1000, 0, PF_R)]);
        assert_eq!(
            scan(&bytes[..ELF_HEADER_SIZE + 10]),
            Err(ExecError::Format(FormatError::Truncated {
                offset: ELF_HEADER_SIZE as u64
            }))
        );
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let bytes = image(0, &[load(0x1000, 0x10, 0x20, PF_R)]);
        assert_eq!(
            scan(&bytes),
            Err(ExecError::Format(FormatError::MemSmallerThanFile { index: 0 }))
        );

        let bytes = image(0, &[load(0x1000, 0, 0, 0), load(u64::MAX - 0xfff, 0x2000, 0, 0)]);
        assert_eq!(
            scan(&bytes),
            Err(ExecError::Format(FormatError::AddressOverflow { index: 1 }))
        );

        let bytes = image(0, &[load(0x1234, 0x10, 0, PF_R)]);
        assert_eq!(
            scan(&bytes),
            Err(ExecError::Format(FormatError::Misaligned {
                index: 0,
                vaddr: 0x1234
            }))
        );
    }

    #[test]
    fn test_rejects_wrapping_file_range() {
        let mut ph = load(0x1000, 0x2000, 0x2000, PF_R | PF_X);
        ph.p_offset = u64::MAX - 0x10;
        assert_eq!(
            scan(&image(0x1000, &[ph])),
            Err(ExecError::Format(FormatError::FileRangeOverflow { index: 0 }))
        );

        // Ending exactly at u64::MAX is representable
        ph.p_offset = u64::MAX - 0x2000;
        assert!(scan(&image(0x1000, &[ph])).is_ok());
    }

    #[test]
    fn test_rejects_too_many_segments() {
        let phdrs: Vec<_> = (0..=MAX_EXEC_SEGS as u64)
            .map(|i| load(i * PAGE_SIZE, PAGE_SIZE, 0, PF_R))
            .collect();
        assert_eq!(
            scan(&image(0, &phdrs)),
            Err(ExecError::Capacity {
                limit: MAX_EXEC_SEGS
            })
        );
    }

    #[test]
    fn test_accepts_image_without_segments() {
        let result = scan(&image(0x40, &[])).unwrap();
        assert_eq!(result.image_end, 0);
        assert!(result.segments.is_empty());
    }
}
