//! Memory management types used by exec
//!
//! Page arithmetic, user page permissions, the address-space primitive
//! interface ([`vas`]) and the demand-paging resolver that consumes the
//! segment table exec records ([`demand_paging`]).

pub mod demand_paging;
pub mod sim;
pub mod vas;

use bitflags::bitflags;

pub use crate::config::PAGE_SIZE;
pub use vas::{PageTables, SpaceId, UserSpace};

/// Round up to the next page boundary. `None` if that wraps.
pub fn page_round_up(addr: u64) -> Option<u64> {
    addr.checked_add(PAGE_SIZE - 1).map(|a| a & !(PAGE_SIZE - 1))
}

pub fn page_round_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

bitflags! {
    /// Permissions of a user mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SegmentPerms: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl SegmentPerms {
    /// Map ELF `p_flags` to user permissions. Read is always granted.
    pub fn from_elf_flags(flags: u32) -> Self {
        let mut perms = Self::READ;
        if flags & crate::elf::PF_X != 0 {
            perms |= Self::EXEC;
        }
        if flags & crate::elf::PF_W != 0 {
            perms |= Self::WRITE;
        }
        perms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_rounding() {
        assert_eq!(page_round_up(0), Some(0));
        assert_eq!(page_round_up(1), Some(PAGE_SIZE));
        assert_eq!(page_round_up(0x3000), Some(0x3000));
        assert_eq!(page_round_up(u64::MAX), None);
        assert_eq!(page_round_down(0x1fff), 0x1000);
    }

    #[test]
    fn test_perms_from_elf_flags() {
        assert_eq!(SegmentPerms::from_elf_flags(0), SegmentPerms::READ);
        assert_eq!(
            SegmentPerms::from_elf_flags(crate::elf::PF_X | crate::elf::PF_R),
            SegmentPerms::READ | SegmentPerms::EXEC
        );
        assert_eq!(
            SegmentPerms::from_elf_flags(crate::elf::PF_W),
            SegmentPerms::READ | SegmentPerms::WRITE
        );
    }
}
