//! Common test utilities for the exec integration tests

#![allow(dead_code)]

use std::sync::Arc;

use lazyexec_kernel::{
    elf::{
        Elf64Header, Elf64ProgramHeader, ProgramType, ELF_HEADER_SIZE, ELF_MAGIC, PF_R, PF_W,
        PF_X, PROGRAM_HEADER_SIZE,
    },
    exec::{replace_image, ExecContext},
    fs::{ramfs::RamFs, FileSystem, InodeNum},
    mm::{sim::SimPageTables, PageTables, SpaceId, PAGE_SIZE},
    process::{Process, ProcessId},
    ExecConfig,
};

pub const RX: u32 = PF_R | PF_X;
pub const RW: u32 = PF_R | PF_W;

/// Filler for file bytes past the headers, so reads can be checked
pub fn pattern_byte(offset: usize) -> u8 {
    (offset % 251) as u8
}

/// Builds ELF64 images in memory
#[derive(Default)]
pub struct ElfBuilder {
    entry: u64,
    phdrs: Vec<Elf64ProgramHeader>,
}

impl ElfBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            phdrs: Vec::new(),
        }
    }

    /// Add a `PT_LOAD` entry
    pub fn load(self, va: u64, memsz: u64, filesz: u64, offset: u64, flags: u32) -> Self {
        self.phdr(Elf64ProgramHeader {
            p_type: ProgramType::Load as u32,
            p_flags: flags,
            p_offset: offset,
            p_vaddr: va,
            p_paddr: va,
            p_filesz: filesz,
            p_memsz: memsz,
            p_align: PAGE_SIZE,
        })
    }

    /// Add a non-loadable entry
    pub fn note(self) -> Self {
        self.phdr(Elf64ProgramHeader {
            p_type: ProgramType::Note as u32,
            p_offset: 0,
            p_filesz: 0x20,
            ..Default::default()
        })
    }

    pub fn phdr(mut self, ph: Elf64ProgramHeader) -> Self {
        self.phdrs.push(ph);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header = Elf64Header {
            magic: ELF_MAGIC,
            class: 2,
            data: 1,
            version: 1,
            elf_type: 2,
            machine: 0xf3,
            version2: 1,
            entry: self.entry,
            phoff: ELF_HEADER_SIZE as u64,
            ehsize: ELF_HEADER_SIZE as u16,
            phentsize: PROGRAM_HEADER_SIZE as u16,
            phnum: self.phdrs.len() as u16,
            ..Default::default()
        };

        let mut out = header.to_bytes().to_vec();
        for ph in &self.phdrs {
            out.extend_from_slice(&ph.to_bytes());
        }

        let end = self
            .phdrs
            .iter()
            .filter(|ph| ph.p_type == ProgramType::Load as u32)
            .map(|ph| (ph.p_offset + ph.p_filesz) as usize)
            .max()
            .unwrap_or(0);
        while out.len() < end {
            out.push(pattern_byte(out.len()));
        }
        out
    }
}

/// The single-segment program used throughout the exec tests
pub fn prog_image() -> Vec<u8> {
    ElfBuilder::new(0x1000)
        .load(0x1000, 0x2000, 0x1500, 0x40, RX)
        .build()
}

/// Filesystem, page tables and exec context wired together
pub struct World {
    pub ramfs: Arc<RamFs>,
    pub vm: Arc<SimPageTables>,
    pub ctx: ExecContext,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(ExecConfig::default())
    }

    pub fn with_config(config: ExecConfig) -> Self {
        let ramfs = Arc::new(RamFs::new());
        let vm = Arc::new(SimPageTables::new());
        let fs: Arc<dyn FileSystem> = ramfs.clone();
        let tables: Arc<dyn PageTables> = vm.clone();
        let world = Self {
            ramfs,
            vm,
            ctx: ExecContext::new(fs, tables, config),
        };
        world.install(
            "/init",
            &ElfBuilder::new(0x0)
                .load(0x0, 0x1000, 0x200, 0x0, RX)
                .build(),
        );
        world.install("/bin/prog", &prog_image());
        world
    }

    pub fn install(&self, path: &str, bytes: &[u8]) -> InodeNum {
        self.ramfs.add_file(path, bytes)
    }

    /// A process already running `/init`
    pub fn boot(&self, pid: u64) -> Process {
        let mut process = Process::new(ProcessId(pid), "initcode");
        let argc = replace_image(&self.ctx, &mut process, "/init", &[b"init"])
            .expect("booting /init");
        assert_eq!(argc, 1);
        process
    }

    pub fn space_of(process: &Process) -> SpaceId {
        process
            .image()
            .space()
            .expect("process has an installed space")
            .id()
    }

    /// Everything a failed exec could leak
    pub fn held(&self) -> Held {
        Held {
            refs: self.ramfs.total_refs(),
            spaces: self.vm.live_spaces(),
            locked: self.ramfs.any_locked(),
            tx_depth: self.ramfs.transaction_depth(),
        }
    }

    pub fn assert_no_pairing_errors(&self) {
        assert_eq!(self.ramfs.bad_releases(), 0, "unpaired inode release");
        assert_eq!(self.vm.bad_destroys(), 0, "destroy of unknown space");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held {
    pub refs: usize,
    pub spaces: usize,
    pub locked: bool,
    pub tx_depth: usize,
}
