// elf.rs - Guest image loading for 32-bit ARM executables
//
// Uses goblin for parsing, copies loadable segments into a guest memory
// window and derives the register context a core starts from.

use crate::context::RegisterContext;
use crate::memory::GuestMemory;
use anyhow::{Context, Result};
use goblin::elf::{header, program_header, Elf};

/// CPSR mode field value for User mode
const CPSR_MODE_USER: u32 = 0x10;
/// CPSR T bit: execute Thumb instructions
const CPSR_THUMB: u32 = 1 << 5;

/// Information about a parsed guest image
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Entry address; bit 0 selects Thumb state
    pub entry: u32,
    pub segments: Vec<Segment>,
}

/// A loadable segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub vaddr: u32,
    pub memsz: u32,
    pub filesz: u32,
    pub offset: u32,
    pub flags: u32,
}

impl Segment {
    /// First guest address past the segment
    pub fn end(&self) -> u64 {
        self.vaddr as u64 + self.memsz as u64
    }

    pub fn is_executable(&self) -> bool {
        self.flags & program_header::PF_X != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & program_header::PF_W != 0
    }
}

impl ImageInfo {
    /// Highest guest address covered by any segment
    pub fn image_end(&self) -> u64 {
        self.segments.iter().map(Segment::end).max().unwrap_or(0)
    }

    /// Register context for the first thread: PC at the entry point, SP at
    /// `stack_top`, User mode, Thumb state if the entry address asks for it.
    pub fn initial_context(&self, stack_top: u32) -> RegisterContext {
        let mut context = RegisterContext::default();
        context.set_pc(self.entry & !1);
        context.set_sp(stack_top);
        context.cpsr = CPSR_MODE_USER;
        if self.entry & 1 != 0 {
            context.cpsr |= CPSR_THUMB;
        }
        context
    }
}

/// Parse an ELF image and extract its loadable segments
pub fn parse(data: &[u8]) -> Result<ImageInfo> {
    let elf = Elf::parse(data).context("Invalid ELF format")?;

    if elf.header.e_machine != header::EM_ARM {
        anyhow::bail!("Not an ARM binary (e_machine=0x{:x})", elf.header.e_machine);
    }

    if elf.is_64 {
        anyhow::bail!("Only 32-bit ARM (A32/T32) images are supported");
    }

    if !elf.little_endian {
        anyhow::bail!("Big-endian ARM images are not supported");
    }

    let segments = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == program_header::PT_LOAD)
        .map(|ph| {
            // A 32-bit ELF cannot encode wider values, so these never truncate.
            Segment {
                vaddr: ph.p_vaddr as u32,
                memsz: ph.p_memsz as u32,
                filesz: ph.p_filesz as u32,
                offset: ph.p_offset as u32,
                flags: ph.p_flags,
            }
        })
        .collect::<Vec<_>>();

    if segments.is_empty() {
        anyhow::bail!("Image has no loadable segments");
    }

    Ok(ImageInfo {
        entry: elf.entry as u32,
        segments,
    })
}

/// Copy every loadable segment of `data` into `memory` and zero the part of
/// each segment past its file-backed bytes.
pub fn load(data: &[u8], info: &ImageInfo, memory: &GuestMemory) -> Result<()> {
    for seg in &info.segments {
        if seg.filesz > seg.memsz {
            anyhow::bail!(
                "Segment at 0x{:08x} has filesz 0x{:x} larger than memsz 0x{:x}",
                seg.vaddr,
                seg.filesz,
                seg.memsz
            );
        }

        if seg.end() > memory.len() as u64 {
            anyhow::bail!(
                "Segment 0x{:08x}-0x{:08x} does not fit in the 0x{:x}-byte guest window",
                seg.vaddr,
                seg.end(),
                memory.len()
            );
        }

        let start = seg.offset as usize;
        let bytes = start
            .checked_add(seg.filesz as usize)
            .and_then(|end| data.get(start..end))
            .with_context(|| format!("Segment at 0x{:08x} extends past end of file", seg.vaddr))?;

        memory.write_bytes(seg.vaddr, bytes);

        let bss = (seg.memsz - seg.filesz) as usize;
        if bss > 0 {
            memory.fill_bytes(seg.vaddr + seg.filesz, bss, 0);
        }
    }

    Ok(())
}
