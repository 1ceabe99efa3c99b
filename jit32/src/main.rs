// jit32 - Guest image loader front-end
//
// Loads a 32-bit ARM ELF into a fresh guest memory window and prepares the
// register context its first core would start from.
//
// Usage:
//   jit32 guest.elf
//   jit32 --memory-size 0x4000000 --stack-size 0x100000 -v guest.elf

use anyhow::{Context, Result};
use clap::Parser;
use jit32::{elf, GuestMemory, RegisterContext};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jit32")]
#[command(about = "Load a 32-bit ARM guest image and prepare its initial core context")]
#[command(version)]
struct Args {
    /// Input ARM ELF executable
    input: PathBuf,

    /// Guest memory window size in bytes
    #[arg(long, default_value = "0x4000000", value_parser = parse_size)]
    memory_size: u64,

    /// Stack size in bytes, reserved at the top of the window
    #[arg(long, default_value = "0x100000", value_parser = parse_size)]
    stack_size: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Accept decimal or 0x-prefixed hex sizes
fn parse_size(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid size {s:?}: {e}"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // The whole window must be addressable by a 32-bit guest.
    if args.memory_size == 0 || args.memory_size > u32::MAX as u64 + 1 {
        anyhow::bail!("Memory size must be between 1 byte and 4 GiB");
    }
    if args.stack_size >= args.memory_size {
        anyhow::bail!("Stack size must be smaller than the memory window");
    }

    debug!("Loading ELF: {}", args.input.display());
    let data = std::fs::read(&args.input).context("Failed to read input ELF")?;
    let info = elf::parse(&data).context("Failed to parse ELF")?;

    let stack_bottom = args.memory_size - args.stack_size;
    if info.image_end() > stack_bottom {
        anyhow::bail!(
            "Image ends at 0x{:x}, overlapping the stack at 0x{:x}",
            info.image_end(),
            stack_bottom
        );
    }

    let memory_size = usize::try_from(args.memory_size).context("Memory size exceeds host address space")?;
    let memory = GuestMemory::new(memory_size).context("Failed to allocate guest memory")?;
    elf::load(&data, &info, &memory).context("Failed to load ELF")?;

    for seg in &info.segments {
        debug!(
            "  segment 0x{:08x}-0x{:08x} filesz=0x{:x} {}{}",
            seg.vaddr,
            seg.end(),
            seg.filesz,
            if seg.is_writable() { "w" } else { "-" },
            if seg.is_executable() { "x" } else { "-" },
        );
    }

    // Top of the window, 8-byte aligned as the AAPCS requires. A full 4 GiB
    // window tops out just below the wrap.
    let stack_top = u32::try_from(args.memory_size & !7).unwrap_or(u32::MAX & !7);
    let context = info.initial_context(stack_top);
    info!(
        "Loaded {} segment(s), entry 0x{:08x}",
        info.segments.len(),
        info.entry
    );

    print_context(&context);
    Ok(())
}

fn print_context(context: &RegisterContext) {
    for (i, chunk) in context.gpr.chunks(4).enumerate() {
        let line: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(j, value)| format!("r{:<2} = 0x{:08x}", i * 4 + j, value))
            .collect();
        println!("{}", line.join("  "));
    }
    println!("cpsr = 0x{:08x}  fpscr = 0x{:08x}", context.cpsr, context.fpscr);
}
