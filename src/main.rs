// CLI front end. Follows the `main.rs`/`atari.rs` pattern of building a
// `Configuration` by hand and handing it to `Emulator::new`; here the
// `Configuration` is instead assembled from `clap`-parsed flags, since a
// configurable core has no single fixed machine like an Atari ST boot ROM
// to hard-code.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use em32::config::{Config, Features, PageSize, SegmentSize, TlbSize};
use em32::{Configuration, Emulator, RunOutcome};

/// Runs a memory-image program on the core execution engine.
#[derive(Parser, Debug)]
#[command(name = "em32sim", version, about)]
struct Cli {
    /// Path to the raw memory-image file to load.
    image: PathBuf,

    /// Address the image is loaded at and execution starts from.
    #[arg(long, value_parser = parse_u32, default_value = "0x400")]
    load_address: u32,

    /// Memory size in words; must be a power of two in [16Ki, 4Mi].
    #[arg(long, default_value_t = 1 << 20)]
    memory_words: usize,

    #[arg(long, value_enum, default_value_t = PageSizeArg::Small2k)]
    page_size: PageSizeArg,

    #[arg(long, value_enum, default_value_t = SegmentSizeArg::Small64k)]
    segment_size: SegmentSizeArg,

    /// Translation-cache size, 16 or 32 entries.
    #[arg(long, default_value_t = 16)]
    tlb_entries: u32,

    /// Ring-buffer length for the instruction-trace history.
    #[arg(long, default_value_t = 256)]
    history_len: usize,

    /// Device address treated as the boot device, if any.
    #[arg(long, value_parser = parse_u16)]
    boot_device: Option<u16>,

    #[arg(long)]
    disable_decimal: bool,
    #[arg(long)]
    disable_floating: bool,
    #[arg(long)]
    enable_extended_floating: bool,
    #[arg(long)]
    disable_storage_protect: bool,
    #[arg(long)]
    enable_unaligned_access: bool,
    #[arg(long)]
    disable_translation: bool,
    #[arg(long)]
    disable_timer: bool,

    /// Maximum number of instruction steps to execute before stopping.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PageSizeArg {
    Small2k,
    Large4k,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SegmentSizeArg {
    Small64k,
    Large1m,
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            memory_words: self.memory_words,
            features: Features {
                decimal: !self.disable_decimal,
                floating: !self.disable_floating,
                extended_floating: self.enable_extended_floating,
                storage_protect: !self.disable_storage_protect,
                unaligned_access: self.enable_unaligned_access,
                translation: !self.disable_translation,
                timer: !self.disable_timer,
            },
            page_size: match self.page_size {
                PageSizeArg::Small2k => PageSize::Small2K,
                PageSizeArg::Large4k => PageSize::Large4K,
            },
            segment_size: match self.segment_size {
                SegmentSizeArg::Small64k => SegmentSize::Small64K,
                SegmentSizeArg::Large1m => SegmentSize::Large1M,
            },
            tlb_size: if self.tlb_entries >= 32 { TlbSize::Entries32 } else { TlbSize::Entries16 },
            history_len: self.history_len,
            boot_device: self.boot_device,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.config();
    config.validate().map_err(anyhow::Error::msg)?;

    let configuration = Configuration::from_image_file(config, cli.load_address, &cli.image)
        .with_context(|| format!("reading memory image {}", cli.image.display()))?;

    let mut emulator = Emulator::new(configuration).map_err(|fault| anyhow::anyhow!("{fault}"))?;

    match emulator.run(cli.max_steps).map_err(|fault| anyhow::anyhow!("{fault}"))? {
        RunOutcome::StepLimitReached => {
            log::info!("stopped after {} steps at pc {:#x}", cli.max_steps, emulator.cpu().psw.instruction_addr);
        }
        RunOutcome::WaitWithNoPendingWork => {
            log::info!("machine entered wait state with no pending work at pc {:#x}", emulator.cpu().psw.instruction_addr);
        }
    }

    print_registers(&emulator);
    Ok(())
}

/// Human-facing register dump for the end of a run: a plain table, not a
/// log record.
fn print_registers(emulator: &Emulator) {
    let cpu = emulator.cpu();
    println!("pc: {:#010x}  cc: {}", cpu.psw.instruction_addr, cpu.psw.cc);
    for row in 0..4 {
        print!("  ");
        for col in 0..4 {
            let r = row * 4 + col;
            print!("r{:<2}={:08x} ", r, cpu.gpr[r]);
        }
        println!();
    }
}
