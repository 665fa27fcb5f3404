use anyhow::{Context, Result};
use clap::Parser;

use st7xsim::cli::Cli;
use st7xsim::loader::Segment;
use st7xsim::simulator::Simulator;

/// Instruction-set simulator for the ST7/ST8-variant secure-tag
/// microcontroller and its AES-CMAC command protocol.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Firmware image to load at startup (S-record, flash text, or raw
    /// binary, selected by file extension).
    #[arg(long)]
    rom: Option<String>,

    /// Segment to place a raw binary image in, when `--rom` has no
    /// recognized extension.
    #[arg(long, value_enum, default_value = "page0")]
    segment: SegmentArg,

    /// Snapshot bundle base path to restore from instead of `--rom`.
    #[arg(long)]
    snapshot: Option<String>,

    /// Session key for the AES-CMAC engine, as 32 hex digits.
    #[arg(long, default_value = "00000000000000000000000000000000")]
    key: String,

    /// Run a batch script of CLI commands (one per line) instead of an
    /// interactive REPL.
    #[arg(long)]
    batch: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum SegmentArg {
    Page0,
    Page1Lo,
    Page1Hi,
}

impl From<SegmentArg> for Segment {
    fn from(value: SegmentArg) -> Self {
        match value {
            SegmentArg::Page0 => Segment::Page0,
            SegmentArg::Page1Lo => Segment::Page1Low,
            SegmentArg::Page1Hi => Segment::Page1High,
        }
    }
}

fn parse_key(hex: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hex).context("session key must be 32 hex digits")?;
    if bytes.len() != 16 {
        anyhow::bail!("session key must decode to exactly 16 bytes, got {}", bytes.len());
    }
    let mut key = [0u8; 16];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let key = parse_key(&args.key)?;
    let mut sim = Simulator::new(key);

    if let Some(base) = &args.snapshot {
        sim.load_snapshot(base)?;
    } else if let Some(rom) = &args.rom {
        let n = sim.load_firmware_image(rom, args.segment.into())?;
        log::info!("loaded {n} bytes from {rom}");
    }

    let mut cli = Cli::new(sim);

    if let Some(batch_path) = &args.batch {
        let text = std::fs::read_to_string(batch_path)
            .with_context(|| format!("reading batch script {batch_path}"))?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        cli.run_batch(&lines)?;
    } else {
        cli.run_repl()?;
    }

    Ok(())
}
