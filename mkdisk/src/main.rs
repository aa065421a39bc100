//! Entry point for the `mkdisk` tool.
//!
//! Creates a blank disk image: a zero-filled file of the requested size
//! with an empty MBR (four free partition slots) at byte 0.
//!
//! Size, unit and fit come from the command line, falling back to an
//! optional `config.ini` and then to the built-in defaults (5 M, FF).
//!
//! This file only handles CLI parsing. The actual work is in `mkdisk.rs`.

mod mkdisk;

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use vdisk::{Fit, Unit};

/// Command-line interface for the mkdisk tool.
///
/// Usage:
///
/// ```bash
/// mkdisk --path disks/Disco1.mia --size 5 --unit M
/// mkdisk --path disks/Disco2.mia --config /etc/vdisk/disk.ini
/// ```
#[derive(Parser)]
#[command(author, version, about = "Create an empty partitioned disk image", long_about = None)]
pub struct Cli {
    /// Where to write the image. Parent directories are created.
    #[arg(short, long)]
    pub path: PathBuf,

    /// Disk size in `unit`.
    #[arg(short, long)]
    pub size: Option<i64>,

    /// B, K or M.
    #[arg(short, long)]
    pub unit: Option<Unit>,

    /// BF, FF or WF.
    #[arg(short, long)]
    pub fit: Option<Fit>,

    /// INI file with `[disk]` defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Parse command-line arguments (clap handles error messages automatically)
    let args = Cli::parse();

    let bytes = mkdisk::run_mkdisk(&args)?;
    println!("Disk image created at {} ({} bytes)", args.path.display(), bytes);
    Ok(())
}
