//! CLI entry point for `vdisk_info`

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use vdisk::inspect::describe_disk;

/// Simple inspection tool for vdisk images
#[derive(Parser)]
struct Cli {
    /// Path to the disk image
    image: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Cli::parse();
    print!("{}", describe_disk(&args.image)?);
    Ok(())
}
