//! Entry point for the `rmdisk` tool: delete a disk image.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Delete a disk image", long_about = None)]
struct Cli {
    /// Disk image to delete.
    #[arg(short, long)]
    path: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Cli::parse();
    vdisk::remove_disk(&args.path)?;
    println!("Disk image {} removed", args.path.display());
    Ok(())
}
