//! Entry point for the `fdisk` tool: add a partition to a disk image.
//!
//! ```bash
//! fdisk --path disks/Disco1.mia --size 300 --name Part1
//! fdisk --path disks/Disco1.mia --size 1 --unit M --type E --fit BF --name Ext
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use vdisk::{create_partition, disk, logical_partitions, Fit, PartitionType, Unit};

#[derive(Parser)]
#[command(author, version, about = "Create primary, extended or logical partitions", long_about = None)]
struct Cli {
    /// Disk image to modify.
    #[arg(short, long)]
    path: PathBuf,

    /// Partition size in `unit`.
    #[arg(short, long)]
    size: i64,

    /// Partition name (up to 16 bytes).
    #[arg(short, long)]
    name: String,

    /// B, K or M.
    #[arg(short, long, default_value = "K")]
    unit: Unit,

    /// P (primary), E (extended) or L (logical).
    #[arg(short = 't', long = "type", default_value = "P")]
    kind: PartitionType,

    /// BF, FF or WF.
    #[arg(short, long, default_value = "WF")]
    fit: Fit,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();
    let size = disk::to_bytes(args.size, args.unit)?;

    create_partition(&args.path, size, args.kind, args.fit, &args.name)?;

    println!("Partition '{}' created on {}", args.name, args.path.display());
    let mbr = disk::read_mbr(&args.path)?;
    for p in mbr.partitions() {
        println!(
            "  #{} {:<16} @ {:>9}  {} bytes",
            p.correlative,
            p.name(),
            p.start,
            p.size
        );
    }
    for ebr in logical_partitions(&args.path)? {
        println!("     {:<16} @ {:>9}  {} bytes (logical)", ebr.name(), ebr.start, ebr.size);
    }
    Ok(())
}
