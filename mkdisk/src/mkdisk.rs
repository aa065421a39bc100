//! mkdisk module: responsible for creating a brand-new disk image.
//!
//!   1. Load config.ini when given
//!   2. Let command-line values override it
//!   3. Convert the size to bytes
//!   4. Write the zero-filled image and its MBR

use log::debug;

use vdisk::{config, create_disk, disk, Config, Result};

use crate::Cli;

/// Resolved size, unit and fit for `args`: CLI first, then config file,
/// then defaults.
pub fn resolve(args: &Cli) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(size) = args.size {
        cfg.size = size;
    }
    if let Some(unit) = args.unit {
        cfg.unit = unit;
    }
    if let Some(fit) = args.fit {
        cfg.fit = fit;
    }
    Ok(cfg)
}

/// Main entry point for mkdisk. Returns the image size in bytes.
pub fn run_mkdisk(args: &Cli) -> Result<i32> {
    let cfg = resolve(args)?;
    debug!("mkdisk settings: {:?}", cfg);

    let bytes = disk::to_bytes(cfg.size, cfg.unit)?;
    create_disk(&args.path, bytes, cfg.fit)?;
    Ok(bytes)
}
