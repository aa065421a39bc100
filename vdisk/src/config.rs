//! Cargador de configuración para vdisk.
//! Lee un archivo INI con los valores por defecto de `mkdisk` y el prefijo de los ids de montaje.
//!
//! ```ini
//! [disk]
//! size = 5
//! unit = M
//! fit = FF
//!
//! [mount]
//! prefix = 27
//! ```
//!
//! Todas las claves son opcionales; una clave ausente toma su valor por defecto.

use std::path::Path;

use configparser::ini::Ini;

use crate::disk::Unit;
use crate::error::{Error, Result};
use crate::layout::Fit;

pub const DEFAULT_PREFIX: &str = "27";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Tamaño del disco en `unit`.
    pub size: i64,

    pub unit: Unit,

    /// Ajuste guardado en el MBR.
    pub fit: Fit,

    /// Prefijo (carnet) de los ids de montaje: `prefix + n + letra`.
    pub prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size: 5,
            unit: Unit::Mega,
            fit: Fit::First,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Carga la configuración desde `path`. Errores de lectura o valores inválidos
/// se reportan como `InvalidArgument`.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut ini = Ini::new();
    ini.load(path)
        .map_err(|e| Error::invalid(format!("cannot load {}: {}", path.display(), e)))?;
    from_ini(&ini)
}

/// Igual que [`load_config`] pero desde un string.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut ini = Ini::new();
    ini.read(text.to_string())
        .map_err(|e| Error::invalid(format!("bad config: {}", e)))?;
    from_ini(&ini)
}

fn from_ini(ini: &Ini) -> Result<Config> {
    let mut cfg = Config::default();

    // Sección [disk]
    if let Some(size) = ini
        .getint("disk", "size")
        .map_err(|e| Error::invalid(format!("disk.size: {}", e)))?
    {
        if size <= 0 {
            return Err(Error::invalid(format!("disk.size must be positive, got {}", size)));
        }
        cfg.size = size;
    }
    if let Some(unit) = ini.get("disk", "unit") {
        cfg.unit = unit.trim().parse()?;
    }
    if let Some(fit) = ini.get("disk", "fit") {
        cfg.fit = fit.trim().parse()?;
    }

    // Sección [mount]
    if let Some(prefix) = ini.get("mount", "prefix") {
        let prefix = prefix.trim();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid(format!("mount.prefix '{}' is not alphanumeric", prefix)));
        }
        cfg.prefix = prefix.to_string();
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(parse_config("").unwrap(), Config::default());
    }

    #[test]
    fn reads_all_sections() {
        let cfg = parse_config("[disk]\nsize = 10\nunit = k\nfit = WF\n[mount]\nprefix = 31\n").unwrap();
        assert_eq!(cfg.size, 10);
        assert_eq!(cfg.unit, Unit::Kilo);
        assert_eq!(cfg.fit, Fit::Worst);
        assert_eq!(cfg.prefix, "31");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(parse_config("[disk]\nsize = -3\n"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_config("[disk]\nsize = lots\n"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_config("[disk]\nunit = G\n"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_config("[mount]\nprefix = a b\n"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vdisk.ini");
        std::fs::write(&path, "[disk]\nsize = 2\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.size, 2);
        assert_eq!(cfg.unit, Unit::Mega);

        assert!(load_config(&dir.path().join("missing.ini")).is_err());
    }
}
