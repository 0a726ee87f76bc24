//! Antenna models known to the IGS antenna calibration (ANTEX) file.
use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the cache file, stored next to the ANTEX file
const CACHE_NAME: &str = "antennas.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AntennaCatalog {
    /// Sorted antenna models
    pub antennas: Vec<String>,

    /// ANTEX modification time (seconds since unix epoch)
    pub modified: f64,
}

impl AntennaCatalog {
    /// Parses ANTEX content: first token of each "TYPE / SERIAL NO" record.
    /// Satellite antennas carry a serial number and are not retained.
    pub fn from_antex<R: BufRead>(reader: R, modified: f64) -> Result<Self> {
        let mut models = BTreeSet::new();

        for line in reader.lines() {
            let line = line?;
            if !line.trim_end().ends_with("TYPE / SERIAL NO") {
                continue;
            }

            // A20: type, A20: serial number (satellite antennas only)
            let model = line.get(..20).unwrap_or(&line).trim();
            let serial = line.get(20..40).map(str::trim).unwrap_or_default();

            if model.is_empty() || !serial.is_empty() {
                continue;
            }

            if let Some(first) = model.split_ascii_whitespace().next() {
                models.insert(first.to_string());
            }
        }

        Ok(Self {
            antennas: models.into_iter().collect(),
            modified,
        })
    }

    /// Loads the catalog of this ANTEX file, using (and refreshing) the JSON cache.
    pub fn load(antex: &Path) -> Result<Self> {
        let modified = modification_time(antex)?;
        let cache = cache_path(antex);

        if let Ok(fd) = File::open(&cache) {
            match serde_json::from_reader::<_, Self>(BufReader::new(fd)) {
                Ok(catalog) if catalog.modified == modified => {
                    debug!("antenna catalog loaded from {}", cache.display());
                    return Ok(catalog);
                },
                Ok(_) => debug!("antenna catalog {} is outdated", cache.display()),
                Err(e) => warn!("corrupt antenna catalog {}: {}", cache.display(), e),
            }
        }

        let fd = File::open(antex)?;
        let catalog = Self::from_antex(BufReader::new(fd), modified)?;

        match File::create(&cache) {
            Ok(fd) => {
                serde_json::to_writer(BufWriter::new(fd), &catalog)?;
            },
            Err(e) => {
                warn!("failed to cache antenna catalog {}: {}", cache.display(), e);
            },
        }

        Ok(catalog)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.antennas
            .binary_search_by(|item| item.as_str().cmp(model))
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.antennas.is_empty()
    }
}

fn cache_path(antex: &Path) -> PathBuf {
    antex
        .parent()
        .map(|dir| dir.join(CACHE_NAME))
        .unwrap_or_else(|| PathBuf::from(CACHE_NAME))
}

fn modification_time(path: &Path) -> Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|dt| dt.as_secs_f64())
        .unwrap_or_default())
}

#[cfg(test)]
mod test {
    use super::AntennaCatalog;
    use std::io::Cursor;

    const ANTEX: &str = "\
     1.4            M                                       ANTEX VERSION / SYST
                                                            START OF ANTENNA
BLOCK IIA           G01                 G032      1992-079A TYPE / SERIAL NO
                                                            END OF ANTENNA
                                                            START OF ANTENNA
TRM55971.00     NONE                                        TYPE / SERIAL NO
                                                            END OF ANTENNA
                                                            START OF ANTENNA
JAVRINGANT_DM   SCIS                                        TYPE / SERIAL NO
                                                            END OF ANTENNA
                                                            START OF ANTENNA
AERAT1675_120   SPKE                                        TYPE / SERIAL NO
";

    #[test]
    fn test_antex_parsing() {
        let catalog = AntennaCatalog::from_antex(Cursor::new(ANTEX), 0.0).unwrap();
        assert_eq!(
            catalog.antennas,
            vec!["AERAT1675_120", "JAVRINGANT_DM", "TRM55971.00"]
        );
        assert!(catalog.contains("JAVRINGANT_DM"));
        assert!(!catalog.contains("BLOCK"));
    }

    #[test]
    fn test_cache() {
        let dir = tempfile::tempdir().unwrap();
        let antex = dir.path().join("igs14.atx");
        std::fs::write(&antex, ANTEX).unwrap();

        let first = AntennaCatalog::load(&antex).unwrap();
        assert!(dir.path().join("antennas.json").exists());

        let second = AntennaCatalog::load(&antex).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.antennas.len(), 3);
    }
}
