use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::debug;
use regex::Regex;

use crate::{error::Result, fd::copy_plain};

/// RINEX extensions: ".yyO", ".yyN", ".yyG" or their long forms, possibly gzip compressed
static RINEX_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d\d[ong]|obs|nav|gnav)(\.gz)?$").unwrap());

/// Kind of RINEX file, deduced from its extension
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RinexKind {
    Observation,
    Navigation,
    GlonassNavigation,
}

impl RinexKind {
    /// Deduces the kind from an extension like "20o", "obs" or "20g.gz"
    pub fn from_extension(extension: &str) -> Option<Self> {
        let captures = RINEX_EXTENSION.captures(extension)?;
        let ext = captures.get(1)?.as_str().to_lowercase();

        if ext.contains('g') {
            Some(Self::GlonassNavigation)
        } else if ext.contains('n') {
            Some(Self::Navigation)
        } else {
            Some(Self::Observation)
        }
    }

    /// Normalized extension of the copies
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Observation => "obs",
            Self::Navigation => "nav",
            Self::GlonassNavigation => "gnav",
        }
    }

    /// Short code, as used by exclusion lists
    pub fn code(&self) -> &'static str {
        match self {
            Self::Observation => "o",
            Self::Navigation => "n",
            Self::GlonassNavigation => "g",
        }
    }
}

/// File name up to its first dot, and what follows it
fn split_name(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_string_lossy().to_string();
    let (stem, extension) = name.split_once('.')?;
    Some((stem.to_string(), extension.to_string()))
}

/// Copied RINEX files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RinexCopies {
    pub obs: Option<PathBuf>,
    pub nav: Option<PathBuf>,
    pub gnav: Option<PathBuf>,
}

/// Copies all RINEX files sharing the stem of `path` (observation, navigation
/// and glonass navigation) into `dir`, decompressed, with normalized extensions.
/// Kinds listed in `exclude` ("o", "n", "g") are not copied.
pub fn copy_rinex(path: &Path, dir: &Path, exclude: &[&str]) -> Result<RinexCopies> {
    let mut copies = RinexCopies::default();

    let Some((stem, _)) = split_name(path) else {
        return Ok(copies);
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut siblings = std::fs::read_dir(&parent)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();

    // deterministic choice when several files share a kind
    siblings.sort();

    for sibling in siblings {
        let Some((sibling_stem, extension)) = split_name(&sibling) else {
            continue;
        };

        if sibling_stem != stem {
            continue;
        }

        let Some(kind) = RinexKind::from_extension(&extension) else {
            continue;
        };

        if exclude.contains(&kind.code()) {
            continue;
        }

        let slot = match kind {
            RinexKind::Observation => &mut copies.obs,
            RinexKind::Navigation => &mut copies.nav,
            RinexKind::GlonassNavigation => &mut copies.gnav,
        };

        if slot.is_some() {
            continue;
        }

        let target = dir.join(format!("{}.{}", stem, kind.extension()));
        copy_plain(&sibling, &target)?;

        debug!("{} copied to {}", sibling.display(), target.display());
        *slot = Some(target);
    }

    Ok(copies)
}
