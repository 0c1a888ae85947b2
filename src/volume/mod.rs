//! Volume filename conventions: classification, ordering, and discovery.
//!
//! Recognized multi-volume naming schemes:
//!
//! - new-style RAR: `name.part1.rar`, `name.part02.rar`, ...
//! - old-style RAR: `name.rar` followed by `name.r00` .. `name.r99`,
//!   then `name.s00` .. and so on through the alphabet;
//! - split 7z: `name.7z.001`, `name.7z.002`, ...
//!
//! Ordering follows the numeric suffix; old-style extensions sort by
//! `(letter - 'r') * 1000 + number` with the `.rar` base file first.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// How a volume filename encodes its place in the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeNaming {
    /// `name.partN.rar`; number width is preserved for sibling probing.
    NewStyleRar {
        /// Path without the `.partN.rar` suffix.
        base: String,
        /// Digits in the part number (for zero padding).
        width: usize,
        /// Part number, 1-based.
        number: u32,
    },
    /// `name.rar`, the first volume of an old-style set (or a single file).
    OldStyleFirst {
        /// Path without the `.rar` suffix.
        base: String,
    },
    /// `name.rNN` / `name.sNN` / ... continuation of an old-style set.
    OldStyleNumbered {
        /// Path without the extension.
        base: String,
        /// Extension letter (`r`, `s`, ...).
        letter: char,
        /// Two-digit number.
        number: u32,
    },
    /// `name.7z.NNN` split volume.
    SevenZipPart {
        /// Path including the `.7z` suffix.
        base: String,
        /// Digits in the volume number.
        width: usize,
        /// Volume number, 1-based.
        number: u32,
    },
    /// `name.7z`, a single-file archive.
    SevenZipSingle {
        /// The full path.
        base: String,
    },
}

impl VolumeNaming {
    /// Classifies a filename, returning `None` for unrecognized names.
    pub fn classify(filename: &str) -> Option<Self> {
        // ASCII lowering preserves byte length, so indices found in
        // `lower` are valid char boundaries in `filename` too.
        let lower: String = filename
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let bytes = filename.as_bytes();

        // name.partN.rar / name.rar
        if lower.ends_with(".rar") {
            let stem = &filename[..filename.len() - 4];
            let stem_lower = &lower[..lower.len() - 4];
            if let Some(idx) = stem_lower.rfind(".part") {
                let digits = &stem[idx + 5..];
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(number) = digits.parse::<u32>() {
                        return Some(VolumeNaming::NewStyleRar {
                            base: filename[..idx].to_string(),
                            width: digits.len(),
                            number,
                        });
                    }
                }
            }
            return Some(VolumeNaming::OldStyleFirst {
                base: stem.to_string(),
            });
        }

        // name.rNN .. name.zNN
        if bytes.len() >= 4 && bytes[bytes.len() - 4] == b'.' {
            let letter = bytes[bytes.len() - 3].to_ascii_lowercase();
            let digits = &bytes[bytes.len() - 2..];
            if (b'r'..=b'z').contains(&letter) && digits.iter().all(|b| b.is_ascii_digit()) {
                let number = (digits[0] - b'0') as u32 * 10 + (digits[1] - b'0') as u32;
                return Some(VolumeNaming::OldStyleNumbered {
                    base: filename[..filename.len() - 4].to_string(),
                    letter: letter as char,
                    number,
                });
            }
        }

        // name.7z.NNN
        if let Some(idx) = lower.rfind(".7z.") {
            let digits = &filename[idx + 4..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(number) = digits.parse::<u32>() {
                    return Some(VolumeNaming::SevenZipPart {
                        base: filename[..idx + 3].to_string(),
                        width: digits.len(),
                        number,
                    });
                }
            }
        }

        if lower.ends_with(".7z") {
            return Some(VolumeNaming::SevenZipSingle {
                base: filename.to_string(),
            });
        }

        None
    }

    /// Ordering key within a volume set.
    ///
    /// Old-style RAR uses `(letter - 'r') * 1000 + number` with the `.rar`
    /// base before every numbered volume; the numbered schemes use their
    /// number directly.
    pub fn sort_key(&self) -> i64 {
        match self {
            VolumeNaming::NewStyleRar { number, .. } => *number as i64,
            VolumeNaming::OldStyleFirst { .. } => -1,
            VolumeNaming::OldStyleNumbered { letter, number, .. } => {
                (*letter as i64 - 'r' as i64) * 1000 + *number as i64
            }
            VolumeNaming::SevenZipPart { number, .. } => *number as i64,
            VolumeNaming::SevenZipSingle { .. } => 0,
        }
    }

    /// The filename of the volume `steps` places after this one, or `None`
    /// for single-file schemes.
    pub fn successor(&self, steps: u32) -> Option<String> {
        match self {
            VolumeNaming::NewStyleRar {
                base,
                width,
                number,
            } => Some(format!(
                "{}.part{:0width$}.rar",
                base,
                number + steps,
                width = width
            )),
            VolumeNaming::OldStyleFirst { base } => {
                // .rar -> .r00 for the first step, counting onward from there
                let n = steps.checked_sub(1)?;
                let letter = (b'r' + (n / 100) as u8) as char;
                Some(format!("{}.{}{:02}", base, letter, n % 100))
            }
            VolumeNaming::OldStyleNumbered {
                base,
                letter,
                number,
            } => {
                let n = *number + steps;
                let letter = (*letter as u8 + (n / 100) as u8) as char;
                Some(format!("{}.{}{:02}", base, letter, n % 100))
            }
            VolumeNaming::SevenZipPart {
                base,
                width,
                number,
            } => Some(format!(
                "{}.{:0width$}",
                base,
                number + steps,
                width = width
            )),
            VolumeNaming::SevenZipSingle { .. } => None,
        }
    }
}

/// Sorts volume filenames into set order.
///
/// Unrecognized names keep their relative order after recognized ones.
pub fn sort_volume_names(names: &mut [String]) {
    names.sort_by_key(|name| match VolumeNaming::classify(name) {
        Some(naming) => (0i64, naming.sort_key()),
        None => (1, 0),
    });
}

/// Discovers the full volume set around a first volume by probing sibling
/// filenames on disk.
///
/// Returns just the input path when the name is a single-file scheme or is
/// not recognized at all (an obfuscated name resolved later via PAR2).
pub fn discover_set(first_volume: &Path) -> Result<Vec<PathBuf>> {
    if !first_volume.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", first_volume.display()),
        )));
    }

    let dir = first_volume.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = first_volume
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let naming = match VolumeNaming::classify(&name) {
        Some(naming) => naming,
        None => return Ok(vec![first_volume.to_path_buf()]),
    };

    let mut paths = vec![first_volume.to_path_buf()];
    let mut steps = 1u32;
    while let Some(next) = naming.successor(steps) {
        let candidate = dir.join(&next);
        if !candidate.exists() {
            break;
        }
        paths.push(candidate);
        steps += 1;
    }

    Ok(paths)
}
