//! Format dispatch over a concatenated volume stream.
//!
//! The dispatcher ties the pieces together: it optionally rewrites
//! obfuscated volume filenames using PAR2 metadata, decides the archive
//! format (extension first, magic bytes second, a stream read last), and
//! invokes the matching parser with the per-volume size information the RAR
//! parsers use for split inference.

use std::io::{Read, Seek, SeekFrom};
use std::sync::OnceLock;

use regex::Regex;

use crate::entry::{FileEntry, RarEntry, SevenZipEntry};
use crate::error::{Error, Result};
use crate::format::detect::{detect_type, ArchiveType};
use crate::format::{par2, rar4, rar5, sevenzip, RAR4_SIGNATURE, RAR5_SIGNATURE};

/// One volume of an archive set as seen by the dispatcher.
///
/// Equality considers all three fields, byte-wise on `first_16kb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Filename of the volume (no directory components required).
    pub filename: String,
    /// Size of the volume in bytes.
    pub size: u64,
    /// The first 16 KiB of the volume (less if the volume is shorter),
    /// used for magic-byte detection and PAR2 hash matching.
    pub first_16kb: Option<Vec<u8>>,
}

impl VolumeDescriptor {
    /// Creates a descriptor without preview bytes.
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            first_16kb: None,
        }
    }

    /// Creates a descriptor carrying the volume's first bytes.
    pub fn with_preview(filename: impl Into<String>, size: u64, first_16kb: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            size,
            first_16kb: Some(first_16kb),
        }
    }
}

/// Case-insensitive pattern for extensions the dispatcher recognizes
/// without PAR2 help: `.partNN.rar`, `.rar`, `.rNN`, `.sNN`, `.7z`,
/// `.7z.NNN`.
///
/// Note the asymmetry: `.7z.001` is known, but a bare `.001` is not; an
/// obfuscated `.001` volume needs PAR2 to resolve.
fn known_extension_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(part\d+\.rar|rar|r\d{2}|s\d{2}|7z|7z\.\d+)$")
            .unwrap_or_else(|e| panic!("invalid known-extension pattern: {e}"))
    })
}

/// Returns `true` if the filename carries a recognized archive extension.
pub fn file_has_known_extension(filename: &str) -> bool {
    known_extension_pattern().is_match(filename)
}

/// Rewrites obfuscated descriptor filenames using PAR2 metadata.
///
/// Every descriptor whose `md5(first_16kb)` matches a PAR2 file
/// description takes that description's filename; all other descriptors
/// are returned unchanged.
pub fn resolve_volume_names(
    volumes: &[VolumeDescriptor],
    par2_bytes: &[u8],
) -> Result<Vec<VolumeDescriptor>> {
    let info = par2::parse(par2_bytes)?;

    let resolved = volumes
        .iter()
        .map(|vol| {
            let mut vol = vol.clone();
            if let Some(ref preview) = vol.first_16kb {
                let digest = md5::compute(preview);
                if let Some(desc) = info.find_by_hash_16k(&digest.0) {
                    vol.filename = desc.filename.clone();
                }
            }
            vol
        })
        .collect();

    Ok(resolved)
}

/// Classification used before the exact parser is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Rar,
    SevenZip,
}

/// Classifies a filename by extension alone.
fn family_from_extension(filename: &str) -> Option<Family> {
    let captures = known_extension_pattern().captures(filename)?;
    let ext = captures.get(1).map_or("", |m| m.as_str()).to_lowercase();
    if ext == "7z" || ext.starts_with("7z.") {
        Some(Family::SevenZip)
    } else {
        Some(Family::Rar)
    }
}

/// Lists the files of an archive set, dispatching to the right parser.
///
/// `reader` must present the concatenation of the ordered volumes,
/// positioned at 0. `volumes` describes those volumes in the same order;
/// their sizes feed the RAR parsers' split inference. When `par2_bytes` is
/// given and at least one descriptor has no known archive extension, PAR2
/// name resolution runs first (see [`resolve_volume_names`]).
///
/// # Errors
///
/// Returns [`Error::TypeUnknown`] when neither extension nor magic bytes
/// identify the format, plus whatever the selected parser raises.
pub fn list_files<R: Read + Seek>(
    reader: &mut R,
    volumes: &[VolumeDescriptor],
    par2_bytes: Option<&[u8]>,
) -> Result<Vec<FileEntry>> {
    let first = volumes.first().ok_or_else(|| Error::TypeUnknown {
        filename: String::from("<no volumes>"),
    })?;

    let resolved;
    let volumes = match par2_bytes {
        Some(bytes) if volumes.iter().any(|v| !file_has_known_extension(&v.filename)) => {
            resolved = resolve_volume_names(volumes, bytes)?;
            &resolved[..]
        }
        _ => volumes,
    };
    let first_name = volumes
        .first()
        .map(|v| v.filename.clone())
        .unwrap_or_else(|| first.filename.clone());

    // Extension first, then preview magic, then the stream itself
    let family = match family_from_extension(&first_name) {
        Some(family) => Some(family),
        None => {
            let preview_type = volumes
                .first()
                .and_then(|v| v.first_16kb.as_deref())
                .map(|bytes| detect_type(bytes).archive_type);
            let archive_type = match preview_type {
                Some(t) if t != ArchiveType::Unknown => t,
                _ => {
                    let mut head = [0u8; 32];
                    let got = crate::format::reader::read_full(reader, &mut head)?;
                    reader.seek(SeekFrom::Start(0))?;
                    detect_type(&head[..got]).archive_type
                }
            };
            match archive_type {
                ArchiveType::Rar4 | ArchiveType::Rar5 => Some(Family::Rar),
                ArchiveType::SevenZip => Some(Family::SevenZip),
                ArchiveType::Unknown => None,
            }
        }
    };

    let sizes: Vec<u64> = volumes.iter().map(|v| v.size).collect();
    let total: u64 = sizes.iter().sum();

    match family {
        Some(Family::Rar) => {
            let entries = list_files_rar(reader, Some(total), Some(&sizes))?;
            Ok(entries.into_iter().map(FileEntry::Rar).collect())
        }
        Some(Family::SevenZip) => {
            let entries = list_files_7z(reader)?;
            Ok(entries.into_iter().map(FileEntry::SevenZip).collect())
        }
        None => Err(Error::TypeUnknown {
            filename: first_name,
        }),
    }
}

/// Lists the files of a RAR archive set (either generation).
///
/// The first bytes decide between the RAR4 and RAR5 parsers. `total_size`,
/// when given alongside `volume_sizes`, is validated against their sum;
/// `volume_sizes` enables store-mode split inference.
pub fn list_files_rar<R: Read + Seek>(
    reader: &mut R,
    total_size: Option<u64>,
    volume_sizes: Option<&[u64]>,
) -> Result<Vec<RarEntry>> {
    if let (Some(total), Some(sizes)) = (total_size, volume_sizes) {
        let sum: u64 = sizes.iter().sum();
        if sum != total {
            return Err(Error::malformed(
                0,
                format!("volume sizes sum to {} but total size is {}", sum, total),
            ));
        }
    }

    let mut head = [0u8; 8];
    let got = crate::format::reader::read_full(reader, &mut head)?;
    reader.seek(SeekFrom::Start(0))?;

    if head[..got].starts_with(RAR5_SIGNATURE) {
        rar5::parse(reader, volume_sizes)
    } else if head[..got.min(7)].starts_with(RAR4_SIGNATURE) {
        rar4::parse(reader, volume_sizes)
    } else {
        Err(Error::InvalidSignature { format: "RAR" })
    }
}

/// Lists the files of a 7z archive.
///
/// Thin wrapper over [`sevenzip::parse`]; requires a truly random-access
/// source because the metadata block lives at the end of the stream.
pub fn list_files_7z<R: Read + Seek>(reader: &mut R) -> Result<Vec<SevenZipEntry>> {
    sevenzip::parse(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{rar4, rar5, sevenzip, SourceFile};
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    fn descriptors(volumes: &[Vec<u8>], names: &[&str]) -> Vec<VolumeDescriptor> {
        volumes
            .iter()
            .zip(names.iter())
            .map(|(vol, name)| {
                let preview = vol[..vol.len().min(16384)].to_vec();
                VolumeDescriptor::with_preview(*name, vol.len() as u64, preview)
            })
            .collect()
    }

    #[test]
    fn test_known_extensions() {
        assert!(file_has_known_extension("movie.rar"));
        assert!(file_has_known_extension("movie.part01.rar"));
        assert!(file_has_known_extension("MOVIE.PART2.RAR"));
        assert!(file_has_known_extension("movie.r00"));
        assert!(file_has_known_extension("movie.s99"));
        assert!(file_has_known_extension("backup.7z"));
        assert!(file_has_known_extension("backup.7z.001"));

        assert!(!file_has_known_extension("backup.001"));
        assert!(!file_has_known_extension("movie.mkv"));
        assert!(!file_has_known_extension("movie.r1"));
        assert!(!file_has_known_extension("abcdef0123456789"));
    }

    #[test]
    fn test_family_from_extension() {
        assert_eq!(family_from_extension("a.rar"), Some(Family::Rar));
        assert_eq!(family_from_extension("a.part03.rar"), Some(Family::Rar));
        assert_eq!(family_from_extension("a.r42"), Some(Family::Rar));
        assert_eq!(family_from_extension("a.7z"), Some(Family::SevenZip));
        assert_eq!(family_from_extension("a.7z.002"), Some(Family::SevenZip));
        assert_eq!(family_from_extension("a.bin"), None);
    }

    #[test]
    fn test_dispatch_rar4_by_extension() {
        let volumes = rar4::build_volumes(&[SourceFile::new("file.bin", pattern(50))]);
        let descs = descriptors(&volumes, &["archive.rar"]);
        let entries = list_files(&mut Cursor::new(volumes.concat()), &descs, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], FileEntry::Rar(_)));
    }

    #[test]
    fn test_dispatch_rar5_by_magic_preview() {
        // Unknown extension, magic carried in the preview bytes
        let volumes = rar5::build_volumes(&[SourceFile::new("file.bin", pattern(50))]);
        let descs = descriptors(&volumes, &["obfuscated.dat"]);
        let entries = list_files(&mut Cursor::new(volumes.concat()), &descs, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], FileEntry::Rar(_)));
    }

    #[test]
    fn test_dispatch_7z_by_stream_read() {
        // No extension, no preview: the dispatcher reads the stream head
        let archive = sevenzip::build(&[SourceFile::new("file.bin", pattern(50))]);
        let descs = vec![VolumeDescriptor::new("obfuscated", archive.len() as u64)];
        let entries = list_files(&mut Cursor::new(archive), &descs, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], FileEntry::SevenZip(_)));
    }

    #[test]
    fn test_dispatch_unknown_type() {
        let descs = vec![VolumeDescriptor::new("garbage.bin", 64)];
        let err = list_files(&mut Cursor::new(vec![0u8; 64]), &descs, None).unwrap_err();
        assert!(matches!(err, Error::TypeUnknown { .. }));
    }

    #[test]
    fn test_dispatch_no_volumes() {
        let err = list_files(&mut Cursor::new(Vec::new()), &[], None).unwrap_err();
        assert!(matches!(err, Error::TypeUnknown { .. }));
    }

    #[test]
    fn test_list_files_rar_size_mismatch() {
        let volumes = rar4::build_volumes(&[SourceFile::new("a", pattern(10))]);
        let err = list_files_rar(
            &mut Cursor::new(volumes.concat()),
            Some(9999),
            Some(&[1, 2]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_list_files_rar_sniffs_generation() {
        let v4 = rar4::build_volumes(&[SourceFile::new("a.bin", pattern(10))]);
        let v5 = rar5::build_volumes(&[SourceFile::new("a.bin", pattern(10))]);

        assert_eq!(
            list_files_rar(&mut Cursor::new(v4.concat()), None, None)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            list_files_rar(&mut Cursor::new(v5.concat()), None, None)
                .unwrap()
                .len(),
            1
        );

        let err = list_files_rar(&mut Cursor::new(vec![0u8; 16]), None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "RAR" }));
    }
}
