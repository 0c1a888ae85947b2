//! Archive type detection from magic bytes.
//!
//! Classifies the first few bytes of a volume as RAR4 / RAR5 / 7z and, for
//! RAR4, decides whether the volume is the first of its set by inspecting
//! the block that follows the signature.

use super::{rar4_block, RAR4_SIGNATURE, RAR5_SIGNATURE, SEVENZIP_SIGNATURE};

/// Detected archive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveType {
    /// RAR 4.x archive.
    Rar4,
    /// RAR 5.x archive.
    Rar5,
    /// 7z archive.
    SevenZip,
    /// Unknown or unrecognized format.
    Unknown,
}

impl ArchiveType {
    /// Returns a human-readable name for this type.
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveType::Rar4 => "RAR4",
            ArchiveType::Rar5 => "RAR5",
            ArchiveType::SevenZip => "7z",
            ArchiveType::Unknown => "unknown",
        }
    }

    /// Returns `true` for either RAR generation.
    pub fn is_rar(&self) -> bool {
        matches!(self, ArchiveType::Rar4 | ArchiveType::Rar5)
    }
}

impl std::fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detection result: the archive type plus whether the inspected volume is
/// the first of its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    /// Detected archive type.
    pub archive_type: ArchiveType,
    /// Whether this volume is the first volume of the set.
    ///
    /// Only meaningful for RAR4, where the block after the signature carries
    /// the information. RAR5 and 7z always report `true`; locating their
    /// continuation volumes is the parsers' job.
    pub is_first_volume: bool,
}

impl TypeInfo {
    fn unknown() -> Self {
        Self {
            archive_type: ArchiveType::Unknown,
            is_first_volume: true,
        }
    }
}

/// Detects the archive type from the first bytes of a volume.
///
/// Up to 32 bytes are inspected; shorter slices are fine and simply reduce
/// what can be recognized. RAR5 is tested before RAR4 because its signature
/// is the longer prefix of the two.
///
/// For RAR4 the block starting at offset 7 refines `is_first_volume`:
///
/// - archive header (`0x73`): first volume iff `flags & 0x0100 != 0`;
/// - file header (`0x74`): first volume iff `flags & 0x0001 == 0`
///   (no split-before);
/// - anything else: assumed first.
///
/// # Example
///
/// ```rust
/// use volparse::{detect_type, ArchiveType};
///
/// let info = detect_type(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04]);
/// assert_eq!(info.archive_type, ArchiveType::SevenZip);
/// assert!(info.is_first_volume);
/// ```
pub fn detect_type(bytes: &[u8]) -> TypeInfo {
    if bytes.starts_with(RAR5_SIGNATURE) {
        return TypeInfo {
            archive_type: ArchiveType::Rar5,
            is_first_volume: true,
        };
    }

    if bytes.starts_with(RAR4_SIGNATURE) {
        return TypeInfo {
            archive_type: ArchiveType::Rar4,
            is_first_volume: rar4_first_volume(&bytes[RAR4_SIGNATURE.len()..]),
        };
    }

    if bytes.starts_with(SEVENZIP_SIGNATURE) {
        return TypeInfo {
            archive_type: ArchiveType::SevenZip,
            is_first_volume: true,
        };
    }

    TypeInfo::unknown()
}

/// Inspects the RAR4 block after the signature to classify the volume.
fn rar4_first_volume(block: &[u8]) -> bool {
    // Need the frame through the flags field: crc16(2) | type(1) | flags(2)
    if block.len() < 5 {
        return true;
    }
    let block_type = block[2];
    let flags = u16::from_le_bytes([block[3], block[4]]);

    match block_type {
        rar4_block::ARCHIVE => flags & rar4_block::ARCHIVE_FIRST_VOLUME != 0,
        rar4_block::FILE => flags & rar4_block::FILE_SPLIT_BEFORE == 0,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rar4_volume(block_type: u8, flags: u16) -> Vec<u8> {
        let mut data = RAR4_SIGNATURE.to_vec();
        data.extend_from_slice(&[0x00, 0x00]); // crc16
        data.push(block_type);
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&13u16.to_le_bytes());
        data
    }

    #[test]
    fn test_detect_7z() {
        let info = detect_type(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04]);
        assert_eq!(info.archive_type, ArchiveType::SevenZip);
        assert!(info.is_first_volume);
    }

    #[test]
    fn test_detect_rar5_before_rar4() {
        // The RAR5 signature begins with the first six RAR4 bytes; the
        // longer prefix must win.
        let info = detect_type(RAR5_SIGNATURE);
        assert_eq!(info.archive_type, ArchiveType::Rar5);
        assert!(info.is_first_volume);
    }

    #[test]
    fn test_detect_rar4_archive_header_first_volume() {
        let data = rar4_volume(rar4_block::ARCHIVE, rar4_block::ARCHIVE_FIRST_VOLUME);
        let info = detect_type(&data);
        assert_eq!(info.archive_type, ArchiveType::Rar4);
        assert!(info.is_first_volume);
    }

    #[test]
    fn test_detect_rar4_archive_header_continuation() {
        let data = rar4_volume(rar4_block::ARCHIVE, rar4_block::ARCHIVE_VOLUME);
        let info = detect_type(&data);
        assert_eq!(info.archive_type, ArchiveType::Rar4);
        assert!(!info.is_first_volume);
    }

    #[test]
    fn test_detect_rar4_file_header_split_before() {
        let data = rar4_volume(rar4_block::FILE, rar4_block::FILE_SPLIT_BEFORE);
        let info = detect_type(&data);
        assert_eq!(info.archive_type, ArchiveType::Rar4);
        assert!(!info.is_first_volume);

        let data = rar4_volume(rar4_block::FILE, 0);
        assert!(detect_type(&data).is_first_volume);
    }

    #[test]
    fn test_detect_rar4_unknown_block_assumes_first() {
        let data = rar4_volume(0x7A, 0xFFFF);
        let info = detect_type(&data);
        assert_eq!(info.archive_type, ArchiveType::Rar4);
        assert!(info.is_first_volume);
    }

    #[test]
    fn test_detect_rar4_bare_signature() {
        let info = detect_type(RAR4_SIGNATURE);
        assert_eq!(info.archive_type, ArchiveType::Rar4);
        assert!(info.is_first_volume);
    }

    #[test]
    fn test_detect_unknown() {
        let info = detect_type(&[0x00; 32]);
        assert_eq!(info.archive_type, ArchiveType::Unknown);

        let info = detect_type(&[]);
        assert_eq!(info.archive_type, ArchiveType::Unknown);
    }

    #[test]
    fn test_archive_type_display() {
        assert_eq!(ArchiveType::Rar4.to_string(), "RAR4");
        assert_eq!(ArchiveType::SevenZip.to_string(), "7z");
        assert!(ArchiveType::Rar4.is_rar());
        assert!(ArchiveType::Rar5.is_rar());
        assert!(!ArchiveType::SevenZip.is_rar());
    }
}
