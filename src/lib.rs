//! # volparse
//!
//! A read-only metadata extractor for multi-volume archive sets.
//!
//! `volparse` parses three binary container formats (RAR 4.x, RAR 5.x, and
//! 7z) plus the PAR2 side channel used to recover obfuscated volume
//! filenames. Its single product is, for each archive (possibly spread
//! across multiple volume files), a list of file entries with exact
//! byte-level coordinates: which volume a file starts in, at what absolute
//! offset in the concatenated volume stream its data begins, how many bytes
//! belong to it in each volume, and what compression method (if any) was
//! applied. It never decompresses, decrypts, or mutates archive content.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use volparse::{list_files, ConcatReader, VolumeDescriptor, Result};
//!
//! fn main() -> Result<()> {
//!     let vol1 = std::fs::read("archive.part1.rar")?;
//!     let vol2 = std::fs::read("archive.part2.rar")?;
//!
//!     let descriptors = vec![
//!         VolumeDescriptor::new("archive.part1.rar", vol1.len() as u64),
//!         VolumeDescriptor::new("archive.part2.rar", vol2.len() as u64),
//!     ];
//!     let mut reader = ConcatReader::new(vec![vol1, vol2]);
//!
//!     for entry in list_files(&mut reader, &descriptors, None)? {
//!         println!("{}: {} bytes", entry.path(), entry.size());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Working from disk
//!
//! ```rust,no_run
//! use volparse::{list_files, MultiVolumeReader, Result};
//!
//! fn main() -> Result<()> {
//!     // Sibling volumes are discovered by naming convention
//!     let mut reader = MultiVolumeReader::open_set("archive.part1.rar")?;
//!     let descriptors = reader.descriptors()?;
//!     let entries = list_files(&mut reader, &descriptors, None)?;
//!     println!("{} entries", entries.len());
//!     Ok(())
//! }
//! ```
//!
//! ## PAR2 filename recovery
//!
//! Obfuscated volume sets (randomized filenames) are resolved through the
//! accompanying PAR2 index: every descriptor whose first-16-KiB MD5 matches
//! a PAR2 file description takes that description's filename before format
//! detection runs. Pass the PAR2 bytes as the third argument of
//! [`list_files`], or call [`resolve_volume_names`] directly.
//!
//! ## Scope
//!
//! Store/Copy coordinates are exact; compressed entries still carry their
//! method and per-volume packed sizes, but concatenating their parts yields
//! packed (not original) bytes. Encrypted archives, 7z compressed headers,
//! and non-Copy 7z codecs are rejected with typed errors. File-content
//! CRC32s are surfaced on entries and never verified.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatch;
mod entry;
pub mod error;
pub mod format;
pub mod generate;
mod source;
pub mod volume;

pub use dispatch::{
    file_has_known_extension, list_files, list_files_7z, list_files_rar, resolve_volume_names,
    VolumeDescriptor,
};
pub use entry::{FileEntry, RarEntry, SevenZipEntry, SplitPart};
pub use error::{Error, Result};
pub use format::detect::{detect_type, ArchiveType, TypeInfo};
pub use format::par2::{parse as parse_par2, Par2FileDescription, Par2Info};
pub use format::rar4::continuation_header_size;
pub use source::{ConcatReader, MultiVolumeReader};
