//! RAR 4.x block-chain parser.
//!
//! Walks the fixed-layout block chain of a RAR 4.x archive across the
//! concatenated volume stream, emitting one [`RarEntry`] per logical file.
//! File headers repeat in every volume a file occupies; occurrences after
//! the first accumulate [`SplitPart`]s on the canonical entry.
//!
//! When per-volume sizes are known, store-mode split files trigger
//! split-position inference: the intermediate volumes are never read, their
//! parts are computed from the first volume's observed layout, and parsing
//! resumes after the last inferred part (later files in that volume are
//! still found).

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::entry::{RarEntry, SplitPart};
use crate::error::{Error, Result};
use crate::format::reader::{
    read_full, read_u16_le, read_u32_le, read_u8, resync_volume_signature,
};
use crate::format::{rar4_block, RAR4_SIGNATURE};

/// Returns the preamble size of a non-first RAR4 volume.
///
/// Every continuation volume starts with the 7-byte signature, the 13-byte
/// archive header, and a repeat of the split file's header block; that block
/// is `32` bytes of fixed fields plus the filename, plus 8 bytes when the
/// 64-bit size fields are present. Split-position inference skips exactly
/// this many bytes per volume.
pub fn continuation_header_size(name_len: u64, large_file: bool) -> u64 {
    52 + name_len + if large_file { 8 } else { 0 }
}

/// A decoded RAR4 file-header block.
#[derive(Debug)]
struct FileBlock {
    flags: u16,
    block_size: u64,
    pack_size: u64,
    unpack_size: u64,
    file_crc: u32,
    method: u8,
    name: String,
}

impl FileBlock {
    fn split_before(&self) -> bool {
        self.flags & rar4_block::FILE_SPLIT_BEFORE != 0
    }

    fn split_after(&self) -> bool {
        self.flags & rar4_block::FILE_SPLIT_AFTER != 0
    }

    fn is_directory(&self) -> bool {
        self.flags & rar4_block::FILE_DIRECTORY_MASK == rar4_block::FILE_DIRECTORY_MASK
    }

    fn compression_method(&self) -> i32 {
        self.method as i32 - rar4_block::METHOD_STORE as i32
    }
}

/// Parses the file-header body that follows the 7-byte block frame.
fn parse_file_block(flags: u16, block_size: u64, body: &[u8], offset: u64) -> Result<FileBlock> {
    let mut c = Cursor::new(body);
    let map_err = |e| Error::from_read(e, offset, "file header body");

    let mut pack_size = read_u32_le(&mut c).map_err(map_err)? as u64;
    let mut unpack_size = read_u32_le(&mut c).map_err(map_err)? as u64;
    let _host_os = read_u8(&mut c).map_err(map_err)?;
    let file_crc = read_u32_le(&mut c).map_err(map_err)?;
    let _ftime = read_u32_le(&mut c).map_err(map_err)?;
    let _unpack_version = read_u8(&mut c).map_err(map_err)?;
    let method = read_u8(&mut c).map_err(map_err)?;
    let name_length = read_u16_le(&mut c).map_err(map_err)? as usize;
    let _attributes = read_u32_le(&mut c).map_err(map_err)?;

    if flags & rar4_block::FILE_LARGE != 0 {
        let high_pack = read_u32_le(&mut c).map_err(map_err)? as u64;
        let high_unpack = read_u32_le(&mut c).map_err(map_err)? as u64;
        pack_size |= high_pack << 32;
        unpack_size |= high_unpack << 32;
    }

    let name_start = c.position() as usize;
    let name_end = name_start
        .checked_add(name_length)
        .filter(|&end| end <= body.len())
        .ok_or_else(|| Error::malformed(offset, "file name exceeds header block"))?;
    let name = String::from_utf8_lossy(&body[name_start..name_end]).into_owned();

    Ok(FileBlock {
        flags,
        block_size,
        pack_size,
        unpack_size,
        file_crc,
        method,
        name,
    })
}

/// Stateful RAR4 parse over one concatenated volume stream.
struct Parser<'a, R> {
    reader: &'a mut R,
    /// Cumulative start offset of each volume, when sizes are known.
    volume_sizes: Option<&'a [u64]>,
    cumulative: Vec<u64>,
    pos: u64,
    volume_index: u32,
    /// Set after an end-of-archive block; the next bytes are either padding,
    /// the next volume's signature, or the true end of the set.
    just_ended: bool,
    entries: Vec<RarEntry>,
    by_path: HashMap<String, usize>,
}

impl<'a, R: Read + Seek> Parser<'a, R> {
    fn new(reader: &'a mut R, volume_sizes: Option<&'a [u64]>) -> Self {
        let cumulative = match volume_sizes {
            Some(sizes) => {
                let mut acc = 0u64;
                sizes
                    .iter()
                    .map(|&s| {
                        let start = acc;
                        acc += s;
                        start
                    })
                    .collect()
            }
            None => Vec::new(),
        };
        Self {
            reader,
            volume_sizes,
            cumulative,
            pos: 0,
            volume_index: 0,
            just_ended: false,
            entries: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Vec<RarEntry>> {
        let mut sig = [0u8; 7];
        self.reader
            .read_exact(&mut sig)
            .map_err(|e| Error::from_read(e, 0, "RAR4 signature"))?;
        if &sig != RAR4_SIGNATURE {
            return Err(Error::InvalidSignature { format: "RAR4" });
        }
        self.pos = 7;

        loop {
            if self.just_ended {
                match resync_volume_signature(self.reader, RAR4_SIGNATURE)? {
                    Some(consumed) => {
                        self.pos += consumed;
                        self.volume_index += 1;
                        self.just_ended = false;
                    }
                    None => break,
                }
                continue;
            }

            let mut frame = [0u8; 7];
            let got = read_full(self.reader, &mut frame)?;
            if got == 0 {
                break;
            }
            if got < 7 {
                return Err(Error::truncated(self.pos, "block frame"));
            }

            let block_start = self.pos;
            let block_type = frame[2];
            let flags = u16::from_le_bytes([frame[3], frame[4]]);
            let size = u16::from_le_bytes([frame[5], frame[6]]) as u64;
            if size < rar4_block::FRAME_SIZE {
                return Err(Error::malformed(
                    block_start,
                    format!("block size {} smaller than frame", size),
                ));
            }
            let header_end = block_start + size;

            match block_type {
                rar4_block::FILE => {
                    let body_len = (size - rar4_block::FRAME_SIZE) as usize;
                    let mut body = vec![0u8; body_len];
                    self.reader
                        .read_exact(&mut body)
                        .map_err(|e| Error::from_read(e, block_start, "file header body"))?;
                    let block = parse_file_block(flags, size, &body, block_start)?;
                    self.pos = header_end;
                    self.handle_file_block(block, block_start, header_end)?;
                }
                rar4_block::END => {
                    self.just_ended = true;
                    self.seek_to(header_end)?;
                }
                _ => {
                    self.seek_to(header_end)?;
                }
            }
        }

        Ok(self.entries)
    }

    fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn handle_file_block(
        &mut self,
        block: FileBlock,
        block_start: u64,
        header_end: u64,
    ) -> Result<()> {
        let data_end = header_end
            .checked_add(block.pack_size)
            .ok_or_else(|| Error::malformed(block_start, "data size overflows stream offset"))?;

        if let Some(&idx) = self.by_path.get(&block.name) {
            // Repeated header in a continuation volume: accumulate the part.
            self.entries[idx].split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_start: header_end,
                data_size: block.pack_size,
            });
            return self.seek_to(data_end);
        }

        let is_split = block.split_before() || block.split_after();
        let mut entry = RarEntry {
            path: block.name.clone(),
            uncompressed_size: block.unpack_size,
            compressed_size: if block.is_directory() {
                0
            } else {
                block.pack_size
            },
            header_position: block_start + rar4_block::FRAME_SIZE,
            data_position: header_end,
            is_directory: block.is_directory(),
            volume_index: self.volume_index,
            compression_method: block.compression_method(),
            split_parts: Vec::new(),
            crc32: Some(block.file_crc),
        };
        if is_split {
            entry.split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_start: header_end,
                data_size: block.pack_size,
            });
        }

        let inferred = if block.split_after()
            && block.compression_method() == 0
            && self.volume_sizes.is_some()
        {
            self.infer_remaining_parts(&mut entry, &block, header_end)?
        } else {
            false
        };

        let resume = match entry.split_parts.last().copied() {
            // Jump past every inferred part; the last volume may hold more
            // files, so parsing continues there rather than stopping.
            Some(last) if inferred => {
                self.volume_index = last.volume_index;
                self.just_ended = false;
                last.data_start + last.data_size
            }
            _ => data_end,
        };

        self.by_path.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        self.seek_to(resume)
    }

    /// Computes the split parts living in volumes after the current one
    /// without reading them. Returns `false` when the layout does not
    /// support inference (sizes unknown or inconsistent).
    fn infer_remaining_parts(
        &mut self,
        entry: &mut RarEntry,
        block: &FileBlock,
        first_data_start: u64,
    ) -> Result<bool> {
        let sizes = match self.volume_sizes {
            Some(sizes) => sizes,
            None => return Ok(false),
        };
        let v0 = self.volume_index as usize;
        if v0 >= sizes.len() {
            return Ok(false);
        }

        // The continuation preamble repeats the signature, the archive
        // header, and this exact file header in every later volume.
        let preamble = RAR4_SIGNATURE.len() as u64
            + rar4_block::ARCHIVE_HEADER_SIZE
            + block.block_size;

        // Trailing bytes of each volume (end block plus padding), derived
        // from the first volume's observed layout rather than assumed.
        let used = first_data_start
            .checked_sub(self.cumulative[v0])
            .and_then(|in_volume| in_volume.checked_add(block.pack_size))
            .and_then(|used| sizes[v0].checked_sub(used));
        let trailer = match used {
            Some(t) => t,
            None => {
                return Err(Error::malformed(
                    first_data_start,
                    "split data exceeds first volume",
                ))
            }
        };

        let mut remaining = block
            .unpack_size
            .checked_sub(block.pack_size)
            .ok_or_else(|| {
                Error::malformed(first_data_start, "packed size exceeds unpacked size")
            })?;

        for v in (v0 + 1)..sizes.len() {
            if remaining == 0 {
                break;
            }
            let data_start = self.cumulative[v] + preamble;
            let available = sizes[v].saturating_sub(preamble + trailer);
            let part_size = remaining.min(available);
            if part_size > 0 {
                entry.split_parts.push(SplitPart {
                    volume_index: v as u32,
                    data_start,
                    data_size: part_size,
                });
                remaining -= part_size;
            }
        }

        Ok(true)
    }
}

/// Parses a RAR 4.x archive from a concatenated volume stream.
///
/// `volume_sizes`, when provided, enables split-position inference for
/// store-mode files: intermediate volumes are skipped entirely and their
/// parts computed from the first volume's layout. The returned entries are
/// identical with and without it.
///
/// The reader must be positioned at the start of the first volume.
pub fn parse<R: Read + Seek>(
    reader: &mut R,
    volume_sizes: Option<&[u64]>,
) -> Result<Vec<RarEntry>> {
    Parser::new(reader, volume_sizes).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::rar4::build_volumes;
    use crate::generate::SourceFile;
    use std::io::Cursor;

    fn concat(volumes: &[Vec<u8>]) -> Vec<u8> {
        volumes.concat()
    }

    fn sizes(volumes: &[Vec<u8>]) -> Vec<u64> {
        volumes.iter().map(|v| v.len() as u64).collect()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_continuation_header_size_formula() {
        assert_eq!(continuation_header_size(7, false), 59);
        assert_eq!(continuation_header_size(11, false), 63);
        assert_eq!(continuation_header_size(7, true), 67);
    }

    #[test]
    fn test_single_volume_single_file() {
        let data = pattern(100);
        let volumes = build_volumes(&[SourceFile::new("file.bin", data.clone())]);
        assert_eq!(volumes.len(), 1);

        let mut cursor = Cursor::new(concat(&volumes));
        let entries = parse(&mut cursor, None).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.path, "file.bin");
        assert_eq!(entry.uncompressed_size, 100);
        assert_eq!(entry.compressed_size, 100);
        assert_eq!(entry.compression_method, 0);
        assert!(!entry.is_split());
        // Preamble: signature (7) + archive header (13) + file block
        let block_size = 7 + 25 + "file.bin".len() as u64;
        assert_eq!(entry.header_position, 7 + 13 + 7);
        assert_eq!(entry.data_position, 7 + 13 + block_size);

        let stream = concat(&volumes);
        let start = entry.data_position as usize;
        assert_eq!(&stream[start..start + 100], &data[..]);
    }

    #[test]
    fn test_invalid_signature() {
        let mut cursor = Cursor::new(vec![0u8; 32]);
        let err = parse(&mut cursor, None).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "RAR4" }));
    }

    #[test]
    fn test_truncated_frame() {
        let volumes = build_volumes(&[SourceFile::new("a.bin", pattern(10))]);
        let mut stream = concat(&volumes);
        // Chop into the middle of the first file header frame
        stream.truncate(7 + 13 + 3);
        let err = parse(&mut Cursor::new(stream), None).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput { .. }));
    }

    #[test]
    fn test_split_file_walked_without_sizes() {
        let data = pattern(200);
        let volumes = build_volumes(&[SourceFile::split(
            "bigfile",
            data.clone(),
            vec![80, 80, 40],
        )]);
        assert_eq!(volumes.len(), 3);

        let stream = concat(&volumes);
        let entries = parse(&mut Cursor::new(stream.clone()), None).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.split_parts.len(), 3);
        assert_eq!(entry.uncompressed_size, 200);
        assert_eq!(entry.volume_index, 0);
        assert_eq!(entry.volume_index, entry.split_parts[0].volume_index);

        let total: u64 = entry.split_parts.iter().map(|p| p.data_size).sum();
        assert_eq!(total, 200);

        let mut recovered = Vec::new();
        for part in &entry.split_parts {
            let start = part.data_start as usize;
            recovered.extend_from_slice(&stream[start..start + part.data_size as usize]);
        }
        assert_eq!(recovered, data);
    }

    #[test]
    fn test_split_inference_matches_walked_parse() {
        let data = pattern(200);
        let files = [SourceFile::split("bigfile", data, vec![80, 80, 40])];
        let volumes = build_volumes(&files);
        let stream = concat(&volumes);

        let walked = parse(&mut Cursor::new(stream.clone()), None).unwrap();
        let inferred = parse(&mut Cursor::new(stream), Some(&sizes(&volumes))).unwrap();
        assert_eq!(walked, inferred);
    }

    #[test]
    fn test_file_after_inferred_split() {
        // Regression: a dominant split file must not end the parse early.
        let big = pattern(200);
        let small = pattern(20);
        let files = [
            SourceFile::split("bigfile", big, vec![80, 80, 40]),
            SourceFile::new("small.txt", small.clone()),
        ];
        let volumes = build_volumes(&files);
        let stream = concat(&volumes);

        let entries = parse(&mut Cursor::new(stream.clone()), Some(&sizes(&volumes))).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "bigfile");
        assert_eq!(entries[0].split_parts.len(), 3);
        assert_eq!(entries[1].path, "small.txt");
        assert_eq!(entries[1].volume_index, 2);

        let start = entries[1].data_position as usize;
        assert_eq!(&stream[start..start + 20], &small[..]);
    }

    #[test]
    fn test_directory_entry() {
        let files = [
            SourceFile::directory("subdir"),
            SourceFile::new("subdir/file.bin", pattern(16)),
        ];
        let volumes = build_volumes(&files);
        let entries = parse(&mut Cursor::new(concat(&volumes)), None).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].compressed_size, 0);
        assert!(!entries[1].is_directory);
    }

    #[test]
    fn test_crc_surfaced() {
        let data = pattern(64);
        let crc = crc32fast::hash(&data);
        let volumes = build_volumes(&[SourceFile::new("x.bin", data)]);
        let entries = parse(&mut Cursor::new(concat(&volumes)), None).unwrap();
        assert_eq!(entries[0].crc32, Some(crc));
    }

    #[test]
    fn test_monotonic_split_offsets() {
        let files = [
            SourceFile::split("a.bin", pattern(300), vec![120, 120, 60]),
            SourceFile::new("b.bin", pattern(30)),
        ];
        let volumes = build_volumes(&files);
        let entries = parse(&mut Cursor::new(concat(&volumes)), None).unwrap();
        for entry in &entries {
            for pair in entry.split_parts.windows(2) {
                assert!(pair[0].data_start + pair[0].data_size <= pair[1].data_start);
                assert!(pair[0].volume_index <= pair[1].volume_index);
            }
        }
    }
}
