//! RAR 5.x header-chain parser.
//!
//! RAR5 frames every header as `crc32 | header_size(vint) | header area`,
//! where the header area opens with type and flag vints and optionally
//! declares a data area that follows the header. The parser walks that
//! chain across the concatenated volume stream, de-duplicating repeated
//! file headers and inferring split positions exactly like the RAR4 parser
//! (see [`super::rar4`]), with the RAR5 signature and flag constants.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::entry::{RarEntry, SplitPart};
use crate::error::{Error, Result};
use crate::format::reader::{read_full, read_u32_le, read_vint, resync_volume_signature};
use crate::format::{rar5_block, RAR5_SIGNATURE};

/// A decoded RAR5 block frame plus its file payload when type is `FILE`.
#[derive(Debug)]
struct Block {
    header_type: u64,
    /// Bytes of the fixed frame: the CRC32 plus the `header_size` vint.
    frame_len: u64,
    /// Total bytes of the block without its data area: CRC32, the
    /// `header_size` vint, and the header area itself.
    block_size: u64,
    /// Size of the data area following the header.
    data_size: u64,
    file: Option<FileHeader>,
}

/// Fields of a RAR5 file header body.
#[derive(Debug)]
struct FileHeader {
    file_flags: u64,
    unpacked_size: u64,
    crc32: Option<u32>,
    compression_info: u64,
    name: String,
}

impl FileHeader {
    fn is_directory(&self) -> bool {
        self.file_flags & rar5_block::FILE_DIRECTORY != 0
    }

    fn split_before(&self) -> bool {
        self.file_flags & rar5_block::FILE_SPLIT_BEFORE != 0
    }

    fn split_after(&self) -> bool {
        self.file_flags & rar5_block::FILE_SPLIT_AFTER != 0
    }

    fn compression_method(&self) -> i32 {
        (self.compression_info & 0x7F) as i32
    }
}

/// Reads one block frame starting at `block_start`.
fn read_block<R: Read>(reader: &mut R, block_start: u64) -> Result<Option<Block>> {
    let mut crc = [0u8; 4];
    let got = read_full(reader, &mut crc)?;
    if got == 0 {
        return Ok(None);
    }
    if got < 4 {
        return Err(Error::truncated(block_start, "block CRC32"));
    }

    let (header_size, size_len) = read_vint(reader)
        .map_err(|e| Error::from_read(e, block_start + 4, "header size vint"))?;
    let mut header = vec![0u8; header_size as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| Error::from_read(e, block_start + 4 + size_len as u64, "header area"))?;

    let mut c = Cursor::new(header.as_slice());
    let map_err = |e| Error::from_read(e, block_start, "header vints");

    let (header_type, _) = read_vint(&mut c).map_err(map_err)?;
    let (header_flags, _) = read_vint(&mut c).map_err(map_err)?;
    let _extra_size = if header_flags & rar5_block::HAS_EXTRA != 0 {
        read_vint(&mut c).map_err(map_err)?.0
    } else {
        0
    };
    let data_size = if header_flags & rar5_block::HAS_DATA != 0 {
        read_vint(&mut c).map_err(map_err)?.0
    } else {
        0
    };

    let file = if header_type == rar5_block::FILE {
        Some(parse_file_header(&mut c, &header, block_start)?)
    } else {
        None
    };

    Ok(Some(Block {
        header_type,
        frame_len: 4 + size_len as u64,
        block_size: 4 + size_len as u64 + header_size,
        data_size,
        file,
    }))
}

/// Parses the file-specific fields from the header area cursor.
fn parse_file_header(
    c: &mut Cursor<&[u8]>,
    header: &[u8],
    block_start: u64,
) -> Result<FileHeader> {
    let map_err = |e| Error::from_read(e, block_start, "file header body");

    let (file_flags, _) = read_vint(c).map_err(map_err)?;
    let (unpacked_size, _) = read_vint(c).map_err(map_err)?;
    let (_attributes, _) = read_vint(c).map_err(map_err)?;

    if file_flags & rar5_block::FILE_HAS_MTIME != 0 {
        let _mtime = read_u32_le(c).map_err(map_err)?;
    }
    let crc32 = if file_flags & rar5_block::FILE_HAS_CRC != 0 {
        Some(read_u32_le(c).map_err(map_err)?)
    } else {
        None
    };

    let (compression_info, _) = read_vint(c).map_err(map_err)?;
    let (_host_os, _) = read_vint(c).map_err(map_err)?;
    let (name_length, _) = read_vint(c).map_err(map_err)?;

    let name_start = c.position() as usize;
    let name_end = name_start
        .checked_add(name_length as usize)
        .filter(|&end| end <= header.len())
        .ok_or_else(|| Error::malformed(block_start, "file name exceeds header area"))?;
    let name = String::from_utf8_lossy(&header[name_start..name_end]).replace('\\', "/");

    Ok(FileHeader {
        file_flags,
        unpacked_size,
        crc32,
        compression_info,
        name,
    })
}

/// Stateful RAR5 parse over one concatenated volume stream.
struct Parser<'a, R> {
    reader: &'a mut R,
    volume_sizes: Option<&'a [u64]>,
    cumulative: Vec<u64>,
    pos: u64,
    volume_index: u32,
    just_ended: bool,
    /// Block size of the main archive header, reused by split inference
    /// because every continuation volume repeats it.
    main_block_size: Option<u64>,
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
            main_block_size: None,
            entries: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Vec<RarEntry>> {
        let mut sig = [0u8; 8];
        self.reader
            .read_exact(&mut sig)
            .map_err(|e| Error::from_read(e, 0, "RAR5 signature"))?;
        if &sig != RAR5_SIGNATURE {
            return Err(Error::InvalidSignature { format: "RAR5" });
        }
        self.pos = 8;

        loop {
            if self.just_ended {
                match resync_volume_signature(self.reader, RAR5_SIGNATURE)? {
                    Some(consumed) => {
                        self.pos += consumed;
                        self.volume_index += 1;
                        self.just_ended = false;
                    }
                    None => break,
                }
                continue;
            }

            let block_start = self.pos;
            let block = match read_block(self.reader, block_start)? {
                Some(block) => block,
                None => break,
            };
            let header_end = block_start + block.block_size;
            let data_end = header_end
                .checked_add(block.data_size)
                .ok_or_else(|| Error::malformed(block_start, "data size overflows stream offset"))?;
            self.pos = header_end;

            match block.header_type {
                rar5_block::MAIN => {
                    self.main_block_size = Some(block.block_size);
                    self.seek_to(data_end)?;
                }
                rar5_block::FILE => {
                    self.handle_file_block(block, block_start, header_end)?;
                }
                rar5_block::END => {
                    self.just_ended = true;
                    self.seek_to(data_end)?;
                }
                _ => {
                    // Service and unknown headers: skip header and data
                    self.seek_to(data_end)?;
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
        block: Block,
        block_start: u64,
        header_end: u64,
    ) -> Result<()> {
        let file = match block.file {
            Some(ref file) => file,
            None => return self.seek_to(header_end + block.data_size),
        };
        let data_end = header_end + block.data_size;

        if let Some(&idx) = self.by_path.get(&file.name) {
            self.entries[idx].split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_start: header_end,
                data_size: block.data_size,
            });
            return self.seek_to(data_end);
        }

        let method = file.compression_method();
        // Store-mode files are split whenever this volume's data area is
        // shorter than the full file, flags aside.
        let is_split = file.split_before()
            || file.split_after()
            || (method == 0 && block.data_size < file.unpacked_size);

        let mut entry = RarEntry {
            path: file.name.clone(),
            uncompressed_size: file.unpacked_size,
            compressed_size: if file.is_directory() {
                0
            } else {
                block.data_size
            },
            header_position: block_start + block.frame_len,
            data_position: header_end,
            is_directory: file.is_directory(),
            volume_index: self.volume_index,
            compression_method: method,
            split_parts: Vec::new(),
            crc32: file.crc32,
        };
        if is_split {
            entry.split_parts.push(SplitPart {
                volume_index: self.volume_index,
                data_start: header_end,
                data_size: block.data_size,
            });
        }

        let inferred = if file.split_after() && method == 0 {
            self.infer_remaining_parts(&mut entry, &block, file, header_end)?
        } else {
            false
        };

        let resume = match entry.split_parts.last().copied() {
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

    fn infer_remaining_parts(
        &mut self,
        entry: &mut RarEntry,
        block: &Block,
        file: &FileHeader,
        first_data_start: u64,
    ) -> Result<bool> {
        let (sizes, main_block_size) = match (self.volume_sizes, self.main_block_size) {
            (Some(sizes), Some(main)) => (sizes, main),
            _ => return Ok(false),
        };
        let v0 = self.volume_index as usize;
        if v0 >= sizes.len() {
            return Ok(false);
        }

        // Continuation volumes repeat the signature, the main header, and
        // this file's header block before the data resumes.
        let preamble = RAR5_SIGNATURE.len() as u64 + main_block_size + block.block_size;

        let trailer = first_data_start
            .checked_sub(self.cumulative[v0])
            .and_then(|in_volume| in_volume.checked_add(block.data_size))
            .and_then(|used| sizes[v0].checked_sub(used))
            .ok_or_else(|| {
                Error::malformed(first_data_start, "split data exceeds first volume")
            })?;

        let mut remaining = file
            .unpacked_size
            .checked_sub(block.data_size)
            .ok_or_else(|| {
                Error::malformed(first_data_start, "data area exceeds unpacked size")
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

/// Parses a RAR 5.x archive from a concatenated volume stream.
///
/// Mirrors [`super::rar4::parse`]: `volume_sizes` enables split-position
/// inference for store-mode files, and the returned entries are identical
/// with and without it. The reader must be positioned at the start of the
/// first volume.
pub fn parse<R: Read + Seek>(
    reader: &mut R,
    volume_sizes: Option<&[u64]>,
) -> Result<Vec<RarEntry>> {
    Parser::new(reader, volume_sizes).run()
}
