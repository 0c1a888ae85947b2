//! 7z metadata parser restricted to the Copy codec.
//!
//! Reads the 32-byte signature header, locates the end-of-stream metadata
//! block, and walks the tagged property tree entirely in memory. Because
//! only the Copy (identity) codec is supported, per-file data offsets are
//! derived directly: files appear at `32 + pack_pos` in `kFilesInfo` order,
//! each advancing the offset by its own size.
//!
//! Rejected with [`Error::UnsupportedFeature`]: encoded (compressed)
//! headers, folders with more than one coder, complex (binding) coders,
//! external folder data, coder attribute payloads, and any codec other
//! than Copy.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::entry::SevenZipEntry;
use crate::error::{Error, Result};
use crate::format::reader::{
    read_all_or_bits, read_bool_vector, read_bytes, read_u32_le, read_u8, read_variable_u64,
};
use crate::format::{attributes, property_id, SEVENZIP_SIGNATURE, SEVENZIP_SIGNATURE_HEADER_SIZE};

/// Upper bound on counts read from headers, against absurd allocations.
const MAX_ENTRIES: u64 = 1 << 24;

/// The fixed-size header at the start of every 7z archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHeader {
    /// Offset from the end of the signature header to the metadata block.
    pub next_header_offset: u64,
    /// Size of the metadata block.
    pub next_header_size: u64,
    /// CRC of the metadata block.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Parses the signature and start header from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid, the start-header CRC
    /// does not match, or an I/O error occurs.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let mut sig = [0u8; 6];
        r.read_exact(&mut sig)
            .map_err(|e| Error::from_read(e, 0, "7z signature"))?;
        if sig != *SEVENZIP_SIGNATURE {
            return Err(Error::InvalidSignature { format: "7z" });
        }

        let _version_major = read_u8(r).map_err(|e| Error::from_read(e, 6, "version"))?;
        let _version_minor = read_u8(r).map_err(|e| Error::from_read(e, 7, "version"))?;
        let start_header_crc =
            read_u32_le(r).map_err(|e| Error::from_read(e, 8, "start header CRC"))?;

        let mut header_data = [0u8; 20];
        r.read_exact(&mut header_data)
            .map_err(|e| Error::from_read(e, 12, "start header"))?;

        let calculated_crc = crc32fast::hash(&header_data);
        if calculated_crc != start_header_crc {
            return Err(Error::corrupt_header(
                12,
                format!(
                    "start header CRC mismatch: expected {:#x}, got {:#x}",
                    start_header_crc, calculated_crc
                ),
            ));
        }

        let next_header_offset = u64::from_le_bytes(
            header_data[0..8]
                .try_into()
                .map_err(|_| Error::corrupt_header(12, "short start header"))?,
        );
        let next_header_size = u64::from_le_bytes(
            header_data[8..16]
                .try_into()
                .map_err(|_| Error::corrupt_header(20, "short start header"))?,
        );
        let next_header_crc = u32::from_le_bytes(
            header_data[16..20]
                .try_into()
                .map_err(|_| Error::corrupt_header(28, "short start header"))?,
        );

        Ok(Self {
            next_header_offset,
            next_header_size,
            next_header_crc,
        })
    }

    /// Returns the absolute byte position of the metadata block.
    pub fn next_header_position(&self) -> u64 {
        SEVENZIP_SIGNATURE_HEADER_SIZE + self.next_header_offset
    }
}

/// Information about packed (compressed) streams.
#[derive(Debug, Clone, Default)]
struct PackInfo {
    pack_pos: u64,
    pack_sizes: Vec<u64>,
}

impl PackInfo {
    fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        let pack_pos = read_var(c)?;
        let num_streams = read_count(c, "pack streams")? as usize;

        let mut pack_sizes = Vec::new();
        loop {
            match read_prop(c)? {
                property_id::END => break,
                property_id::SIZE => {
                    pack_sizes.reserve(num_streams);
                    for _ in 0..num_streams {
                        pack_sizes.push(read_var(c)?);
                    }
                }
                property_id::CRC => {
                    // Pack-stream CRCs are read and discarded
                    let defined = read_all_or_bits(c, num_streams)
                        .map_err(|e| header_err(c, e))?;
                    for _ in defined.iter().filter(|&&d| d) {
                        read_u32_le(c).map_err(|e| header_err(c, e))?;
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        c.position(),
                        format!("unexpected property {:#x} in PackInfo", other),
                    ));
                }
            }
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
        })
    }
}

/// A folder reduced to the Copy-codec case: one coder, one output stream.
#[derive(Debug, Clone)]
struct Folder {
    unpack_size: u64,
    crc: Option<u32>,
}

/// Folder/coder definitions from `kUnPackInfo`.
#[derive(Debug, Clone, Default)]
struct UnpackInfo {
    folders: Vec<Folder>,
}

impl UnpackInfo {
    fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        if read_prop(c)? != property_id::FOLDER {
            return Err(Error::corrupt_header(
                c.position(),
                "UnpackInfo does not start with folder property",
            ));
        }

        let num_folders = read_count(c, "folders")? as usize;
        let external = read_prop(c)?;
        if external != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "external folder data",
            });
        }

        for _ in 0..num_folders {
            Self::validate_folder(c)?;
        }

        if read_prop(c)? != property_id::CODERS_UNPACK_SIZE {
            return Err(Error::corrupt_header(
                c.position(),
                "missing coders unpack size property",
            ));
        }
        let mut folders = Vec::with_capacity(num_folders);
        for _ in 0..num_folders {
            folders.push(Folder {
                unpack_size: read_var(c)?,
                crc: None,
            });
        }

        loop {
            match read_prop(c)? {
                property_id::END => break,
                property_id::CRC => {
                    let defined =
                        read_all_or_bits(c, num_folders).map_err(|e| header_err(c, e))?;
                    for (folder, &has_crc) in folders.iter_mut().zip(defined.iter()) {
                        if has_crc {
                            folder.crc = Some(read_u32_le(c).map_err(|e| header_err(c, e))?);
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        c.position(),
                        format!("unexpected property {:#x} in UnpackInfo", other),
                    ));
                }
            }
        }

        Ok(Self { folders })
    }

    /// Reads one folder definition, accepting only a single Copy coder.
    fn validate_folder(c: &mut Cursor<&[u8]>) -> Result<()> {
        let num_coders = read_var(c)?;
        if num_coders != 1 {
            return Err(Error::UnsupportedFeature {
                feature: "folders with more than one coder",
            });
        }

        let flags = read_prop(c)?;
        let id_size = (flags & 0x0F) as usize;
        let is_complex = flags & 0x10 != 0;
        let has_attributes = flags & 0x20 != 0;

        if is_complex {
            return Err(Error::UnsupportedFeature {
                feature: "complex coders",
            });
        }

        let method_id = read_bytes(c, id_size).map_err(|e| header_err(c, e))?;
        if method_id != [0x00] {
            return Err(Error::UnsupportedFeature {
                feature: "codecs other than Copy",
            });
        }

        if has_attributes {
            let props_size = read_var(c)?;
            if props_size != 0 {
                return Err(Error::UnsupportedFeature {
                    feature: "coder attribute payloads",
                });
            }
        }

        Ok(())
    }
}

/// Per-file stream sizes and digests from `kSubStreamsInfo`.
#[derive(Debug, Clone)]
struct SubStreamsInfo {
    sizes: Vec<u64>,
    digests: Vec<Option<u32>>,
}

impl SubStreamsInfo {
    fn parse(c: &mut Cursor<&[u8]>, folders: &[Folder]) -> Result<Self> {
        let mut nums: Vec<u64> = vec![1; folders.len()];
        let mut sizes: Option<Vec<u64>> = None;
        let mut digests: Vec<Option<u32>> = Vec::new();

        loop {
            match read_prop(c)? {
                property_id::END => break,

                property_id::NUM_UNPACK_STREAM => {
                    for num in nums.iter_mut() {
                        *num = read_count(c, "substreams")?;
                    }
                }

                property_id::SIZE => {
                    let mut all = Vec::new();
                    for (folder, &num) in folders.iter().zip(nums.iter()) {
                        if num == 0 {
                            continue;
                        }
                        let mut sum = 0u64;
                        for _ in 0..num - 1 {
                            let size = read_var(c)?;
                            all.push(size);
                            sum += size;
                        }
                        let last = folder.unpack_size.checked_sub(sum).ok_or_else(|| {
                            Error::corrupt_header(
                                c.position(),
                                "substream sizes exceed folder size",
                            )
                        })?;
                        all.push(last);
                    }
                    sizes = Some(all);
                }

                property_id::CRC => {
                    // Streams whose folder already carries a CRC keep it;
                    // the property lists digests for the rest.
                    let known: Vec<Option<u32>> = folders
                        .iter()
                        .zip(nums.iter())
                        .flat_map(|(folder, &num)| {
                            let folder_crc = if num == 1 { folder.crc } else { None };
                            (0..num).map(move |_| folder_crc)
                        })
                        .collect();
                    let missing = known.iter().filter(|crc| crc.is_none()).count();
                    let defined =
                        read_all_or_bits(c, missing).map_err(|e| header_err(c, e))?;

                    digests = Vec::with_capacity(known.len());
                    let mut defined_iter = defined.iter();
                    for crc in known {
                        match crc {
                            Some(v) => digests.push(Some(v)),
                            None => {
                                let has = defined_iter.next().copied().unwrap_or(false);
                                digests.push(if has {
                                    Some(read_u32_le(c).map_err(|e| header_err(c, e))?)
                                } else {
                                    None
                                });
                            }
                        }
                    }
                }

                other => {
                    return Err(Error::corrupt_header(
                        c.position(),
                        format!("unexpected property {:#x} in SubStreamsInfo", other),
                    ));
                }
            }
        }

        let sizes = match sizes {
            Some(sizes) => sizes,
            None => {
                // One stream per folder unless counts said otherwise
                if nums.iter().any(|&n| n > 1) {
                    return Err(Error::corrupt_header(
                        c.position(),
                        "substream counts without sizes",
                    ));
                }
                folders
                    .iter()
                    .zip(nums.iter())
                    .filter(|(_, &num)| num == 1)
                    .map(|(folder, _)| folder.unpack_size)
                    .collect()
            }
        };

        if digests.is_empty() {
            digests = folders
                .iter()
                .zip(nums.iter())
                .flat_map(|(folder, &num)| {
                    let crc = if num == 1 { folder.crc } else { None };
                    (0..num).map(move |_| crc)
                })
                .collect();
        }

        Ok(Self { sizes, digests })
    }
}

/// Parsed `kMainStreamsInfo` contents.
#[derive(Debug, Clone, Default)]
struct StreamsInfo {
    pack_info: Option<PackInfo>,
    unpack_info: Option<UnpackInfo>,
    substreams: Option<SubStreamsInfo>,
}

impl StreamsInfo {
    fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut info = StreamsInfo::default();

        loop {
            match read_prop(c)? {
                property_id::END => break,
                property_id::PACK_INFO => {
                    info.pack_info = Some(PackInfo::parse(c)?);
                }
                property_id::UNPACK_INFO => {
                    info.unpack_info = Some(UnpackInfo::parse(c)?);
                }
                property_id::SUBSTREAMS_INFO => {
                    let folders = info
                        .unpack_info
                        .as_ref()
                        .map_or(&[] as &[Folder], |u| &u.folders);
                    info.substreams = Some(SubStreamsInfo::parse(c, folders)?);
                }
                other => {
                    return Err(Error::corrupt_header(
                        c.position(),
                        format!("unexpected property {:#x} in streams info", other),
                    ));
                }
            }
        }

        Ok(info)
    }

    /// Returns per-stream sizes and digests, preferring substreams info.
    fn file_sizes_and_digests(&self) -> (Vec<u64>, Vec<Option<u32>>) {
        if let Some(ref sub) = self.substreams {
            return (sub.sizes.clone(), sub.digests.clone());
        }
        if let Some(ref unpack) = self.unpack_info {
            let sizes = unpack.folders.iter().map(|f| f.unpack_size).collect();
            let crcs = unpack.folders.iter().map(|f| f.crc).collect();
            return (sizes, crcs);
        }
        (Vec::new(), Vec::new())
    }
}

/// Per-file metadata from `kFilesInfo`.
#[derive(Debug, Clone, Default)]
struct FilesInfo {
    names: Vec<String>,
    empty_stream: Vec<bool>,
    attrs: Vec<Option<u32>>,
}

impl FilesInfo {
    fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        let num_files = read_count(c, "files")? as usize;

        let mut info = FilesInfo {
            names: Vec::new(),
            empty_stream: vec![false; num_files],
            attrs: vec![None; num_files],
        };

        loop {
            let prop = read_prop(c)?;
            if prop == property_id::END {
                break;
            }

            let prop_size = read_var(c)?;
            let start = c.position();
            let end = start.checked_add(prop_size).ok_or_else(|| {
                Error::corrupt_header(start, "property size overflows header")
            })?;

            match prop {
                property_id::NAME => {
                    let external = read_prop(c)?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external file names",
                        });
                    }
                    for _ in 0..num_files {
                        info.names.push(read_utf16le_string(c)?);
                    }
                }

                property_id::EMPTY_STREAM => {
                    info.empty_stream =
                        read_bool_vector(c, num_files).map_err(|e| header_err(c, e))?;
                }

                property_id::WIN_ATTRIBUTES => {
                    let defined =
                        read_all_or_bits(c, num_files).map_err(|e| header_err(c, e))?;
                    let external = read_prop(c)?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external attributes",
                        });
                    }
                    for (slot, &has_attr) in info.attrs.iter_mut().zip(defined.iter()) {
                        if has_attr {
                            *slot = Some(read_u32_le(c).map_err(|e| header_err(c, e))?);
                        }
                    }
                }

                // kEmptyFile, kMTime, kDummy, and anything unknown are
                // skipped; the size prefix below is the only anchor.
                _ => {}
            }

            // Unconditionally respect the declared property size, whether
            // or not the body was consumed.
            if end > c.get_ref().len() as u64 {
                return Err(Error::corrupt_header(start, "property exceeds header"));
            }
            c.set_position(end);
        }

        Ok(info)
    }
}

/// Maximum length for UTF-16LE strings read from headers (in code units).
const MAX_UTF16_STRING_LENGTH: usize = 32768;

/// Reads a UTF-16LE null-terminated string.
fn read_utf16le_string(c: &mut Cursor<&[u8]>) -> Result<String> {
    let mut units = Vec::new();

    loop {
        let mut buf = [0u8; 2];
        c.read_exact(&mut buf)
            .map_err(|e| Error::from_read(e, c.position(), "UTF-16 file name"))?;
        let unit = u16::from_le_bytes(buf);
        if unit == 0 {
            break;
        }
        if units.len() >= MAX_UTF16_STRING_LENGTH {
            return Err(Error::corrupt_header(c.position(), "file name too long"));
        }
        units.push(unit);
    }

    String::from_utf16(&units)
        .map_err(|_| Error::corrupt_header(c.position(), "invalid UTF-16 file name"))
}

fn read_prop(c: &mut Cursor<&[u8]>) -> Result<u8> {
    read_u8(c).map_err(|e| header_err(c, e))
}

fn read_var(c: &mut Cursor<&[u8]>) -> Result<u64> {
    read_variable_u64(c).map_err(|e| header_err(c, e))
}

fn read_count(c: &mut Cursor<&[u8]>, what: &'static str) -> Result<u64> {
    let count = read_var(c)?;
    if count > MAX_ENTRIES {
        return Err(Error::corrupt_header(
            c.position(),
            format!("implausible number of {}: {}", what, count),
        ));
    }
    Ok(count)
}

fn header_err(c: &Cursor<&[u8]>, e: std::io::Error) -> Error {
    Error::from_read(e, c.position(), "header data")
}

/// Parses a 7z archive and returns its entries with derived data offsets.
///
/// The reader must be positioned at the start of the archive and support
/// backward seeking (the metadata block lives at the end of the stream).
///
/// # Errors
///
/// Returns [`Error::UnsupportedFeature`] for encoded headers and anything
/// outside the single-Copy-coder subset; [`Error::CorruptHeader`] when a
/// header CRC does not match or the property tree is inconsistent.
pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Vec<SevenZipEntry>> {
    let start = StartHeader::parse(reader)?;

    if start.next_header_size == 0 {
        return Ok(Vec::new());
    }
    if start.next_header_size > MAX_ENTRIES * 64 {
        return Err(Error::corrupt_header(
            SEVENZIP_SIGNATURE_HEADER_SIZE,
            "implausible metadata size",
        ));
    }

    let header_pos = start.next_header_position();
    reader.seek(SeekFrom::Start(header_pos))?;
    let mut header_data = vec![0u8; start.next_header_size as usize];
    reader
        .read_exact(&mut header_data)
        .map_err(|e| Error::from_read(e, header_pos, "metadata block"))?;

    let actual_crc = crc32fast::hash(&header_data);
    if actual_crc != start.next_header_crc {
        return Err(Error::corrupt_header(
            header_pos,
            format!(
                "metadata CRC mismatch: expected {:#x}, got {:#x}",
                start.next_header_crc, actual_crc
            ),
        ));
    }

    let mut c = Cursor::new(header_data.as_slice());
    match read_prop(&mut c)? {
        property_id::HEADER => {}
        property_id::ENCODED_HEADER => {
            return Err(Error::UnsupportedFeature {
                feature: "compressed headers",
            });
        }
        other => {
            return Err(Error::corrupt_header(
                header_pos,
                format!("expected header marker, got {:#x}", other),
            ));
        }
    }

    let mut streams = StreamsInfo::default();
    let mut files = FilesInfo::default();

    loop {
        match read_prop(&mut c)? {
            property_id::END => break,
            property_id::MAIN_STREAMS_INFO => {
                streams = StreamsInfo::parse(&mut c)?;
            }
            property_id::FILES_INFO => {
                files = FilesInfo::parse(&mut c)?;
            }
            other => {
                return Err(Error::corrupt_header(
                    c.position(),
                    format!("unexpected property {:#x} in header", other),
                ));
            }
        }
    }

    derive_entries(&streams, &files)
}

/// Builds the entry list, deriving each file's absolute data offset.
fn derive_entries(streams: &StreamsInfo, files: &FilesInfo) -> Result<Vec<SevenZipEntry>> {
    let (sizes, digests) = streams.file_sizes_and_digests();
    let pack_pos = streams
        .pack_info
        .as_ref()
        .map_or(0, |pack| pack.pack_pos);

    let num_files = files.empty_stream.len().max(files.names.len());
    let mut entries = Vec::with_capacity(num_files);
    let mut current_offset = SEVENZIP_SIGNATURE_HEADER_SIZE + pack_pos;
    let mut stream_idx = 0usize;

    for i in 0..num_files {
        let name = files.names.get(i).cloned().unwrap_or_default();
        let empty = files.empty_stream.get(i).copied().unwrap_or(false);

        if empty {
            let attr = files.attrs.get(i).copied().flatten().unwrap_or(0);
            let is_directory = attr & attributes::DIRECTORY != 0 || name.ends_with('/');
            entries.push(SevenZipEntry {
                path: name,
                size: 0,
                packed_size: 0,
                data_offset: 0,
                is_directory,
                method: None,
                crc32: None,
            });
            continue;
        }

        let size = sizes.get(stream_idx).copied().ok_or_else(|| {
            Error::corrupt_header(0, format!("missing stream size for file {}", i))
        })?;
        let crc32 = digests.get(stream_idx).copied().flatten();
        stream_idx += 1;

        let data_offset = if size == 0 {
            0
        } else {
            let offset = current_offset;
            current_offset += size;
            offset
        };

        entries.push(SevenZipEntry {
            path: name,
            size,
            // Copy codec: packed bytes equal unpacked bytes
            packed_size: size,
            data_offset,
            is_directory: false,
            method: Some("Copy".to_string()),
            crc32,
        });
    }

    Ok(entries)
}
