//! PAR2 packet-stream parser.
//!
//! PAR2 recovery files carry File Description packets that map a file's
//! MD5 hashes (full file and first 16 KiB) to its original filename. The
//! dispatcher uses the 16 KiB hash to rename obfuscated volume files back
//! to what the recovery set calls them.
//!
//! Packet layout:
//!
//! ```text
//! magic(8) = "PAR2\0PKT" | length(8 LE) | packet_hash(16)
//! | recovery_set_id(16) | type(16) | body(length - 64)
//! ```
//!
//! Up to three padding bytes are tolerated between packets; anything else
//! that is not a packet header is a parse error.

use crate::error::{Error, Result};
use crate::format::par2_packet;

/// A file description extracted from a PAR2 `FileDesc` packet.
///
/// Identity is the `file_id`; two descriptions with equal ids describe the
/// same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Par2FileDescription {
    /// Unique file identifier within the recovery set.
    pub file_id: [u8; 16],
    /// MD5 hash of the entire file.
    pub file_hash: [u8; 16],
    /// MD5 hash of the first 16 KiB of the file.
    pub hash_16k: [u8; 16],
    /// File length in bytes.
    pub file_size: u64,
    /// Original filename (null padding trimmed).
    pub filename: String,
}

/// Parsed PAR2 metadata: the recovery set id plus its file descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Par2Info {
    /// Recovery set id of the first packet seen.
    pub set_id: [u8; 16],
    /// File descriptions in packet order.
    pub files: Vec<Par2FileDescription>,
}

impl Par2Info {
    /// Looks up a file description by its 16 KiB MD5 hash.
    pub fn find_by_hash_16k(&self, hash: &[u8; 16]) -> Option<&Par2FileDescription> {
        self.files.iter().find(|f| &f.hash_16k == hash)
    }
}

/// Fixed fields of a `FileDesc` body before the filename.
const FILE_DESC_FIXED_BODY: u64 = 16 + 16 + 16 + 8;

/// Parses a PAR2 byte stream into its recovery set id and file descriptions.
///
/// Packets other than `FileDesc` are skipped by their declared length.
/// Duplicate `FileDesc` packets (PAR2 files repeat packets for redundancy)
/// are collapsed by `file_id`.
///
/// # Errors
///
/// Returns [`Error::Par2`] when a packet header is truncated, its magic is
/// wrong after allowed padding, or a declared length is inconsistent.
pub fn parse(data: &[u8]) -> Result<Par2Info> {
    let mut info = Par2Info::default();
    let mut saw_packet = false;
    let mut pos = 0u64;

    loop {
        // End of stream, possibly after trailing padding
        let remaining = data.len() as u64 - pos;
        if remaining == 0 || (remaining <= par2_packet::MAX_PADDING && all_zero(&data[pos as usize..]))
        {
            break;
        }

        // Up to three padding bytes may precede the next packet
        let mut padded = 0u64;
        while padded < par2_packet::MAX_PADDING
            && ((pos + padded) as usize) < data.len()
            && !data[(pos + padded) as usize..].starts_with(par2_packet::MAGIC)
        {
            padded += 1;
        }
        pos += padded;

        if data.len() as u64 - pos < par2_packet::HEADER_SIZE {
            return Err(Error::par2(pos, "truncated packet header"));
        }
        let header = &data[pos as usize..(pos + par2_packet::HEADER_SIZE) as usize];
        if !header.starts_with(par2_packet::MAGIC) {
            return Err(Error::par2(pos, "bad packet magic"));
        }

        let length = u64::from_le_bytes(
            header[8..16]
                .try_into()
                .map_err(|_| Error::par2(pos, "short packet header"))?,
        );
        if length < par2_packet::HEADER_SIZE {
            return Err(Error::par2(pos, "packet length smaller than header"));
        }
        if pos + length > data.len() as u64 {
            return Err(Error::par2(pos, "packet length exceeds input"));
        }

        if !saw_packet {
            info.set_id = take16(&header[32..48]);
            saw_packet = true;
        }

        let packet_type = &header[48..64];
        if packet_type == par2_packet::FILE_DESC_TYPE {
            let body = &data[(pos + par2_packet::HEADER_SIZE) as usize..(pos + length) as usize];
            let desc = parse_file_desc(body, pos)?;
            if !info.files.iter().any(|f| f.file_id == desc.file_id) {
                info.files.push(desc);
            }
        }

        pos += length;
    }

    if !saw_packet {
        return Err(Error::par2(0, "no packets found"));
    }

    Ok(info)
}

/// Parses a `FileDesc` packet body.
fn parse_file_desc(body: &[u8], packet_pos: u64) -> Result<Par2FileDescription> {
    if (body.len() as u64) < FILE_DESC_FIXED_BODY {
        return Err(Error::par2(packet_pos, "FileDesc body too short"));
    }

    let file_size = u64::from_le_bytes(
        body[48..56]
            .try_into()
            .map_err(|_| Error::par2(packet_pos, "short FileDesc body"))?,
    );

    // Filename is null-padded to the packet's 4-byte alignment
    let name_bytes = &body[FILE_DESC_FIXED_BODY as usize..];
    let name_end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());
    let filename = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

    Ok(Par2FileDescription {
        file_id: take16(&body[0..16]),
        file_hash: take16(&body[16..32]),
        hash_16k: take16(&body[32..48]),
        file_size,
        filename,
    })
}

fn take16(slice: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&slice[..16]);
    out
}

fn all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
