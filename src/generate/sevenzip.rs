//! 7z archive builder (Copy codec only).
//!
//! Lays the archive out as signature header, verbatim pack data (one Copy
//! folder per stream file), then the metadata block, and finally patches
//! the signature header with the metadata coordinates and both CRCs.

use crate::format::reader::write_variable_u64;
use crate::format::{attributes, property_id, SEVENZIP_SIGNATURE, SEVENZIP_SIGNATURE_HEADER_SIZE};
use crate::generate::SourceFile;

/// Builds a single-stream 7z archive from source files.
///
/// Directories and empty files become empty streams; every other file is
/// stored as its own Copy-coded folder. Chunk plans are ignored: a 7z
/// volume set is a plain byte-split of this output.
pub fn build(files: &[SourceFile]) -> Vec<u8> {
    let streams: Vec<&SourceFile> = files
        .iter()
        .filter(|f| !f.directory && !f.data.is_empty())
        .collect();

    let mut out = vec![0u8; SEVENZIP_SIGNATURE_HEADER_SIZE as usize];
    for file in &streams {
        out.extend_from_slice(&file.data);
    }

    let header_pos = out.len() as u64;
    let header = build_metadata(files, &streams);
    out.extend_from_slice(&header);

    // Signature header fixup: magic, version, CRCs, metadata coordinates
    out[0..6].copy_from_slice(SEVENZIP_SIGNATURE);
    out[6] = 0x00; // version major
    out[7] = 0x04; // version minor

    let next_header_offset = header_pos - SEVENZIP_SIGNATURE_HEADER_SIZE;
    out[12..20].copy_from_slice(&next_header_offset.to_le_bytes());
    out[20..28].copy_from_slice(&(header.len() as u64).to_le_bytes());
    out[28..32].copy_from_slice(&crc32fast::hash(&header).to_le_bytes());

    let start_crc = crc32fast::hash(&out[12..32]);
    out[8..12].copy_from_slice(&start_crc.to_le_bytes());

    out
}

/// Builds the tagged metadata block (`kHeader ... kEnd`).
fn build_metadata(files: &[SourceFile], streams: &[&SourceFile]) -> Vec<u8> {
    if files.is_empty() {
        return Vec::new();
    }

    let mut h = Vec::new();
    h.push(property_id::HEADER);

    if !streams.is_empty() {
        h.push(property_id::MAIN_STREAMS_INFO);

        // kPackInfo: pack position, stream count, sizes
        h.push(property_id::PACK_INFO);
        push_var(&mut h, 0);
        push_var(&mut h, streams.len() as u64);
        h.push(property_id::SIZE);
        for file in streams {
            push_var(&mut h, file.data.len() as u64);
        }
        h.push(property_id::END);

        // kUnpackInfo: one single-coder Copy folder per stream
        h.push(property_id::UNPACK_INFO);
        h.push(property_id::FOLDER);
        push_var(&mut h, streams.len() as u64);
        h.push(0x00); // not external
        for _ in streams {
            push_var(&mut h, 1); // one coder
            h.push(0x01); // flags: 1-byte method id, simple, no attributes
            h.push(0x00); // Copy
        }
        h.push(property_id::CODERS_UNPACK_SIZE);
        for file in streams {
            push_var(&mut h, file.data.len() as u64);
        }
        h.push(property_id::CRC);
        h.push(0x01); // all defined
        for file in streams {
            h.extend_from_slice(&crc32fast::hash(&file.data).to_le_bytes());
        }
        h.push(property_id::END); // end UnpackInfo
        h.push(property_id::END); // end MainStreamsInfo
    }

    h.push(property_id::FILES_INFO);
    push_var(&mut h, files.len() as u64);

    // kEmptyStream: directories and zero-byte files
    let empty_bits: Vec<bool> = files
        .iter()
        .map(|f| f.directory || f.data.is_empty())
        .collect();
    if empty_bits.iter().any(|&b| b) {
        h.push(property_id::EMPTY_STREAM);
        let mut bits = Vec::new();
        push_bool_bits(&mut bits, &empty_bits);
        push_var(&mut h, bits.len() as u64);
        h.extend_from_slice(&bits);
    }

    // kName: external flag plus UTF-16LE null-terminated names
    h.push(property_id::NAME);
    let mut names = vec![0x00u8]; // not external
    for file in files {
        for unit in file.name.encode_utf16() {
            names.extend_from_slice(&unit.to_le_bytes());
        }
        names.extend_from_slice(&[0x00, 0x00]);
    }
    push_var(&mut h, names.len() as u64);
    h.extend_from_slice(&names);

    // kWinAttributes: directory bit for directories
    if files.iter().any(|f| f.directory) {
        h.push(property_id::WIN_ATTRIBUTES);
        let mut attrs = vec![0x01u8, 0x00u8]; // all defined, not external
        for file in files {
            let attr: u32 = if file.directory {
                attributes::DIRECTORY
            } else {
                0x20 // FILE_ATTRIBUTE_ARCHIVE
            };
            attrs.extend_from_slice(&attr.to_le_bytes());
        }
        push_var(&mut h, attrs.len() as u64);
        h.extend_from_slice(&attrs);
    }

    h.push(property_id::END); // end FilesInfo
    h.push(property_id::END); // end Header
    h
}

fn push_var(out: &mut Vec<u8>, value: u64) {
    // Writing to a Vec cannot fail
    let _ = write_variable_u64(out, value);
}

fn push_bool_bits(out: &mut Vec<u8>, bits: &[bool]) {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    out.extend_from_slice(&bytes);
}
