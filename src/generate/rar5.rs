//! RAR 5.x volume builder (store method only).
//!
//! Emits the vint-framed block chain: each volume opens with the 8-byte
//! signature and a main header block, continuation volumes repeat the
//! split file's header before its data resumes, and every volume closes
//! with an end-of-archive block whose flags say whether more volumes
//! follow.

use crate::format::reader::{vint_len, write_vint};
use crate::format::{rar5_block, RAR5_SIGNATURE};
use crate::generate::SourceFile;

/// Builds the volumes of a RAR 5.x archive from source files.
pub fn build_volumes(files: &[SourceFile]) -> Vec<Vec<u8>> {
    let multi_volume = files.iter().any(|f| f.chunk_plan().len() > 1);

    let mut volumes = Vec::new();
    let mut vol = Vec::new();
    start_volume(&mut vol, multi_volume);

    for file in files {
        if file.directory {
            write_file_block(&mut vol, &file.name, rar5_block::FILE_DIRECTORY, None, 0, None);
            continue;
        }

        let crc = crc32fast::hash(&file.data);
        let total = file.data.len() as u64;
        let chunks = file.chunk_plan();
        let mut offset = 0usize;

        for (i, &chunk) in chunks.iter().enumerate() {
            if i > 0 {
                finish_volume(&mut vol, true);
                volumes.push(std::mem::take(&mut vol));
                start_volume(&mut vol, multi_volume);
            }

            let mut flags = rar5_block::FILE_HAS_CRC;
            if i > 0 {
                flags |= rar5_block::FILE_SPLIT_BEFORE;
            }
            if i + 1 < chunks.len() {
                flags |= rar5_block::FILE_SPLIT_AFTER;
            }

            write_file_block(&mut vol, &file.name, flags, Some(chunk), total, Some(crc));
            vol.extend_from_slice(&file.data[offset..offset + chunk as usize]);
            offset += chunk as usize;
        }
    }

    finish_volume(&mut vol, false);
    volumes.push(vol);
    volumes
}

/// Writes the signature and the main archive header block.
fn start_volume(out: &mut Vec<u8>, multi_volume: bool) {
    out.extend_from_slice(RAR5_SIGNATURE);

    let mut header = Vec::new();
    push_vint(&mut header, rar5_block::MAIN);
    push_vint(&mut header, 0); // header flags
    push_vint(&mut header, if multi_volume { 0x01 } else { 0x00 }); // archive flags
    write_block(out, &header);
}

/// Writes the end-of-archive block; `more_volumes` sets the continuation
/// flag in its body.
fn finish_volume(out: &mut Vec<u8>, more_volumes: bool) {
    let mut header = Vec::new();
    push_vint(&mut header, rar5_block::END);
    push_vint(&mut header, 0); // header flags
    push_vint(&mut header, if more_volumes { 0x01 } else { 0x00 });
    write_block(out, &header);
}

/// Writes a file-header block. `data_size` is the data area that follows
/// in this volume (`None` for directories, which carry no data area).
fn write_file_block(
    out: &mut Vec<u8>,
    name: &str,
    file_flags: u64,
    data_size: Option<u64>,
    unpacked_size: u64,
    crc: Option<u32>,
) {
    let name_bytes = name.as_bytes();

    let mut header = Vec::new();
    push_vint(&mut header, rar5_block::FILE);
    match data_size {
        Some(size) => {
            push_vint(&mut header, rar5_block::HAS_DATA);
            push_vint(&mut header, size);
        }
        None => push_vint(&mut header, 0),
    }
    push_vint(&mut header, file_flags);
    push_vint(&mut header, unpacked_size);
    push_vint(&mut header, 0); // attributes
    if let Some(crc) = crc {
        debug_assert!(file_flags & rar5_block::FILE_HAS_CRC != 0);
        header.extend_from_slice(&crc.to_le_bytes());
    }
    push_vint(&mut header, 0); // compression info: store
    push_vint(&mut header, 0); // host OS
    push_vint(&mut header, name_bytes.len() as u64);
    header.extend_from_slice(name_bytes);

    write_block(out, &header);
}

/// Frames a header area as `crc32 | header_size(vint) | header`.
///
/// The CRC covers the size vint and the header area, matching what RAR
/// tooling writes (the parsers expose it without verification).
fn write_block(out: &mut Vec<u8>, header: &[u8]) {
    let mut framed = Vec::with_capacity(vint_len(header.len() as u64) + header.len());
    push_vint(&mut framed, header.len() as u64);
    framed.extend_from_slice(header);

    let crc = crc32fast::hash(&framed);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&framed);
}

fn push_vint(out: &mut Vec<u8>, value: u64) {
    // Writing to a Vec cannot fail
    let _ = write_vint(out, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_volume_layout() {
        let volumes = build_volumes(&[SourceFile::new("file.bin", vec![0x55; 10])]);
        assert_eq!(volumes.len(), 1);

        let vol = &volumes[0];
        assert!(vol.starts_with(RAR5_SIGNATURE));
        // main block: crc(4) + size vint(1) + type/flags/body(3)
        assert_eq!(vol[8 + 4], 3);

        // file block header starts after signature + main block
        let file_block_start = 8 + 8;
        // header size vint value: type(1) + flags(1) + data_size(1)
        // + file_flags(1) + unpacked(1) + attrs(1) + crc(4) + comp(1)
        // + host(1) + name_len(1) + name(8)
        assert_eq!(vol[file_block_start + 4], 21);
    }

    #[test]
    fn test_split_volume_count() {
        let data = vec![7u8; 600];
        let volumes = build_volumes(&[SourceFile::split(
            "bigfile",
            data,
            vec![200, 200, 200],
        )]);
        assert_eq!(volumes.len(), 3);
        for vol in &volumes {
            assert!(vol.starts_with(RAR5_SIGNATURE));
        }

        // Continuation volumes are byte-identical in size: signature +
        // main block + repeated file header + chunk + end block
        assert_eq!(volumes[0].len(), volumes[1].len());
    }

    #[test]
    fn test_end_block_flags() {
        let data = vec![1u8; 20];
        let volumes = build_volumes(&[SourceFile::split("ab", data, vec![10, 10])]);
        assert_eq!(volumes.len(), 2);

        // End block body byte: 0x01 on non-final volumes, 0x00 on the last
        let end_body = |vol: &[u8]| vol[vol.len() - 1];
        assert_eq!(end_body(&volumes[0]), 0x01);
        assert_eq!(end_body(&volumes[1]), 0x00);
    }
}
