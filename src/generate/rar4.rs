//! RAR 4.x volume builder (store method only).
//!
//! Produces the exact layout the parser's split inference assumes: every
//! volume opens with the 7-byte signature and the 13-byte archive header,
//! continuation volumes repeat the split file's header verbatim (with
//! adjusted pack size and split flags), and every volume closes with a
//! 7-byte end block.

use crate::format::{rar4_block, RAR4_SIGNATURE};
use crate::generate::SourceFile;

/// Builds the volumes of a RAR 4.x archive from source files.
///
/// Files are written in order; a file with a chunk plan spanning several
/// volumes closes the current volume after each chunk and re-announces
/// itself in the next one, exactly as multi-volume RAR archives do.
pub fn build_volumes(files: &[SourceFile]) -> Vec<Vec<u8>> {
    let multi_volume = files
        .iter()
        .any(|f| f.chunk_plan().len() > 1);

    let mut volumes = Vec::new();
    let mut vol = Vec::new();
    start_volume(&mut vol, true, multi_volume);

    for file in files {
        if file.directory {
            write_file_block(&mut vol, &file.name, rar4_block::FILE_DIRECTORY_MASK, 0, 0, 0);
            continue;
        }

        let crc = crc32fast::hash(&file.data);
        let total = file.data.len() as u64;
        let chunks = file.chunk_plan();
        let mut offset = 0usize;

        for (i, &chunk) in chunks.iter().enumerate() {
            if i > 0 {
                finish_volume(&mut vol);
                volumes.push(std::mem::take(&mut vol));
                start_volume(&mut vol, false, multi_volume);
            }

            let mut flags = 0u16;
            if i > 0 {
                flags |= rar4_block::FILE_SPLIT_BEFORE;
            }
            if i + 1 < chunks.len() {
                flags |= rar4_block::FILE_SPLIT_AFTER;
            }

            write_file_block(&mut vol, &file.name, flags, chunk, total, crc);
            vol.extend_from_slice(&file.data[offset..offset + chunk as usize]);
            offset += chunk as usize;
        }
    }

    finish_volume(&mut vol);
    volumes.push(vol);
    volumes
}

/// Writes the signature and the 13-byte archive header.
fn start_volume(out: &mut Vec<u8>, first: bool, multi_volume: bool) {
    out.extend_from_slice(RAR4_SIGNATURE);

    let mut flags = 0u16;
    if first {
        flags |= rar4_block::ARCHIVE_FIRST_VOLUME;
    }
    if multi_volume {
        flags |= rar4_block::ARCHIVE_VOLUME;
    }

    let mut block = vec![0u8, 0u8, rar4_block::ARCHIVE];
    block.extend_from_slice(&flags.to_le_bytes());
    block.extend_from_slice(&(rar4_block::ARCHIVE_HEADER_SIZE as u16).to_le_bytes());
    block.extend_from_slice(&[0u8; 6]); // reserved
    patch_crc16(&mut block);
    out.extend_from_slice(&block);
}

/// Writes the 7-byte end-of-archive block.
fn finish_volume(out: &mut Vec<u8>) {
    let mut block = vec![0u8, 0u8, rar4_block::END];
    block.extend_from_slice(&0u16.to_le_bytes());
    block.extend_from_slice(&(rar4_block::FRAME_SIZE as u16).to_le_bytes());
    patch_crc16(&mut block);
    out.extend_from_slice(&block);
}

/// Writes a file-header block (frame plus body, no data).
fn write_file_block(
    out: &mut Vec<u8>,
    name: &str,
    mut flags: u16,
    pack_size: u64,
    unpack_size: u64,
    crc: u32,
) {
    let large = pack_size > u32::MAX as u64 || unpack_size > u32::MAX as u64;
    if large {
        flags |= rar4_block::FILE_LARGE;
    }

    let name_bytes = name.as_bytes();
    let block_size =
        rar4_block::FRAME_SIZE + 25 + name_bytes.len() as u64 + if large { 8 } else { 0 };

    let mut block = vec![0u8, 0u8, rar4_block::FILE];
    block.extend_from_slice(&flags.to_le_bytes());
    block.extend_from_slice(&(block_size as u16).to_le_bytes());
    block.extend_from_slice(&(pack_size as u32).to_le_bytes());
    block.extend_from_slice(&(unpack_size as u32).to_le_bytes());
    block.push(0); // host OS
    block.extend_from_slice(&crc.to_le_bytes());
    block.extend_from_slice(&0u32.to_le_bytes()); // ftime
    block.push(20); // unpack version
    block.push(rar4_block::METHOD_STORE);
    block.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    block.extend_from_slice(&0u32.to_le_bytes()); // attributes
    if large {
        block.extend_from_slice(&((pack_size >> 32) as u32).to_le_bytes());
        block.extend_from_slice(&((unpack_size >> 32) as u32).to_le_bytes());
    }
    block.extend_from_slice(name_bytes);

    patch_crc16(&mut block);
    out.extend_from_slice(&block);
}

/// Fills the 16-bit header CRC: the low half of the CRC32 over everything
/// after the CRC field, per the RAR4 convention.
fn patch_crc16(block: &mut [u8]) {
    let crc = crc32fast::hash(&block[2..]) as u16;
    block[..2].copy_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_volume_layout() {
        let volumes = build_volumes(&[SourceFile::new("file.bin", vec![0xAA; 10])]);
        assert_eq!(volumes.len(), 1);

        let vol = &volumes[0];
        assert!(vol.starts_with(RAR4_SIGNATURE));
        // signature + archive header + file block + data + end block
        let file_block = 7 + 25 + 8;
        assert_eq!(vol.len(), 7 + 13 + file_block + 10 + 7);
        assert_eq!(vol[7 + 2], rar4_block::ARCHIVE);
        assert_eq!(vol[7 + 13 + 2], rar4_block::FILE);
        assert_eq!(vol[vol.len() - 5], rar4_block::END);
    }

    #[test]
    fn test_split_volume_count_and_sizes() {
        let data: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let volumes = build_volumes(&[SourceFile::split("bigfile", data, vec![80, 80, 40])]);
        assert_eq!(volumes.len(), 3);

        // Continuation volumes: signature + archive header + repeated file
        // header + chunk + end block
        let file_block = 7 + 25 + 7;
        assert_eq!(volumes[0].len(), 7 + 13 + file_block + 80 + 7);
        assert_eq!(volumes[1].len(), 7 + 13 + file_block + 80 + 7);
        assert_eq!(volumes[2].len(), 7 + 13 + file_block + 40 + 7);

        for vol in &volumes {
            assert!(vol.starts_with(RAR4_SIGNATURE));
        }
    }

    #[test]
    fn test_split_flags_progression() {
        let data = vec![1u8; 30];
        let volumes = build_volumes(&[SourceFile::split("abc", data, vec![10, 10, 10])]);

        let flags_of = |vol: &[u8]| {
            let base = 7 + 13;
            u16::from_le_bytes([vol[base + 3], vol[base + 4]])
        };
        assert_eq!(flags_of(&volumes[0]), rar4_block::FILE_SPLIT_AFTER);
        assert_eq!(
            flags_of(&volumes[1]),
            rar4_block::FILE_SPLIT_BEFORE | rar4_block::FILE_SPLIT_AFTER
        );
        assert_eq!(flags_of(&volumes[2]), rar4_block::FILE_SPLIT_BEFORE);
    }

    #[test]
    fn test_directory_block() {
        let volumes = build_volumes(&[SourceFile::directory("d")]);
        let vol = &volumes[0];
        let base = 7 + 13;
        let flags = u16::from_le_bytes([vol[base + 3], vol[base + 4]]);
        assert_eq!(
            flags & rar4_block::FILE_DIRECTORY_MASK,
            rar4_block::FILE_DIRECTORY_MASK
        );
    }
}
