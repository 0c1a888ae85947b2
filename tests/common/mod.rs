//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use volparse::VolumeDescriptor;

/// Deterministic test data: the byte pattern `0, 1, ..., 255` repeated.
pub fn byte_ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Deterministic but less regular test data.
pub fn scrambled(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64).wrapping_mul(2654435761) >> 16) as u8)
        .collect()
}

/// Concatenates volumes into one stream.
pub fn concat(volumes: &[Vec<u8>]) -> Vec<u8> {
    volumes.concat()
}

/// Per-volume sizes of a volume list.
pub fn sizes(volumes: &[Vec<u8>]) -> Vec<u64> {
    volumes.iter().map(|v| v.len() as u64).collect()
}

/// Builds dispatcher descriptors with previews for the volumes.
pub fn descriptors(volumes: &[Vec<u8>], names: &[&str]) -> Vec<VolumeDescriptor> {
    assert_eq!(volumes.len(), names.len());
    volumes
        .iter()
        .zip(names.iter())
        .map(|(vol, name)| {
            let preview = vol[..vol.len().min(16384)].to_vec();
            VolumeDescriptor::with_preview(*name, vol.len() as u64, preview)
        })
        .collect()
}

/// Reads the bytes a split-part list points at from a concatenated stream.
pub fn collect_parts(stream: &[u8], parts: &[volparse::SplitPart]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        let start = part.data_start as usize;
        out.extend_from_slice(&stream[start..start + part.data_size as usize]);
    }
    out
}

/// PAR2 packet-stream builder for resolution tests.
pub mod par2 {
    const MAGIC: &[u8; 8] = b"PAR2\0PKT";
    const FILE_DESC_TYPE: &[u8; 16] = b"PAR 2.0\0FileDesc";
    const HEADER_SIZE: usize = 64;

    /// Builds a `FileDesc` packet whose 16-KiB hash is the real MD5 of
    /// `content` (truncated to 16 KiB), so descriptor resolution matches.
    pub fn file_desc_packet(filename: &str, content: &[u8], file_id: [u8; 16]) -> Vec<u8> {
        let first_16k = &content[..content.len().min(16384)];
        let hash_16k = md5::compute(first_16k).0;
        let file_hash = md5::compute(content).0;

        let name = filename.as_bytes();
        let padded_len = name.len().div_ceil(4) * 4;
        let length = (HEADER_SIZE + 56 + padded_len) as u64;

        let mut packet = Vec::with_capacity(length as usize);
        packet.extend_from_slice(MAGIC);
        packet.extend_from_slice(&length.to_le_bytes());
        packet.extend_from_slice(&[0u8; 16]); // packet hash (unchecked)
        packet.extend_from_slice(&[0x42u8; 16]); // recovery set id
        packet.extend_from_slice(FILE_DESC_TYPE);
        packet.extend_from_slice(&file_id);
        packet.extend_from_slice(&file_hash);
        packet.extend_from_slice(&hash_16k);
        packet.extend_from_slice(&(content.len() as u64).to_le_bytes());
        packet.extend_from_slice(name);
        packet.resize(length as usize, 0);
        packet
    }

    /// Builds an index containing one `FileDesc` packet per `(name,
    /// content)` pair.
    pub fn index(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, (name, content)) in files.iter().enumerate() {
            let mut file_id = [0u8; 16];
            file_id[0] = i as u8 + 1;
            out.extend_from_slice(&file_desc_packet(name, content, file_id));
        }
        out
    }
}
