//! Byte-exact archive builders for round-trip testing.
//!
//! The parsers in this crate are validated by generating archives from raw
//! data and checking that the reported coordinates recover the input
//! byte-for-byte. Only the store/Copy representations are produced, which
//! keeps every builder a pure layout exercise: headers plus verbatim data.
//!
//! Multi-volume layouts are driven by explicit per-volume chunk plans so
//! tests can pin exact split points (e.g. an 80/80/40 split), with
//! [`even_chunks`] as the convenience for "split into N volumes".

pub mod rar4;
pub mod rar5;
pub mod sevenzip;

/// A file (or directory) to place into a generated archive.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path within the archive.
    pub name: String,
    /// File contents; empty for directories.
    pub data: Vec<u8>,
    /// Per-volume data sizes, starting at the volume where the file
    /// begins. `None` keeps the file inside a single volume. Ignored by
    /// the 7z builder, which produces one stream.
    pub chunks: Option<Vec<u64>>,
    /// Whether this entry is a directory.
    pub directory: bool,
}

impl SourceFile {
    /// A regular file contained in one volume.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            chunks: None,
            directory: false,
        }
    }

    /// A file split across volumes according to `chunks`.
    ///
    /// The chunk sizes must sum to the data length; each chunk lands in its
    /// own volume, starting wherever the previous file left off.
    pub fn split(name: impl Into<String>, data: Vec<u8>, chunks: Vec<u64>) -> Self {
        debug_assert_eq!(
            chunks.iter().sum::<u64>(),
            data.len() as u64,
            "chunk sizes must sum to the data length"
        );
        Self {
            name: name.into(),
            data,
            chunks: Some(chunks),
            directory: false,
        }
    }

    /// A directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            chunks: None,
            directory: true,
        }
    }

    /// The chunk plan, defaulting to "everything in the current volume".
    pub(crate) fn chunk_plan(&self) -> Vec<u64> {
        match self.chunks {
            Some(ref chunks) => chunks.clone(),
            None => vec![self.data.len() as u64],
        }
    }
}

/// Splits `len` bytes into `parts` chunk sizes as evenly as possible.
///
/// Earlier chunks absorb the remainder, so the sizes are non-increasing
/// and sum to `len` exactly.
pub fn even_chunks(len: u64, parts: u32) -> Vec<u64> {
    assert!(parts > 0, "cannot split into zero parts");
    let base = len / parts as u64;
    let remainder = (len % parts as u64) as u32;
    (0..parts)
        .map(|i| base + if i < remainder { 1 } else { 0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_chunks() {
        assert_eq!(even_chunks(1024, 3), vec![342, 341, 341]);
        assert_eq!(even_chunks(9, 3), vec![3, 3, 3]);
        assert_eq!(even_chunks(10, 3), vec![4, 3, 3]);
        assert_eq!(even_chunks(2, 3), vec![1, 1, 0]);
        assert_eq!(even_chunks(0, 2), vec![0, 0]);
    }

    #[test]
    fn test_even_chunks_sum() {
        for len in [0u64, 1, 100, 999, 4096] {
            for parts in 1..=7u32 {
                assert_eq!(even_chunks(len, parts).iter().sum::<u64>(), len);
            }
        }
    }

    #[test]
    fn test_chunk_plan_default() {
        let file = SourceFile::new("a.bin", vec![0u8; 42]);
        assert_eq!(file.chunk_plan(), vec![42]);

        let split = SourceFile::split("b.bin", vec![0u8; 10], vec![6, 4]);
        assert_eq!(split.chunk_plan(), vec![6, 4]);
    }
}
