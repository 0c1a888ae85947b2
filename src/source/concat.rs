//! In-memory concatenation of volume buffers.

use std::io::{self, Read, Seek, SeekFrom};

/// Presents an ordered list of in-memory volume buffers as one logical
/// seekable stream.
///
/// Reads never cross a volume boundary in a single call; callers that need
/// exact counts use `read_exact`, which loops as usual. Seeking past the
/// end is allowed and leaves subsequent reads returning 0.
#[derive(Debug, Clone)]
pub struct ConcatReader {
    volumes: Vec<Vec<u8>>,
    /// Cumulative start offset of each volume.
    starts: Vec<u64>,
    total: u64,
    position: u64,
}

impl ConcatReader {
    /// Creates a reader over the given volumes, in order.
    pub fn new(volumes: Vec<Vec<u8>>) -> Self {
        let mut starts = Vec::with_capacity(volumes.len());
        let mut total = 0u64;
        for vol in &volumes {
            starts.push(total);
            total += vol.len() as u64;
        }
        Self {
            volumes,
            starts,
            total,
            position: 0,
        }
    }

    /// Returns the sizes of all volumes in order.
    pub fn volume_sizes(&self) -> Vec<u64> {
        self.volumes.iter().map(|v| v.len() as u64).collect()
    }

    /// Returns the total logical size across all volumes.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Returns the zero-based index of the volume containing the current
    /// position (the last volume once at or past the end).
    pub fn current_volume(&self) -> u32 {
        match self.starts.binary_search(&self.position) {
            Ok(idx) => idx as u32,
            Err(0) => 0,
            Err(idx) => (idx - 1) as u32,
        }
    }
}

impl Read for ConcatReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.total || buf.is_empty() {
            return Ok(0);
        }
        let vol_idx = self.current_volume() as usize;
        let in_vol = (self.position - self.starts[vol_idx]) as usize;
        let vol = &self.volumes[vol_idx];
        let n = buf.len().min(vol.len() - in_vol);
        buf[..n].copy_from_slice(&vol[in_vol..in_vol + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ConcatReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.total.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.position = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}
