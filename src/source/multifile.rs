//! Seekable reader over on-disk volume files.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::dispatch::VolumeDescriptor;
use crate::error::{Error, Result};

/// A reader that presents a list of volume files as one logical stream.
///
/// Volume files are opened lazily, one `BufReader<File>` per volume, and
/// switched automatically as reads cross boundaries.
pub struct MultiVolumeReader {
    paths: Vec<PathBuf>,
    handles: Vec<Option<BufReader<File>>>,
    sizes: Vec<u64>,
    /// Cumulative start offset of each volume.
    starts: Vec<u64>,
    total: u64,
    position: u64,
}

impl std::fmt::Debug for MultiVolumeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiVolumeReader")
            .field("paths", &self.paths)
            .field("sizes", &self.sizes)
            .field("starts", &self.starts)
            .field("total", &self.total)
            .field("position", &self.position)
            .finish()
    }
}

impl MultiVolumeReader {
    /// Opens a reader over the given volume files, in order.
    ///
    /// Sizes are taken from file metadata up front; the files themselves
    /// are opened on first read.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let mut sizes = Vec::with_capacity(paths.len());
        let mut starts = Vec::with_capacity(paths.len());
        let mut total = 0u64;

        for path in &paths {
            let meta = std::fs::metadata(path).map_err(Error::Io)?;
            starts.push(total);
            sizes.push(meta.len());
            total += meta.len();
        }

        let handles = paths.iter().map(|_| None).collect();
        Ok(Self {
            paths,
            handles,
            sizes,
            starts,
            total,
            position: 0,
        })
    }

    /// Opens a reader over a full volume set, discovering siblings of the
    /// given first volume by naming convention.
    pub fn open_set(first_volume: impl AsRef<Path>) -> Result<Self> {
        let paths = crate::volume::discover_set(first_volume.as_ref())?;
        Self::open(&paths)
    }

    /// Returns the sizes of all volumes in order.
    pub fn volume_sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Returns the total logical size across all volumes.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Builds dispatcher descriptors for the volumes, reading each one's
    /// first 16 KiB.
    pub fn descriptors(&self) -> Result<Vec<VolumeDescriptor>> {
        self.paths
            .iter()
            .zip(self.sizes.iter())
            .map(|(path, &size)| {
                let mut file = File::open(path).map_err(Error::Io)?;
                let mut preview = vec![0u8; 16384.min(size as usize)];
                file.read_exact(&mut preview).map_err(Error::Io)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(VolumeDescriptor::with_preview(name, size, preview))
            })
            .collect()
    }

    /// Index of the volume containing the current position.
    fn current_volume(&self) -> usize {
        match self.starts.binary_search(&self.position) {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        }
    }

    fn handle(&mut self, index: usize) -> io::Result<&mut BufReader<File>> {
        if self.handles[index].is_none() {
            let file = File::open(&self.paths[index])?;
            self.handles[index] = Some(BufReader::new(file));
        }
        match self.handles[index].as_mut() {
            Some(handle) => Ok(handle),
            None => Err(io::Error::other("volume handle unavailable")),
        }
    }
}

impl Read for MultiVolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.total || buf.is_empty() {
            return Ok(0);
        }
        let vol_idx = self.current_volume();
        let in_vol = self.position - self.starts[vol_idx];
        let remaining = self.sizes[vol_idx] - in_vol;
        let want = (buf.len() as u64).min(remaining) as usize;

        let handle = self.handle(vol_idx)?;
        handle.seek(SeekFrom::Start(in_vol))?;
        let n = handle.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MultiVolumeReader {
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
