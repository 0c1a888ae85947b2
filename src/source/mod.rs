//! Byte sources presenting multi-volume sets as one seekable stream.
//!
//! The parsers only require `std::io::Read + Seek`; the types here supply
//! that over the two common inputs: an ordered list of in-memory volume
//! buffers ([`ConcatReader`]) and a list of on-disk volume files
//! ([`MultiVolumeReader`]). Both track the per-volume sizes the RAR
//! parsers use for split inference.
//!
//! Forward-only buffered sources and HTTP byte-range sources can implement
//! the same traits externally; note that the 7z parser seeks backwards
//! (its metadata lives at the end of the stream) and therefore needs a
//! truly random-access source.

mod concat;
mod multifile;

pub use concat::ConcatReader;
pub use multifile::MultiVolumeReader;
