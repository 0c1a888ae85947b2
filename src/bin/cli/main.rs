//! Volume-set validator.
//!
//! Takes the path to the first volume of an archive set, parses the whole
//! set, and validates every entry's reported coordinates against the
//! volume bytes. Prints one `PASS|FAIL|SKIP` line per file and a summary;
//! exits 0 only when nothing failed.

mod output;

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use volparse::{list_files, FileEntry, MultiVolumeReader, RarEntry, SevenZipEntry};

use output::{print_line, print_summary, Verdict};

/// Validate the metadata of a multi-volume archive set
#[derive(Parser)]
#[command(name = "volparse")]
#[command(author, version, about = "Validate the metadata of a multi-volume archive set")]
struct Cli {
    /// Path to the first volume of the set
    first_volume: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("volparse: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> volparse::Result<bool> {
    let mut reader = MultiVolumeReader::open_set(&cli.first_volume)?;
    let descriptors = reader.descriptors()?;
    let par2_bytes = sibling_par2(&cli.first_volume)?;

    let entries = list_files(&mut reader, &descriptors, par2_bytes.as_deref())?;
    let total_size = reader.total_size();

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    for entry in &entries {
        let verdict = match entry {
            FileEntry::Rar(rar) => validate_rar(&mut reader, rar, total_size),
            FileEntry::SevenZip(sz) => validate_7z(&mut reader, sz, total_size),
        };
        match verdict {
            Verdict::Pass => passed += 1,
            Verdict::Fail(_) => failed += 1,
            Verdict::Skip(_) => skipped += 1,
        }
        print_line(entry.path(), &verdict);
    }

    print_summary(passed, failed, skipped);
    Ok(failed == 0)
}

/// Loads `<first-volume-stem>.par2` if it exists next to the volume.
fn sibling_par2(first_volume: &std::path::Path) -> volparse::Result<Option<Vec<u8>>> {
    let candidate = first_volume.with_extension("par2");
    if candidate.exists() {
        Ok(Some(std::fs::read(candidate)?))
    } else {
        Ok(None)
    }
}

/// Validates a RAR entry's coordinates; store-mode data is CRC-checked.
fn validate_rar(reader: &mut MultiVolumeReader, entry: &RarEntry, total_size: u64) -> Verdict {
    if entry.is_directory {
        return Verdict::Skip("directory");
    }

    let parts: Vec<(u64, u64)> = if entry.split_parts.is_empty() {
        vec![(entry.data_position, entry.compressed_size)]
    } else {
        entry
            .split_parts
            .iter()
            .map(|p| (p.data_start, p.data_size))
            .collect()
    };

    for window in parts.windows(2) {
        if window[0].0 + window[0].1 > window[1].0 {
            return Verdict::Fail("split parts overlap");
        }
    }
    for &(start, size) in &parts {
        match start.checked_add(size) {
            Some(end) if end <= total_size => {}
            _ => return Verdict::Fail("data range out of bounds"),
        }
    }

    if entry.compression_method != 0 {
        return Verdict::Skip("compressed entry");
    }

    let stored: u64 = parts.iter().map(|&(_, size)| size).sum();
    if stored != entry.uncompressed_size {
        return Verdict::Fail("stored bytes do not cover the file");
    }

    match entry.crc32 {
        Some(expected) => match crc_of_parts(reader, &parts) {
            Ok(actual) if actual == expected => Verdict::Pass,
            Ok(_) => Verdict::Fail("content CRC mismatch"),
            Err(_) => Verdict::Fail("unreadable data range"),
        },
        None => Verdict::Pass,
    }
}

/// Validates a 7z entry; Copy-coded data is CRC-checked.
fn validate_7z(reader: &mut MultiVolumeReader, entry: &SevenZipEntry, total_size: u64) -> Verdict {
    if entry.is_directory {
        return Verdict::Skip("directory");
    }
    if entry.size == 0 {
        return Verdict::Pass;
    }
    match entry.data_offset.checked_add(entry.size) {
        Some(end) if end <= total_size => {}
        _ => return Verdict::Fail("data range out of bounds"),
    }

    match entry.crc32 {
        Some(expected) => match crc_of_parts(reader, &[(entry.data_offset, entry.size)]) {
            Ok(actual) if actual == expected => Verdict::Pass,
            Ok(_) => Verdict::Fail("content CRC mismatch"),
            Err(_) => Verdict::Fail("unreadable data range"),
        },
        None => Verdict::Pass,
    }
}

/// CRC32 over the concatenation of the given `(start, size)` ranges.
fn crc_of_parts(
    reader: &mut MultiVolumeReader,
    parts: &[(u64, u64)],
) -> std::io::Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];

    for &(start, size) in parts {
        reader.seek(SeekFrom::Start(start))?;
        let mut remaining = size;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let got = reader.read(&mut buf[..want])?;
            if got == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "data range truncated",
                ));
            }
            hasher.update(&buf[..got]);
            remaining -= got as u64;
        }
    }

    Ok(hasher.finalize())
}
