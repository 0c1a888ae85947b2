//! Multi-volume behavior: dispatcher stability, on-disk volume sets, and
//! discovery by naming convention.

mod common;

use common::{collect_parts, concat, descriptors, scrambled, sizes};
use std::fs::File;
use std::io::{Cursor, Write};
use volparse::generate::{even_chunks, rar4, rar5, SourceFile};
use volparse::{list_files, list_files_rar, ConcatReader, FileEntry, MultiVolumeReader};

/// Entries are identical whether or not per-volume sizes (and therefore
/// split inference) are available.
#[test]
fn dispatcher_stability_rar4() {
    let files = [
        SourceFile::split("bigfile", scrambled(500), vec![200, 200, 100]),
        SourceFile::new("tail.bin", scrambled(40)),
    ];
    let volumes = rar4::build_volumes(&files);
    let stream = concat(&volumes);

    let without = list_files_rar(&mut Cursor::new(stream.clone()), None, None).unwrap();
    let with =
        list_files_rar(&mut Cursor::new(stream), None, Some(&sizes(&volumes))).unwrap();
    assert_eq!(without, with);
}

#[test]
fn dispatcher_stability_rar5() {
    let files = [
        SourceFile::split("bigfile", scrambled(500), even_chunks(500, 3)),
        SourceFile::new("tail.bin", scrambled(40)),
    ];
    let volumes = rar5::build_volumes(&files);
    let stream = concat(&volumes);

    let without = list_files_rar(&mut Cursor::new(stream.clone()), None, None).unwrap();
    let with =
        list_files_rar(&mut Cursor::new(stream), None, Some(&sizes(&volumes))).unwrap();
    assert_eq!(without, with);
}

#[test]
fn dispatcher_list_files_full_set() {
    let data = scrambled(300);
    let files = [SourceFile::split("payload", data.clone(), vec![100, 100, 100])];
    let volumes = rar4::build_volumes(&files);
    let names = ["a.part1.rar", "a.part2.rar", "a.part3.rar"];
    let descs = descriptors(&volumes, &names);

    let stream = concat(&volumes);
    let entries = list_files(&mut Cursor::new(stream.clone()), &descs, None).unwrap();
    assert_eq!(entries.len(), 1);

    match &entries[0] {
        FileEntry::Rar(entry) => {
            assert_eq!(entry.split_parts.len(), 3);
            assert_eq!(collect_parts(&stream, &entry.split_parts), data);
        }
        other => panic!("expected a RAR entry, got {:?}", other),
    }
}

#[test]
fn concat_reader_matches_plain_cursor() {
    let files = [SourceFile::split("payload", scrambled(256), vec![128, 128])];
    let volumes = rar5::build_volumes(&files);

    let mut reader = ConcatReader::new(volumes.clone());
    let via_concat_reader =
        list_files_rar(&mut reader, None, Some(&sizes(&volumes))).unwrap();

    let via_cursor =
        list_files_rar(&mut Cursor::new(concat(&volumes)), None, None).unwrap();
    assert_eq!(via_concat_reader, via_cursor);
}

#[test]
fn on_disk_volume_set_discovery_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    let data = scrambled(450);
    let files = [SourceFile::split("payload.bin", data.clone(), vec![150, 150, 150])];
    let volumes = rar4::build_volumes(&files);

    for (i, vol) in volumes.iter().enumerate() {
        let path = dir.path().join(format!("set.part{}.rar", i + 1));
        File::create(path).unwrap().write_all(vol).unwrap();
    }

    let mut reader = MultiVolumeReader::open_set(dir.path().join("set.part1.rar")).unwrap();
    assert_eq!(reader.volume_sizes().len(), 3);

    let descs = reader.descriptors().unwrap();
    assert_eq!(descs[0].filename, "set.part1.rar");

    let entries = list_files(&mut reader, &descs, None).unwrap();
    assert_eq!(entries.len(), 1);
    match &entries[0] {
        FileEntry::Rar(entry) => {
            assert_eq!(entry.uncompressed_size, 450);
            assert_eq!(entry.split_parts.len(), 3);
        }
        other => panic!("expected a RAR entry, got {:?}", other),
    }
}

#[test]
fn monotonic_parts_across_formats() {
    let rar4_volumes = rar4::build_volumes(&[SourceFile::split(
        "a",
        scrambled(900),
        vec![300, 300, 300],
    )]);
    let rar5_volumes = rar5::build_volumes(&[SourceFile::split(
        "a",
        scrambled(900),
        vec![300, 300, 300],
    )]);

    for volumes in [rar4_volumes, rar5_volumes] {
        let entries =
            list_files_rar(&mut Cursor::new(concat(&volumes)), None, None).unwrap();
        for entry in &entries {
            for pair in entry.split_parts.windows(2) {
                assert!(pair[0].data_start + pair[0].data_size <= pair[1].data_start);
                assert!(pair[0].volume_index <= pair[1].volume_index);
            }
        }
    }
}
