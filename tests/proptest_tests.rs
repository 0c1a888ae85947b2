//! Property-based tests for the variable-length integer encodings and the
//! generate→parse round trips.

mod common;

use proptest::prelude::*;
use std::io::Cursor;
use volparse::format::reader::{
    read_variable_u64, read_vint, variable_u64_len, vint_len, write_variable_u64, write_vint,
};
use volparse::generate::{rar4, rar5, SourceFile};
use volparse::list_files_rar;

proptest! {
    /// RAR5 vint: decode(encode(v)) == v with minimal length.
    #[test]
    fn vint_round_trip(value in any::<u64>()) {
        let mut buf = Vec::new();
        let written = write_vint(&mut buf, value).unwrap();
        prop_assert_eq!(written, buf.len());
        prop_assert_eq!(written, vint_len(value));

        // Minimal encoding: the last byte never has the continuation bit,
        // and a shorter encoding could not hold the value.
        prop_assert_eq!(buf[written - 1] & 0x80, 0);
        if written > 1 {
            prop_assert!(value >= 1u64 << (7 * (written - 1)));
        }

        let (decoded, consumed) = read_vint(&mut Cursor::new(&buf)).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, written);
    }

    /// 7z variable u64: decode(encode(v)) == v, and the number of leading
    /// 1-bits seen on decode equals the extra-byte count chosen on encode.
    #[test]
    fn variable_u64_round_trip(value in any::<u64>()) {
        let mut buf = Vec::new();
        write_variable_u64(&mut buf, value).unwrap();
        prop_assert_eq!(buf.len(), variable_u64_len(value));

        let extra = buf.len() - 1;
        prop_assert_eq!(buf[0].leading_ones() as usize, extra.min(8));

        let decoded = read_variable_u64(&mut Cursor::new(&buf)).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Small values decode from their one-byte forms in both encodings.
    #[test]
    fn one_byte_values_agree(value in 0u64..0x80) {
        let mut vint = Vec::new();
        write_vint(&mut vint, value).unwrap();
        let mut var = Vec::new();
        write_variable_u64(&mut var, value).unwrap();
        prop_assert_eq!(&vint, &var);
        prop_assert_eq!(vint.len(), 1);
    }

    /// RAR4 generate→parse recovers the data for arbitrary sizes and
    /// two-way splits.
    #[test]
    fn rar4_split_round_trip(len in 2usize..2000, split_at in 1usize..1999) {
        prop_assume!(split_at < len);

        let data = common::scrambled(len);
        let chunks = vec![split_at as u64, (len - split_at) as u64];
        let volumes = rar4::build_volumes(&[SourceFile::split("f.bin", data.clone(), chunks)]);
        let stream = common::concat(&volumes);

        let entries = list_files_rar(&mut Cursor::new(stream.clone()), None, None).unwrap();
        prop_assert_eq!(entries.len(), 1);
        prop_assert_eq!(entries[0].uncompressed_size, len as u64);
        prop_assert_eq!(common::collect_parts(&stream, &entries[0].split_parts), data);
    }

    /// RAR5 generate→parse recovers the data for arbitrary sizes.
    #[test]
    fn rar5_single_round_trip(len in 1usize..3000) {
        let data = common::scrambled(len);
        let volumes = rar5::build_volumes(&[SourceFile::new("f.bin", data.clone())]);
        let stream = common::concat(&volumes);

        let entries = list_files_rar(&mut Cursor::new(stream.clone()), None, None).unwrap();
        prop_assert_eq!(entries.len(), 1);

        let start = entries[0].data_position as usize;
        prop_assert_eq!(&stream[start..start + len], &data[..]);
    }
}
