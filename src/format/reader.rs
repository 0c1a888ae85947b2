//! Low-level binary reading utilities shared by the format parsers.
//!
//! Two distinct variable-length integer encodings live here and must not be
//! confused:
//!
//! - the 7z variable u64, where the first byte's leading 1-bits count the
//!   number of additional little-endian bytes;
//! - the RAR5 vint, a little-endian 7-bits-per-byte varint with high-bit
//!   continuation.

use std::io::{self, Read};

/// Reads a variable-length encoded u64 from a reader (7z encoding).
///
/// The first byte's high bits indicate the number of additional bytes:
///
/// - `0xxxxxxx` (1 byte): value 0-127
/// - `10xxxxxx` + 1 byte: value 0-16383
/// - `110xxxxx` + 2 bytes: value 0-2097151
/// - And so on...
/// - `11111111` + 8 bytes: full u64
///
/// The remaining bits of the first byte form the high-order part of the
/// value at shift `8 * extra`; the additional bytes fill the low bits.
///
/// # Errors
///
/// Returns an error if the reader encounters EOF or an I/O error.
pub fn read_variable_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut first = [0u8; 1];
    r.read_exact(&mut first)?;
    let first = first[0] as u64;

    let mut mask = 0x80u64;
    let mut value = 0u64;

    for i in 0..8 {
        if (first & mask) == 0 {
            return Ok(value | ((first & (mask - 1)) << (8 * i)));
        }
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        value |= (byte[0] as u64) << (8 * i);
        mask >>= 1;
    }

    // All 8 marker bits set, value is entirely in the following 8 bytes
    Ok(value)
}

/// Writes a variable-length encoded u64 to a writer (7z encoding).
///
/// This is the inverse of [`read_variable_u64`] and always emits the
/// minimal encoding for the value.
pub fn write_variable_u64<W: io::Write>(w: &mut W, value: u64) -> io::Result<()> {
    if value < 0x80 {
        return w.write_all(&[value as u8]);
    }

    // Find the smallest number of extra bytes whose low bits, together with
    // the bits left in the first byte, can hold the value.
    let mut extra = 1usize;
    while extra < 8 {
        let first_bits = 7 - extra as u32;
        if value < 1u64 << (8 * extra as u32 + first_bits) {
            break;
        }
        extra += 1;
    }

    let mut buf = [0u8; 9];
    if extra == 8 {
        buf[0] = 0xFF;
    } else {
        let marker = !((1u16 << (8 - extra)) - 1) as u8;
        let high = (value >> (8 * extra)) as u8;
        buf[0] = marker | high;
    }
    for (i, slot) in buf[1..=extra].iter_mut().enumerate() {
        *slot = (value >> (8 * i)) as u8;
    }
    w.write_all(&buf[..=extra])
}

/// Returns the number of bytes [`write_variable_u64`] emits for `value`.
pub fn variable_u64_len(value: u64) -> usize {
    let mut extra = 0usize;
    while extra < 8 {
        let first_bits = 7 - extra as u32;
        if value < 1u64 << (8 * extra as u32 + first_bits) {
            break;
        }
        extra += 1;
    }
    extra + 1
}

/// Maximum bytes in a RAR5 vint encoding a u64.
const VINT_MAX_BYTES: usize = 10;

/// Reads a RAR5 variable-length integer from a reader.
///
/// Each byte contributes 7 bits little-endian; the high bit (`0x80`) marks
/// continuation. Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// Returns `InvalidData` if the encoding exceeds 10 bytes, or the
/// underlying I/O error (including `UnexpectedEof` mid-vint).
pub fn read_vint<R: Read>(r: &mut R) -> io::Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for i in 0..VINT_MAX_BYTES {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        result |= u64::from(byte[0] & 0x7F) << shift;

        if byte[0] & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "vint longer than 10 bytes",
    ))
}

/// Writes a RAR5 variable-length integer, returning the bytes written.
///
/// This is the inverse of [`read_vint`] and always emits the minimal
/// encoding for the value.
pub fn write_vint<W: io::Write>(w: &mut W, mut value: u64) -> io::Result<usize> {
    let mut buf = [0u8; VINT_MAX_BYTES];
    let mut len = 0usize;

    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf[len] = byte;
        len += 1;
        if value == 0 {
            break;
        }
    }

    w.write_all(&buf[..len])?;
    Ok(len)
}

/// Returns the number of bytes [`write_vint`] emits for `value`.
pub fn vint_len(value: u64) -> usize {
    let mut len = 1usize;
    let mut v = value >> 7;
    while v != 0 {
        len += 1;
        v >>= 7;
    }
    len
}

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads an unsigned 16-bit little-endian integer.
pub fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a boolean vector (bit array) of the specified length.
///
/// Each bit in the input bytes represents one boolean value; bits are read
/// from MSB to LSB within each byte.
pub fn read_bool_vector<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    let byte_count = count.div_ceil(8);
    let mut bytes = vec![0u8; byte_count];
    r.read_exact(&mut bytes)?;

    let mut result = Vec::with_capacity(count);
    for i in 0..count {
        let byte_idx = i / 8;
        let bit_idx = 7 - (i % 8);
        result.push((bytes[byte_idx] >> bit_idx) & 1 != 0);
    }

    Ok(result)
}

/// Reads either an all-true vector or a bit vector based on a marker byte.
///
/// If the first byte is non-zero, returns a vector of all `true` values.
/// Otherwise, reads a bit vector from the remaining bytes. Used for
/// optional property presence markers in 7z headers.
pub fn read_all_or_bits<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    let all_defined = read_u8(r)?;
    if all_defined != 0 {
        Ok(vec![true; count])
    } else {
        read_bool_vector(r, count)
    }
}

/// Reads until `buf` is full or the stream ends, returning the bytes read.
///
/// Unlike `read_exact`, a short read at end-of-stream is not an error; the
/// caller inspects the count.
pub(crate) fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Scans for the next volume's signature after an end-of-archive marker.
///
/// Volumes may be zero-padded: whole windows of zeros are skipped, and a
/// signature whose start straddles a window (a strict signature prefix
/// preceded by at least one zero byte) is completed and verified with an
/// extra read. Returns the total bytes consumed through the end of the
/// signature, or `None` when the stream ends or the bytes are not a
/// signature.
pub(crate) fn resync_volume_signature<R: Read>(
    r: &mut R,
    signature: &[u8],
) -> io::Result<Option<u64>> {
    let n = signature.len();
    let mut consumed = 0u64;
    let mut probe = vec![0u8; n];

    loop {
        let got = read_full(r, &mut probe)?;
        if got < n {
            return Ok(None);
        }
        consumed += n as u64;

        if probe == signature {
            return Ok(Some(consumed));
        }
        if probe.iter().all(|&b| b == 0) {
            continue;
        }

        let zeros = probe.iter().take_while(|&&b| b == 0).count();
        if zeros > 0 && zeros < n && probe[zeros..] == signature[..n - zeros] {
            let mut rest = vec![0u8; zeros];
            let got = read_full(r, &mut rest)?;
            if got == zeros && rest == signature[n - zeros..] {
                consumed += zeros as u64;
                return Ok(Some(consumed));
            }
        }

        return Ok(None);
    }
}

/// Writes a boolean vector as a bit array (MSB first within each byte).
pub fn write_bool_vector<W: io::Write>(w: &mut W, bits: &[bool]) -> io::Result<()> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    w.write_all(&bytes)
}
