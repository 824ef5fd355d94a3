//! Variable-width integer encoding: a length byte followed by the
//! minimal number of magnitude bytes (plus, for signed values, a
//! leading sign byte), little-endian.
//!
//! `0` always encodes as a single `0x00` length byte with nothing
//! following it, for both signed and unsigned values.

use super::{ByteSink, ByteSource};

fn minimal_le_bytes(n: u64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let full = n.to_le_bytes();
    let len = 8 - (n.leading_zeros() as usize / 8);
    full[..len].to_vec()
}

/// Writes `n` as an unsigned varint: one length byte `L`, then `L`
/// little-endian magnitude bytes.
pub fn write_u64(w: &mut dyn ByteSink, n: u64) -> bool {
    let bytes = minimal_le_bytes(n);
    w.write_bytes(&[bytes.len() as u8]) && w.write_bytes(&bytes)
}

/// Reads a value written by [`write_u64`].
pub fn read_u64(r: &mut dyn ByteSource) -> Option<u64> {
    let len = r.read_bytes(1)?[0] as usize;
    let bytes = r.read_bytes(len)?;
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(&bytes);
    Some(u64::from_le_bytes(buf))
}

/// Writes `n` as a signed varint: one length byte `L` counting a sign
/// byte plus the magnitude bytes that follow it (so `L - 1` magnitude
/// bytes), then the sign byte (`0` for non-negative, `1` for negative),
/// then the little-endian magnitude.
pub fn write_i64(w: &mut dyn ByteSink, n: i64) -> bool {
    if n == 0 {
        return w.write_bytes(&[0]);
    }
    let sign: u8 = if n < 0 { 1 } else { 0 };
    let magnitude = n.unsigned_abs();
    let bytes = minimal_le_bytes(magnitude);
    let len = (bytes.len() + 1) as u8;
    w.write_bytes(&[len]) && w.write_bytes(&[sign]) && w.write_bytes(&bytes)
}

/// Reads a value written by [`write_i64`].
pub fn read_i64(r: &mut dyn ByteSource) -> Option<i64> {
    let len = r.read_bytes(1)?[0];
    if len == 0 {
        return Some(0);
    }
    let sign = r.read_bytes(1)?[0];
    let magnitude_len = (len - 1) as usize;
    let bytes = r.read_bytes(magnitude_len)?;
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(&bytes);
    let magnitude = u64::from_le_bytes(buf);
    Some(if sign == 0 {
        magnitude as i64
    } else {
        (magnitude as i64).wrapping_neg()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{ByteReader, ByteWriter};

    #[test]
    fn zero_is_a_single_byte() {
        let mut w = ByteWriter::new();
        assert!(write_u64(&mut w, 0));
        assert_eq!(w.into_bytes(), vec![0]);

        let mut w = ByteWriter::new();
        assert!(write_i64(&mut w, 0));
        assert_eq!(w.into_bytes(), vec![0]);
    }

    #[quickcheck_macros::quickcheck]
    fn unsigned_round_trips(n: u64) -> bool {
        let mut w = ByteWriter::new();
        write_u64(&mut w, n);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        read_u64(&mut r) == Some(n)
    }

    #[quickcheck_macros::quickcheck]
    fn signed_round_trips(n: i64) -> bool {
        let mut w = ByteWriter::new();
        write_i64(&mut w, n);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        read_i64(&mut r) == Some(n)
    }

    #[test]
    fn min_value_round_trips() {
        let mut w = ByteWriter::new();
        write_i64(&mut w, i64::MIN);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(read_i64(&mut r), Some(i64::MIN));
    }
}
