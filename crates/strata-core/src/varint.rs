//! Canonical unsigned varint encoding
//!
//! Unsigned LEB128 restricted to `u64`:
//! - Seven payload bits per byte, least significant group first
//! - High bit set on every byte except the last
//! - Minimal length only, so each value has exactly one encoding
//! - At most 10 bytes; the 10th byte may carry only the single remaining bit

use crate::error::VarintError;
use bytes::BufMut;

/// Maximum encoded length of a `u64`
pub const MAX_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = (u64::BITS - value.leading_zeros()) as usize;
    bits.max(1).div_ceil(7)
}

/// Append the encoding of `value` to `dst`.
pub fn encode_into<B: BufMut>(mut value: u64, dst: &mut B) {
    while value >= u64::from(CONTINUATION) {
        dst.put_u8((value as u8 & PAYLOAD) | CONTINUATION);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Encode `value` into a fresh buffer.
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode_into(value, &mut out);
    out
}

/// Decode a varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed. Bytes after the
/// terminating byte are left untouched.
pub fn decode(src: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().enumerate() {
        // Nine groups hold 63 bits; the last group has room for one more.
        if i == MAX_LEN - 1 && byte > 1 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(byte & PAYLOAD) << (7 * i);
        if byte & CONTINUATION == 0 {
            if byte == 0 && i > 0 {
                return Err(VarintError::NonCanonical);
            }
            return Ok((value, i + 1));
        }
    }
    Err(VarintError::Incomplete)
}

/// Length of the varint at the front of `src`, without decoding it.
///
/// Scans only up to the first byte with the continuation bit clear. Returns
/// `None` when no terminating byte is found within [`MAX_LEN`] bytes.
pub fn size_of(src: &[u8]) -> Option<usize> {
    src.iter()
        .take(MAX_LEN)
        .position(|byte| byte & CONTINUATION == 0)
        .map(|i| i + 1)
}

/// An encoded varint together with its value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UVarint {
    value: u64,
    bytes: [u8; MAX_LEN],
    len: u8,
}

impl UVarint {
    /// Encode a value
    pub fn new(value: u64) -> Self {
        let mut bytes = [0u8; MAX_LEN];
        let len = {
            let mut dst = &mut bytes[..];
            encode_into(value, &mut dst);
            MAX_LEN - dst.len()
        };
        Self {
            value,
            bytes,
            len: len as u8,
        }
    }

    /// Decode the varint at the front of `src`, ignoring trailing bytes
    pub fn from_bytes(src: &[u8]) -> Result<Self, VarintError> {
        let (value, _) = decode(src)?;
        Ok(Self::new(value))
    }

    /// Decoded value
    pub fn to_u64(&self) -> u64 {
        self.value
    }

    /// Canonical encoding
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; the shortest encoding is one byte
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl From<u64> for UVarint {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for UVarint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UVarint({} = {:02x?})", self.value, self.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_literal_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(255), vec![0xff, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(16384), vec![0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_limits_roundtrip() {
        for value in [u64::MIN, u64::MAX] {
            let bytes = encode(value);
            assert_eq!(decode(&bytes).unwrap(), (value, bytes.len()));
        }
        assert_eq!(encode(u64::MAX).len(), MAX_LEN);
    }

    #[test]
    fn test_powers_of_two_roundtrip() {
        let mut value = 2u64;
        while value < u64::MAX / 2 {
            let var = UVarint::new(value);
            assert_eq!(var.to_u64(), value);
            assert_eq!(UVarint::from_bytes(var.as_bytes()).unwrap(), var);
            value *= 2;
        }
    }

    #[test]
    fn test_random_values_are_minimal() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let value: u64 = rng.gen::<u64>() >> rng.gen_range(0..64u32);
            let bytes = encode(value);
            assert_eq!(bytes.len(), encoded_len(value));
            assert_eq!(decode(&bytes).unwrap(), (value, bytes.len()));
            // Minimal: the final byte is zero only when the value is zero
            assert!(value == 0 || *bytes.last().unwrap() != 0);
        }
    }

    #[test]
    fn test_overflow_rejected() {
        let mut bytes = vec![0x80; 9];
        bytes.push(0x02);
        assert_eq!(decode(&bytes), Err(VarintError::Overflow));
        assert_eq!(UVarint::from_bytes(&bytes), Err(VarintError::Overflow));
    }

    #[test]
    fn test_overflow_boundary() {
        // 2^64 - 1 is the last value that fits
        let mut max = vec![0xff; 9];
        max.push(0x01);
        assert_eq!(decode(&max).unwrap(), (u64::MAX, MAX_LEN));

        // The 10th byte may not continue
        let mut endless = vec![0xff; 9];
        endless.push(0x81);
        endless.push(0x00);
        assert_eq!(decode(&endless), Err(VarintError::Overflow));

        // Eleven or more continuation bytes never terminate in range
        assert_eq!(decode(&[0x80; 16]), Err(VarintError::Overflow));
    }

    #[test]
    fn test_incomplete_and_noncanonical() {
        assert_eq!(decode(&[]), Err(VarintError::Incomplete));
        assert_eq!(decode(&[0x80, 0x80]), Err(VarintError::Incomplete));
        assert_eq!(decode(&[0x80, 0x00]), Err(VarintError::NonCanonical));
        assert_eq!(decode(&[0x81, 0x80, 0x00]), Err(VarintError::NonCanonical));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode(&[0xac, 0x02, 0xff, 0xff]).unwrap(), (300, 2));
    }

    #[test]
    fn test_size_of() {
        assert_eq!(size_of(&[0x81, 0xa3, 0x75, 0x43, 0xaa]), Some(3));
        assert_eq!(size_of(&[0x71, 0xa3, 0x75, 0x43, 0xaa]), Some(1));
        assert_eq!(size_of(&[0x80, 0x80]), None);
        assert_eq!(size_of(&[]), None);
        assert_eq!(size_of(&[0x80; 12]), None);
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = bytes::BytesMut::from(&b"ab"[..]);
        encode_into(300, &mut buf);
        assert_eq!(&buf[..], &[b'a', b'b', 0xac, 0x02]);
    }
}
