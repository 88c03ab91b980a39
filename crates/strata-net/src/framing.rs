//! Message framing for protocol streams
//!
//! Frames are a canonical unsigned varint length followed by that many
//! payload bytes.

use bytes::{Buf, Bytes, BytesMut};
use strata_core::varint;
use strata_core::VarintError;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: usize },
    #[error("Invalid length prefix: {0}")]
    Varint(#[from] VarintError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for varint length-prefixed frames
///
/// Wire format:
/// - 1 to 10 bytes: payload length as a canonical unsigned varint
/// - N bytes: payload
#[derive(Clone, Copy, Debug)]
pub struct VarintFrameCodec {
    max_frame_size: usize,
}

impl VarintFrameCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec rejecting frames over `max_frame_size` bytes
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check(&self, size: u64) -> Result<usize, FrameError> {
        match usize::try_from(size) {
            Ok(n) if n <= self.max_frame_size => Ok(n),
            _ => Err(FrameError::TooLarge {
                size,
                max: self.max_frame_size,
            }),
        }
    }
}

impl Default for VarintFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for VarintFrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Peek at the prefix
        let Some(prefix_len) = varint::size_of(&src[..]) else {
            if src.len() >= varint::MAX_LEN {
                return Err(VarintError::Overflow.into());
            }
            return Ok(None);
        };
        let (length, _) = varint::decode(&src[..prefix_len])?;
        let length = self.check(length)?;

        // Need full frame
        if src.len() < prefix_len + length {
            src.reserve(prefix_len + length - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for VarintFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        self.check(payload.len() as u64)?;

        dst.reserve(varint::encoded_len(payload.len() as u64) + payload.len());
        varint::encode_into(payload.len() as u64, dst);
        dst.extend_from_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = VarintFrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&b"hello"[..], &mut buf).unwrap();
        assert_eq!(&buf[..], b"\x05hello");

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frames_wait_for_more() {
        let mut codec = VarintFrameCodec::new();
        let payload = vec![9u8; 300];
        let mut encoded = BytesMut::new();
        codec.encode(&payload, &mut encoded).unwrap();
        assert_eq!(&encoded[..2], &[0xac, 0x02]);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded[..1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&encoded[1..100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&encoded[100..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().len(), 300);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = VarintFrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&b"one"[..], &mut buf).unwrap();
        codec.encode(&b""[..], &mut buf).unwrap();
        codec.encode(&b"three"[..], &mut buf).unwrap();

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"three");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frames_rejected() {
        let mut codec = VarintFrameCodec::with_max_frame_size(8);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(&[0u8; 9][..], &mut buf),
            Err(FrameError::TooLarge { size: 9, max: 8 })
        ));

        let mut incoming = BytesMut::from(&[0x09u8][..]);
        assert!(matches!(
            codec.decode(&mut incoming),
            Err(FrameError::TooLarge { size: 9, .. })
        ));
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let mut codec = VarintFrameCodec::new();
        let mut overflow = BytesMut::from(&[0x80u8; 12][..]);
        assert!(matches!(
            codec.decode(&mut overflow),
            Err(FrameError::Varint(VarintError::Overflow))
        ));

        let mut non_canonical = BytesMut::from(&[0x85u8, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut non_canonical),
            Err(FrameError::Varint(VarintError::NonCanonical))
        ));
    }
}
