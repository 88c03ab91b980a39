//! Wire vectors for cross-implementation validation
//!
//! Peers written against other codebases must produce these bytes exactly.

use crate::address::AddressStack;
use crate::varint::{decode, encode, UVarint};
use multiaddr::Multiaddr;
use serde::Serialize;

/// Test vector output format (JSON serializable)
#[derive(Serialize)]
pub struct TestVector {
    pub name: String,
    pub description: String,
    pub inputs: serde_json::Value,
    pub encoded_hex: String,
}

/// Generate all test vectors
pub fn generate_test_vectors() -> Vec<TestVector> {
    let mut vectors: Vec<TestVector> = VARINTS.iter().map(|&(v, h)| varint_vector(v, h)).collect();
    vectors.extend(ADDRESSES.iter().map(|&(a, h)| address_vector(a, h)));
    vectors
}

const VARINTS: &[(u64, &str)] = &[
    (0, "00"),
    (1, "01"),
    (127, "7f"),
    (128, "8001"),
    (255, "ff01"),
    (300, "ac02"),
    (16_384, "808001"),
    (u32::MAX as u64, "ffffffff0f"),
    (u64::MAX, "ffffffffffffffffff01"),
];

const ADDRESSES: &[(&str, &str)] = &[
    ("/ip4/127.0.0.1/tcp/1234", "047f0000010604d2"),
    ("/ip4/127.0.0.1/tcp/40010/ws", "047f000001069c4add03"),
    ("/dns4/example.com/tcp/443/wss", "360b6578616d706c652e636f6d0601bbde03"),
];

fn varint_vector(value: u64, expected_hex: &str) -> TestVector {
    TestVector {
        name: format!("uvarint_{value}"),
        description: "Unsigned LEB128, minimal length".into(),
        inputs: serde_json::json!({ "value": value }),
        encoded_hex: expected_hex.into(),
    }
}

fn address_vector(text: &str, expected_hex: &str) -> TestVector {
    TestVector {
        name: format!("multiaddr_{}", text.trim_start_matches('/').replace('/', "_")),
        description: "Binary multiaddr for a transport address".into(),
        inputs: serde_json::json!({ "address": text }),
        encoded_hex: expected_hex.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_vectors() {
        let vectors = generate_test_vectors();
        assert_eq!(vectors.len(), VARINTS.len() + ADDRESSES.len());

        let json = serde_json::to_string_pretty(&vectors).unwrap();
        println!("Test Vectors:\n{}", json);
    }

    #[test]
    fn test_varint_vectors_match() {
        for &(value, expected) in VARINTS {
            assert_eq!(hex::encode(encode(value)), expected, "value {value}");
            let bytes = hex::decode(expected).unwrap();
            assert_eq!(decode(&bytes).unwrap(), (value, bytes.len()));
            assert_eq!(UVarint::from_bytes(&bytes).unwrap().to_u64(), value);
        }
    }

    #[test]
    fn test_address_vectors_match() {
        for &(text, expected) in ADDRESSES {
            let address: Multiaddr = text.parse().unwrap();
            assert_eq!(hex::encode(address.to_vec()), expected, "{text}");
            assert!(AddressStack::can_handle(&address));

            let decoded = Multiaddr::try_from(hex::decode(expected).unwrap()).unwrap();
            assert_eq!(decoded.to_string(), text);
        }
    }
}
