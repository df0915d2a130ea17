//! Engine Selfie
//!
//! A selfie is the frozen engine state persisted to bytes so the next
//! start can skip parsing and compiling the filter lists. The byte layout
//! is described in [`format`]; the payload is a serde document built from
//! the types in this module.

pub mod format;

use serde::{Deserialize, Serialize};

use crate::compiled::{CompiledFilter, CompiledLineError};
use crate::hash::crc32;
use crate::trie::TrieError;
use crate::types::{CategoryBits, FilterCounts};
use format::*;

/// Error type for selfie encoding and loading.
#[derive(Debug, thiserror::Error)]
pub enum SelfieError {
    #[error("Data too short")]
    DataTooShort,
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("Payload length mismatch: declared={declared}, actual={actual}")]
    PayloadLength { declared: usize, actual: usize },
    #[error("CRC32 mismatch: stored={stored}, computed={computed}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed trie: {0}")]
    Trie(#[from] TrieError),
    #[error("Malformed compiled line: {0}")]
    Line(#[from] CompiledLineError),
}

// =============================================================================
// Payload
// =============================================================================

/// Persisted form of a filter bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSelfie {
    pub filters: Vec<CompiledFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix1_trie: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hn_anchored_trie: Option<Vec<u8>>,
}

/// Persisted form of one token slot of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSelfie {
    #[serde(rename = "single")]
    Single(CompiledFilter),
    #[serde(rename = "pair")]
    Pair(CompiledFilter, CompiledFilter),
    #[serde(rename = "bucket")]
    Bucket(BucketSelfie),
    #[serde(rename = "hostnames")]
    HostnameDict(Vec<u8>),
}

/// Every token slot of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySelfie {
    pub bits: CategoryBits,
    pub slots: Vec<(u32, SlotSelfie)>,
}

/// One data-holding filter, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntrySelfie {
    pub bits: CategoryBits,
    pub token_hash: u32,
    pub filter: CompiledFilter,
}

/// Complete frozen engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSelfie {
    pub counts: FilterCounts,
    pub categories: Vec<CategorySelfie>,
    pub data_filters: Vec<DataEntrySelfie>,
    pub redirects: Vec<String>,
}

// =============================================================================
// Encoding
// =============================================================================

/// Serialize an engine selfie with header and checksum.
pub fn encode(selfie: &EngineSelfie) -> Result<Vec<u8>, SelfieError> {
    Ok(frame_payload(&serde_json::to_vec(selfie)?))
}

/// Prefix an already serialized payload with the header.
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&SELFIE_MAGIC);
    out.extend_from_slice(&SELFIE_VERSION.to_le_bytes());
    out.extend_from_slice(&header_flags::HAS_CRC32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate the header and checksum, then decode the payload.
pub fn decode(data: &[u8]) -> Result<EngineSelfie, SelfieError> {
    if data.len() < HEADER_SIZE {
        return Err(SelfieError::DataTooShort);
    }

    if !validate_magic(data) {
        return Err(SelfieError::InvalidMagic);
    }

    let version = read_u16_le(data, header::VERSION);
    if version != SELFIE_VERSION {
        return Err(SelfieError::UnsupportedVersion(version));
    }

    let flags = read_u16_le(data, header::FLAGS);
    let declared = read_u32_le(data, header::PAYLOAD_BYTES) as usize;
    let payload = &data[HEADER_SIZE..];
    if declared != payload.len() {
        return Err(SelfieError::PayloadLength {
            declared,
            actual: payload.len(),
        });
    }

    if flags & header_flags::HAS_CRC32 != 0 {
        let stored = read_u32_le(data, header::PAYLOAD_CRC32);
        let computed = crc32(payload);
        if stored != computed {
            return Err(SelfieError::Crc32Mismatch { stored, computed });
        }
    }

    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineSelfie {
        EngineSelfie {
            counts: FilterCounts {
                processed: 3,
                accepted: 2,
                rejected: 1,
                ..FilterCounts::default()
            },
            categories: vec![CategorySelfie {
                bits: CategoryBits(0),
                slots: vec![(42, SlotSelfie::Single(CompiledFilter::PlainHnAnchored("ads.com".to_string())))],
            }],
            data_filters: Vec::new(),
            redirects: vec!["*\tx.com\tscript\tx.com^\tnoopjs".to_string()],
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode(&sample()).unwrap();
        assert!(validate_magic(&bytes));
        assert_eq!(decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_rejects_corruption() {
        let mut bytes = encode(&sample()).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        assert!(matches!(decode(&bytes), Err(SelfieError::Crc32Mismatch { .. })));

        assert!(matches!(decode(b"SNF1"), Err(SelfieError::DataTooShort)));

        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(SelfieError::InvalidMagic)));

        let mut bytes = encode(&sample()).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(decode(&bytes), Err(SelfieError::PayloadLength { .. })));
    }

    #[test]
    fn test_valid_checksum_bad_payload() {
        let bytes = frame_payload(br#"{"counts":{},"categories":"#);
        assert!(matches!(decode(&bytes), Err(SelfieError::Json(_))));

        let payload = serde_json::to_string(&sample()).unwrap().replace("\"single\"", "\"triple\"");
        let bytes = frame_payload(payload.as_bytes());
        assert!(matches!(decode(&bytes), Err(SelfieError::Json(_))));
    }
}
