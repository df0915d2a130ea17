//! Selfie Format v1 Constants
//!
//! All values are little-endian. A selfie is a fixed header followed by a
//! JSON payload describing the frozen engine.

/// Magic bytes: "SNF1"
pub const SELFIE_MAGIC: [u8; 4] = [0x53, 0x4E, 0x46, 0x31];

/// Current format version
pub const SELFIE_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

// =============================================================================
// Header Field Offsets
// =============================================================================

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "SNF1"
    pub const MAGIC: usize = 0;
    /// u16 version
    pub const VERSION: usize = 4;
    /// u16 flags
    pub const FLAGS: usize = 6;
    /// u32 payloadBytes
    pub const PAYLOAD_BYTES: usize = 8;
    /// u32 payloadCrc32
    pub const PAYLOAD_CRC32: usize = 12;
}

/// Header flags.
pub mod header_flags {
    /// Payload CRC32 is present and must be checked
    pub const HAS_CRC32: u16 = 1 << 0;
}

// =============================================================================
// Helpers
// =============================================================================

/// Validate magic bytes.
#[inline]
pub fn validate_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == SELFIE_MAGIC
}

/// Read u16 little-endian. Caller checks bounds.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Read u32 little-endian. Caller checks bounds.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
