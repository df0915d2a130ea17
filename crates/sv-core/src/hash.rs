//! Hash functions for Sieve
//!
//! Tokens are keyed by a 32-bit Murmur3 hash. Zero is reserved as the
//! end-of-tokens sentinel, so a token hash is never zero.

/// Seed used for token hashing.
const TOKEN_SEED: u32 = 0x811c9dc5;

/// Token hash of filters without any usable token. These are tested
/// against every request.
pub const NO_TOKEN_HASH: u32 = token_hash("*");

/// Token hash reserved for pure-hostname filters, stored in a hostname
/// dictionary and tested against the request hostname.
pub const DOT_TOKEN_HASH: u32 = token_hash(".");

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical token lengths).
#[inline]
pub const fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2;
    while i < chunks {
        let k = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);

        i += 4;
    }

    // Process remaining bytes
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Compute the hash of a token string.
/// Ensures result is never 0 (sentinel value).
#[inline]
pub const fn token_hash(token: &str) -> u32 {
    let h = murmur3_32(token.as_bytes(), TOKEN_SEED);
    if h == 0 {
        1
    } else {
        h
    }
}

/// Compute CRC32 for selfie integrity checking.
/// Uses the standard CRC32 polynomial (IEEE 802.3).
pub fn crc32(data: &[u8]) -> u32 {
    static CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 {
                    0xedb88320 ^ (c >> 1)
                } else {
                    c >> 1
                };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    let mut crc = 0xffffffff_u32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc ^ 0xffffffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_different_strings() {
        let h1 = murmur3_32(b"example.com", 0);
        let h2 = murmur3_32(b"example.org", 0);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_murmur3_different_seeds() {
        let h1 = murmur3_32(b"example.com", 0);
        let h2 = murmur3_32(b"example.com", 1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_reserved_token_hashes() {
        assert_ne!(NO_TOKEN_HASH, 0);
        assert_ne!(DOT_TOKEN_HASH, 0);
        assert_ne!(NO_TOKEN_HASH, DOT_TOKEN_HASH);
        assert_eq!(NO_TOKEN_HASH, token_hash("*"));
    }

    #[test]
    fn test_token_hash_consistent() {
        assert_eq!(token_hash("ads"), token_hash("ads"));
        assert_ne!(token_hash("ads"), token_hash("adv"));
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xcbf43926);
    }

    #[test]
    fn test_crc32_detects_changes() {
        assert_ne!(crc32(&[1u8, 2, 3]), crc32(&[1u8, 2, 4]));
    }
}
