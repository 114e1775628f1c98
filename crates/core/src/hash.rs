//! Rolling hash used to guard records against accidental corruption.
//!
//! This is a rotate-xor accumulator, not a cryptographic hash. Anyone who
//! edits a record can recompute the code, so it only detects accidental
//! overwrites (a crash between writes, another record stomping on the same
//! bytes, a worn cell).

use bytemuck::NoUninit;

/// Hash code stored in front of every hash-guarded record.
pub type HashCode = u32;

/// Width of a stored [`HashCode`] in bytes.
pub const HASH_SIZE: usize = core::mem::size_of::<HashCode>();

/// Hash a byte sequence.
///
/// Seeded with the length, then each byte is folded in after rotating the
/// accumulator left by 5. An empty slice hashes to 0.
pub fn hash(data: &[u8]) -> HashCode {
    let mut value = data.len() as HashCode;
    for &b in data {
        value = ((value << 5) ^ (value >> 27)) ^ b as HashCode;
    }
    value
}

/// Hash the in-memory byte representation of `object`.
pub fn hash_object<T: NoUninit>(object: &T) -> HashCode {
    hash(bytemuck::bytes_of(object))
}

/// Bytes occupied by a hash-guarded record with an `n`-byte payload.
pub const fn hashed_len(n: usize) -> usize {
    HASH_SIZE + n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(hash(&[]), 0);
    }

    #[test]
    fn test_known_values() {
        // seed 1: (1 << 5) ^ 0 ^ 0xAB
        assert_eq!(hash(&[0xAB]), 0x20 ^ 0xAB);
        // seed 2 -> 0x40 ^ 1 = 0x41 -> (0x41 << 5) ^ 2 = 0x822
        assert_eq!(hash(&[0x01, 0x02]), 0x822);
        // Length is part of the seed.
        assert_ne!(hash(&[0]), hash(&[0, 0]));
    }

    #[test]
    fn test_rotation_wraps() {
        // A long run pushes bits through the top of the word; the rotate must
        // bring them back rather than shift them out.
        let data = [0xFFu8; 64];
        let mut expected: u32 = 64;
        for _ in 0..64 {
            expected = expected.rotate_left(5) ^ 0xFF;
        }
        assert_eq!(hash(&data), expected);
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(hash(&[1, 2, 3]), hash(&[3, 2, 1]));
        assert_eq!(hash(&[1, 2, 3]), hash(&[1, 2, 3]));
    }

    #[test]
    fn test_hash_object_matches_bytes() {
        let v: u32 = 0x1234_5678;
        assert_eq!(hash_object(&v), hash(&v.to_ne_bytes()));
    }

    #[test]
    fn test_hashed_len() {
        assert_eq!(hashed_len(4), 8);
        assert_eq!(hashed_len(0), HASH_SIZE);
    }
}
