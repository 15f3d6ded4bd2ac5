//! Checksum helpers for the metadata page.

/// Computes a CRC32 checksum for the given data.
///
/// # Example
///
/// ```rust
/// use strata_storage::page::compute_checksum;
///
/// let checksum = compute_checksum(b"Hello, Strata!");
/// assert_ne!(checksum, 0);
/// ```
#[inline]
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verifies that the checksum matches the data.
///
/// # Example
///
/// ```rust
/// use strata_storage::page::{compute_checksum, verify_checksum};
///
/// let data = b"Hello, Strata!";
/// let checksum = compute_checksum(data);
/// assert!(verify_checksum(data, checksum));
/// assert!(!verify_checksum(data, checksum + 1));
/// ```
#[inline]
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_bit_flip() {
        let mut data = vec![0x5Au8; 64];
        let checksum = compute_checksum(&data);
        data[17] ^= 0x01;
        assert!(!verify_checksum(&data, checksum));
    }
}
