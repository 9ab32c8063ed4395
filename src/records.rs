//! Bit-exact binary record layouts for each packet kind. Little-endian, no padding.
//! Decoding into typed packet views is out of scope; these constants and
//! length checks exist so other modules (and their tests) can verify
//! alignment without duplicating the magic numbers.

/// One DVS (address-event) record: 13 bytes.
pub const DVS_WORD_SIZE: usize = 13;
/// One IMU record: 48 bytes.
pub const IMU_WORD_SIZE: usize = 48;
/// One APS (frame) record's fixed header, before the `2 * width * height`
/// pixel payload.
pub const APS_HEADER_SIZE: usize = 56;
/// Opaque ("other") files have no record structure: word size 1.
pub const OTHER_WORD_SIZE: usize = 1;

/// The record stride for an APS frame of the given dimensions.
pub fn aps_word_size(width: u32, height: u32) -> usize {
    APS_HEADER_SIZE + 2 * (width as usize) * (height as usize)
}

/// `true` iff `len` is a whole number of `word_size`-byte records.
pub fn is_word_aligned(len: usize, word_size: usize) -> bool {
    word_size != 0 && len % word_size == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aps_word_size_matches_header_plus_pixels() {
        assert_eq!(aps_word_size(4, 4), 56 + 2 * 16);
    }

    #[test]
    fn alignment_checks() {
        assert!(is_word_aligned(DVS_WORD_SIZE * 3, DVS_WORD_SIZE));
        assert!(!is_word_aligned(DVS_WORD_SIZE * 3 + 1, DVS_WORD_SIZE));
        assert!(is_word_aligned(0, IMU_WORD_SIZE));
    }
}
