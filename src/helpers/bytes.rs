//! Little-endian integer and float decoding for the binary spreadsheet formats.
//! Callers always hand in slices of at least the decoded width.

/// Decodes `bytes` as consecutive little-endian u32 values widened to usize.
pub(crate) fn le_usize_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = usize> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
}

#[inline]
pub(crate) fn le_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes([s[0], s[1]])
}

#[inline]
pub(crate) fn le_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes([s[0], s[1], s[2], s[3]])
}

#[inline]
pub(crate) fn le_usize(s: &[u8]) -> usize {
    le_u32(s) as usize
}

#[inline]
pub(crate) fn le_u64(s: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&s[..8]);
    u64::from_le_bytes(raw)
}

#[inline]
pub(crate) fn le_f64(s: &[u8]) -> f64 {
    f64::from_bits(le_u64(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian() {
        assert_eq!(le_u16(&[0x34, 0x12]), 0x1234);
        assert_eq!(le_u32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(le_f64(&1.5f64.to_le_bytes()), 1.5);
        let values: Vec<usize> = le_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0]).collect();
        assert_eq!(values, vec![1, 2]);
    }
}
