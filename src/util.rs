/// Compile-time assertion.
#[macro_export]
macro_rules! static_assert {
    ($condition:expr) => {
        const _: () = core::assert!($condition);
    };
}

/// Returns the sub-slice `[offset, offset + len)`, or `None` if the range
/// overflows or runs past the end of `data`.
#[inline]
pub fn window(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    data.get(offset..end)
}

/// Strips trailing NUL padding from a fixed-width field.
#[inline]
pub fn trim_nul(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(window(&data, 1, 2), Some(&data[1..3]));
        assert_eq!(window(&data, 4, 0), Some(&data[4..]));
        assert_eq!(window(&data, 3, 2), None);
        assert_eq!(window(&data, usize::MAX, 2), None);
    }

    #[test]
    fn trim_nul_padding() {
        assert_eq!(trim_nul(b"abc\0\0\0"), b"abc");
        assert_eq!(trim_nul(b"\0a\0b\0"), b"\0a\0b");
        assert_eq!(trim_nul(&[0u8; 8]), b"");
        assert_eq!(trim_nul(b""), b"");
    }
}
