pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Luma of an RGB triple using ITU-R 601 weights, fixed point.
pub(crate) fn luma601(r: u8, g: u8, b: u8) -> u8 {
    let y = 4899 * u32::from(r) + 9617 * u32::from(g) + 1868 * u32::from(b);
    ((y + (1 << 13)) >> 14).min(255) as u8
}

pub(crate) fn scale_u8(v: u8, factor: f32) -> u8 {
    (f32::from(v) * factor).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div255_endpoints() {
        assert_eq!(mul_div255(255, 255), 255);
        assert_eq!(mul_div255(255, 0), 0);
        assert_eq!(mul_div255(128, 255), 128);
    }

    #[test]
    fn luma_of_gray_is_gray() {
        for v in [0u8, 17, 128, 200, 255] {
            assert_eq!(luma601(v, v, v), v);
        }
    }

    #[test]
    fn scale_clamps() {
        assert_eq!(scale_u8(200, 2.0), 255);
        assert_eq!(scale_u8(100, 0.9), 90);
    }
}
