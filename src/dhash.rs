use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hamming::LengthMismatch;
use crate::imgproc::{GRID_HEIGHT, GRID_WIDTH, Grid, ImageError, PixelView};

/// 8 字节的 dHash，行优先，每字节高位在前
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// 以有符号 64 位整数形式表示，用于在 SQL 中直接做位运算
    pub fn bits(&self) -> i64 {
        i64::from_be_bytes(self.0)
    }

    pub fn from_bits(bits: i64) -> Self {
        Self(bits.to_be_bytes())
    }
}

impl Deref for Fingerprint {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 8]> for Fingerprint {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Fingerprint {
    type Error = LengthMismatch;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 8] =
            value.try_into().map_err(|_| LengthMismatch { left: value.len(), right: 8 })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<Vec<u8>> for Fingerprint {
    type Error = LengthMismatch;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", u64::from_be_bytes(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("无效的 dHash: {0}")]
pub struct ParseFingerprintError(String);

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if s.len() != 16 {
            return Err(ParseFingerprintError(s.to_owned()));
        }
        let v = u64::from_str_radix(s, 16).map_err(|_| ParseFingerprintError(s.to_owned()))?;
        Ok(Self(v.to_be_bytes()))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 根据 9x8 灰度网格计算 dHash
///
/// 第 y 行第 x 列的像素严格大于右侧像素时，置位第 `y * 8 + x` 位
pub fn d_hash_grid(grid: &Grid) -> Fingerprint {
    let mut hash = [0u8; 8];
    for (i, row) in grid.chunks_exact(GRID_WIDTH).take(GRID_HEIGHT).enumerate() {
        let mut b = 0u8;
        for pair in row.windows(2) {
            b <<= 1;
            b |= (pair[0] > pair[1]) as u8;
        }
        hash[i] = b;
    }
    Fingerprint(hash)
}

/// 计算像素缓冲区的 dHash
pub fn d_hash(view: &PixelView<'_>) -> Result<Fingerprint, ImageError> {
    let grid = crate::imgproc::normalize(view)?;
    Ok(d_hash_grid(&grid))
}

/// 解码图片并计算 dHash
pub fn d_hash_bytes(data: &[u8]) -> Result<Fingerprint, ImageError> {
    let grid = crate::imgproc::normalize_bytes(data)?;
    Ok(d_hash_grid(&grid))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::imgproc::PixelLayout;

    #[test]
    fn test_flat_grid_is_zero() {
        assert_eq!(d_hash_grid(&[77; 72]), Fingerprint::default());
    }

    #[test]
    fn test_decreasing_grid_is_all_ones() {
        let mut grid = [0u8; 72];
        for (i, p) in grid.iter_mut().enumerate() {
            *p = 200 - (i % 9) as u8 * 10;
        }
        assert_eq!(d_hash_grid(&grid), Fingerprint::new([0xFF; 8]));
    }

    #[test]
    fn test_bit_order() {
        // 第 0 行第 0 列：bit 0 为 byte 0 的最高位
        let mut grid = [0u8; 72];
        grid[0] = 1;
        assert_eq!(d_hash_grid(&grid).as_bytes(), &[0x80, 0, 0, 0, 0, 0, 0, 0]);

        // 第 2 行第 7 列：bit 23 为 byte 2 的最低位
        let mut grid = [0u8; 72];
        grid[2 * 9 + 7] = 1;
        assert_eq!(d_hash_grid(&grid).as_bytes(), &[0, 0, 0x01, 0, 0, 0, 0, 0]);

        // 相等的像素不置位，只有最后一列更亮时也不置位
        let mut grid = [5u8; 72];
        grid[8] = 9;
        assert_eq!(d_hash_grid(&grid), Fingerprint::default());
    }

    #[test]
    fn test_uniform_image_twice() {
        let data = [128u8, 128, 128, 255].repeat(4);
        let view = PixelView::packed(&data, 2, 2, PixelLayout::Rgba).unwrap();
        let a = d_hash(&view).unwrap();
        let b = d_hash(&view).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0000000000000000");
    }

    #[test]
    fn test_linear_gradient_hash() {
        let columns = [200u8, 150, 100, 50];
        let data = (0..16).map(|i| columns[i % 4]).collect::<Vec<_>>();
        let view = PixelView::packed(&data, 4, 4, PixelLayout::Gray).unwrap();
        assert_eq!(d_hash(&view).unwrap(), Fingerprint::new([0x7E; 8]));
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = Fingerprint::new([0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
        assert_eq!(fp.to_string(), "0123456789ABCDEF");
        assert_eq!("0123456789abcdef".parse::<Fingerprint>().unwrap(), fp);
        assert_eq!("0x0123456789ABCDEF".parse::<Fingerprint>().unwrap(), fp);
        assert!("0123".parse::<Fingerprint>().is_err());
        assert!("0123456789ABCDEG".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_bits_round_trip() {
        let fp = Fingerprint::new([0xFF, 0, 0, 0, 0, 0, 0, 1]);
        assert!(fp.bits() < 0);
        assert_eq!(Fingerprint::from_bits(fp.bits()), fp);
    }

    #[test]
    fn test_try_from_wrong_length() {
        assert!(Fingerprint::try_from(vec![0u8; 7]).is_err());
        assert!(Fingerprint::try_from(vec![0u8; 8]).is_ok());
    }

    #[rstest]
    #[case::fast_2x2(18, 16, "23347A554EAB95AA")]
    #[case::fast_2x1(18, 8, "222535545A335555")]
    #[case::fast_4x4(36, 32, "278DE937A22454B4")]
    #[case::fast_6x6(54, 48, "09F25952322B3393")]
    #[case::fast_1x4(9, 32, "051A25CA952A5552")]
    #[case::area_fractional(12, 10, "1B1A14153A2A2A4C")]
    #[case::area_fractional_large(100, 75, "4B9A59D21569C64A")]
    #[case::linear_upscale(4, 4, "0000000000000000")]
    #[case::linear_mixed(20, 5, "36323B3B3D5D5C4C")]
    #[case::one_pixel(1, 1, "0000000000000000")]
    #[case::fast_3x3(27, 24, "4A65B3CAB52545B3")]
    fn test_pattern_hash(#[case] width: usize, #[case] height: usize, #[case] expected: &str) {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * x * 7 + y * 13 + x * y * 3 + 11) % 256) as u8))
            .collect::<Vec<_>>();
        let view = PixelView::packed(&data, width, height, PixelLayout::Gray).unwrap();
        assert_eq!(d_hash(&view).unwrap().to_string(), expected);
    }
}
