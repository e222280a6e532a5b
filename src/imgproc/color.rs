use std::borrow::Cow;

use super::{Plane, PixelView};

const GRAY_SHIFT: u32 = 15;
// 即 OpenCV 中的 R2YF/G2YF/B2YF * 32768 并四舍五入
const R2Y: u32 = 9798;
const G2Y: u32 = 19235;
const B2Y: u32 = 3735;

/// 定点灰度转换，与 OpenCV 的 `RGB2Gray<uchar>` 一致
#[inline(always)]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (b as u32 * B2Y + g as u32 * G2Y + r as u32 * R2Y + (1 << (GRAY_SHIFT - 1)))
        >> GRAY_SHIFT;
    y.min(255) as u8
}

/// 转换为单通道图像，已经是灰度图时直接借用原数据
pub fn to_gray<'a>(view: &PixelView<'a>) -> Plane<'a> {
    let Some((ri, gi, bi)) = view.layout.rgb_offsets() else {
        return Plane {
            data: Cow::Borrowed(view.data),
            width: view.width,
            height: view.height,
            stride: view.stride,
        };
    };

    let cn = view.layout.channels();
    let mut gray = Vec::with_capacity(view.width * view.height);
    for y in 0..view.height {
        gray.extend(view.row(y).chunks_exact(cn).map(|p| luma(p[ri], p[gi], p[bi])));
    }

    Plane { data: Cow::Owned(gray), width: view.width, height: view.height, stride: view.width }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::imgproc::PixelLayout;

    #[rstest]
    #[case::black(0, 0, 0, 0)]
    #[case::white(255, 255, 255, 255)]
    #[case::red(255, 0, 0, 76)]
    #[case::green(0, 255, 0, 150)]
    #[case::blue(0, 0, 255, 29)]
    #[case::gray(77, 77, 77, 77)]
    fn test_luma(#[case] r: u8, #[case] g: u8, #[case] b: u8, #[case] expected: u8) {
        assert_eq!(luma(r, g, b), expected);
    }

    #[test]
    fn test_to_gray_bgr_swaps_channels() {
        let rgb = [255, 0, 0, 0, 0, 255];
        let bgr = [0, 0, 255, 255, 0, 0];
        let a = to_gray(&PixelView::packed(&rgb, 2, 1, PixelLayout::Rgb).unwrap());
        let b = to_gray(&PixelView::packed(&bgr, 2, 1, PixelLayout::Bgr).unwrap());
        assert_eq!(a.row(0), &[76, 29]);
        assert_eq!(a.row(0), b.row(0));
    }

    #[test]
    fn test_to_gray_ignores_alpha_and_padding() {
        // 每行 2 个 RGBA 像素，外加 3 字节填充
        let data = [
            10, 10, 10, 0, 20, 20, 20, 255, 9, 9, 9, //
            30, 30, 30, 7, 40, 40, 40, 99, 9, 9, 9,
        ];
        let view = PixelView::new(&data, 2, 2, 11, PixelLayout::Rgba).unwrap();
        let gray = to_gray(&view);
        assert_eq!(gray.row(0), &[10, 20]);
        assert_eq!(gray.row(1), &[30, 40]);
    }

    #[test]
    fn test_to_gray_borrows_gray() {
        let data = [1, 2, 3, 0, 4, 5, 6, 0];
        let view = PixelView::new(&data, 3, 2, 4, PixelLayout::Gray).unwrap();
        let gray = to_gray(&view);
        assert!(matches!(gray.data, Cow::Borrowed(_)));
        assert_eq!(gray.row(1), &[4, 5, 6]);
    }
}
