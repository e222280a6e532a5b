use image::{DynamicImage, GrayImage, RgbaImage};

use super::{ImageError, PixelLayout, PixelView};

/// 解码后的图片，8 位灰度图保持单通道，其余统一展开为 RGBA
pub enum DecodedImage {
    Gray(GrayImage),
    Rgba(RgbaImage),
}

impl DecodedImage {
    pub fn view(&self) -> Result<PixelView<'_>, ImageError> {
        match self {
            Self::Gray(img) => PixelView::packed(
                img.as_raw(),
                img.width() as usize,
                img.height() as usize,
                PixelLayout::Gray,
            ),
            Self::Rgba(img) => PixelView::packed(
                img.as_raw(),
                img.width() as usize,
                img.height() as usize,
                PixelLayout::Rgba,
            ),
        }
    }
}

/// 从内存中解码图片
pub fn decode(data: &[u8]) -> Result<DecodedImage, ImageError> {
    if data.is_empty() {
        return Err(ImageError::EmptyBuffer);
    }
    let img = image::load_from_memory(data)?;
    Ok(match img {
        DynamicImage::ImageLuma8(gray) => DecodedImage::Gray(gray),
        other => {
            let has_alpha = other.color().has_alpha();
            let mut rgba = other.into_rgba8();
            if has_alpha {
                premultiply(&mut rgba);
            }
            DecodedImage::Rgba(rgba)
        }
    })
}

/// 将颜色通道乘以 alpha，结果与 16 位预乘后取高 8 位一致
fn premultiply(img: &mut RgbaImage) {
    for p in img.pixels_mut() {
        let a = p[3] as u32 * 0x101;
        for c in &mut p.0[..3] {
            *c = ((*c as u32 * a / 0xff) >> 8) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Luma, Rgb, RgbImage, Rgba};

    use super::*;

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_gray_stays_gray() {
        let img = GrayImage::from_pixel(3, 2, Luma([42]));
        let decoded = decode(&encode(DynamicImage::ImageLuma8(img))).unwrap();
        let view = decoded.view().unwrap();
        assert_eq!(view.layout(), PixelLayout::Gray);
        assert_eq!((view.width(), view.height()), (3, 2));
    }

    #[test]
    fn test_decode_rgb_expands_to_rgba() {
        let img = RgbImage::from_pixel(4, 5, Rgb([1, 2, 3]));
        let decoded = decode(&encode(DynamicImage::ImageRgb8(img))).unwrap();
        let view = decoded.view().unwrap();
        assert_eq!(view.layout(), PixelLayout::Rgba);
        assert_eq!((view.width(), view.height()), (4, 5));
    }

    #[test]
    fn test_decode_premultiplies_alpha() {
        let mut img = RgbaImage::new(4, 1);
        img.put_pixel(0, 0, Rgba([200, 100, 50, 255]));
        img.put_pixel(1, 0, Rgba([200, 100, 50, 128]));
        img.put_pixel(2, 0, Rgba([255, 255, 255, 0]));
        img.put_pixel(3, 0, Rgba([255, 1, 77, 1]));
        let decoded = decode(&encode(DynamicImage::ImageRgba8(img))).unwrap();
        let DecodedImage::Rgba(rgba) = decoded else {
            panic!("expected rgba");
        };
        assert_eq!(rgba.get_pixel(0, 0).0, [200, 100, 50, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [100, 50, 25, 128]);
        assert_eq!(rgba.get_pixel(2, 0).0, [0, 0, 0, 0]);
        assert_eq!(rgba.get_pixel(3, 0).0, [1, 0, 0, 1]);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[]), Err(ImageError::EmptyBuffer)));
        assert!(matches!(decode(b"definitely not an image"), Err(ImageError::Decode(_))));
    }
}
