//! 生成 dHash 所需的 9x8 灰度网格
//!
//! 颜色转换与缩放均按照 OpenCV `cvtColor(COLOR_RGBA2GRAY)` 和 `resize(INTER_AREA)` 的定点算法实现，
//! 保证与 OpenCV 计算出的结果逐字节一致。
use std::borrow::Cow;

use thiserror::Error;

mod color;
mod decode;
mod resize;

pub use color::*;
pub use decode::*;
pub use resize::*;

/// 网格宽度，多出的一列用于比较相邻像素
pub const GRID_WIDTH: usize = 9;
/// 网格高度
pub const GRID_HEIGHT: usize = 8;

/// 行优先存储的 9x8 灰度网格
pub type Grid = [u8; GRID_WIDTH * GRID_HEIGHT];

/// 图片宽度上限，超过后 32 位中间结果可能溢出
pub const MAX_WIDTH: usize = (i32::MAX / 4) as usize;
/// 图片高度上限
pub const MAX_HEIGHT: usize = i32::MAX as usize;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("图片数据为空")]
    EmptyBuffer,
    #[error("图片尺寸无效: {width}x{height}")]
    ZeroDimension { width: usize, height: usize },
    #[error("图片尺寸过大: {width}x{height}")]
    TooLarge { width: usize, height: usize },
    #[error("行跨度 {stride} 小于行宽 {row_len}")]
    StrideTooSmall { stride: usize, row_len: usize },
    #[error("缓冲区长度不足: 需要 {expected}，实际 {actual}")]
    BufferTooShort { expected: usize, actual: usize },
    #[error("图片解码失败: {0}")]
    Decode(#[from] image::ImageError),
}

/// 像素排列方式，alpha 通道在转换时被忽略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray,
    Rgb,
    Rgba,
    Bgr,
    Bgra,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    /// 返回 (R, G, B) 三个通道在像素内的偏移，灰度图返回 None
    fn rgb_offsets(self) -> Option<(usize, usize, usize)> {
        match self {
            Self::Gray => None,
            Self::Rgb | Self::Rgba => Some((0, 1, 2)),
            Self::Bgr | Self::Bgra => Some((2, 1, 0)),
        }
    }
}

/// 调用方持有的像素缓冲区的只读视图
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    layout: PixelLayout,
}

impl<'a> PixelView<'a> {
    /// 创建视图并检查尺寸、跨度与缓冲区长度
    ///
    /// # Arguments
    ///
    /// * `data` - 像素数据
    /// * `width` - 宽度（像素）
    /// * `height` - 高度（像素）
    /// * `stride` - 每行字节数
    /// * `layout` - 像素排列方式
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
        layout: PixelLayout,
    ) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::EmptyBuffer);
        }
        if width == 0 || height == 0 {
            return Err(ImageError::ZeroDimension { width, height });
        }
        if width > MAX_WIDTH || height > MAX_HEIGHT {
            return Err(ImageError::TooLarge { width, height });
        }
        let row_len = width * layout.channels();
        if stride < row_len {
            return Err(ImageError::StrideTooSmall { stride, row_len });
        }
        let expected = stride
            .checked_mul(height - 1)
            .and_then(|n| n.checked_add(row_len))
            .ok_or(ImageError::TooLarge { width, height })?;
        if data.len() < expected {
            return Err(ImageError::BufferTooShort { expected, actual: data.len() });
        }
        Ok(Self { data, width, height, stride, layout })
    }

    /// 紧密排列（stride = width * channels）的视图
    pub fn packed(
        data: &'a [u8],
        width: usize,
        height: usize,
        layout: PixelLayout,
    ) -> Result<Self, ImageError> {
        Self::new(data, width, height, width * layout.channels(), layout)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * self.layout.channels()]
    }
}

/// 单通道 8 位图像
#[derive(Debug, Clone)]
pub struct Plane<'a> {
    data: Cow<'a, [u8]>,
    width: usize,
    height: usize,
    stride: usize,
}

impl Plane<'_> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }
}

/// 将像素缓冲区转换为 9x8 灰度网格
pub fn normalize(view: &PixelView<'_>) -> Result<Grid, ImageError> {
    let gray = to_gray(view);
    let mut grid = [0u8; GRID_WIDTH * GRID_HEIGHT];
    resize_area(&gray, &mut grid, GRID_WIDTH, GRID_HEIGHT);
    Ok(grid)
}

/// 解码图片并转换为 9x8 灰度网格
pub fn normalize_bytes(data: &[u8]) -> Result<Grid, ImageError> {
    let decoded = decode(data)?;
    normalize(&decoded.view()?)
}
