use super::Plane;

const INTER_RESIZE_COEF_BITS: u32 = 11;
const INTER_RESIZE_COEF_SCALE: i32 = 1 << INTER_RESIZE_COEF_BITS;

/// 区域插值表中的一项：源像素 `si` 以权重 `alpha` 贡献给目标像素 `di`
#[derive(Debug, Clone, Copy, PartialEq)]
struct DecimateAlpha {
    si: usize,
    di: usize,
    alpha: f32,
}

/// 使用 INTER_AREA 将单通道图像缩放到 `dst_w x dst_h`，结果写入 `dst`
///
/// 两个方向都是缩小时使用区域插值，缩放比例均为整数时走整数快速路径；
/// 任一方向需要放大时，与 OpenCV 一样退化为双线性插值。
pub fn resize_area(src: &Plane<'_>, dst: &mut [u8], dst_w: usize, dst_h: usize) {
    assert_eq!(dst.len(), dst_w * dst_h, "dst buffer size mismatch");

    let scale_x = src.width as f64 / dst_w as f64;
    let scale_y = src.height as f64 / dst_h as f64;

    if scale_x >= 1.0 && scale_y >= 1.0 {
        let iscale_x = scale_x.round();
        let iscale_y = scale_y.round();
        if (scale_x - iscale_x).abs() < 1e-6 && (scale_y - iscale_y).abs() < 1e-6 {
            resize_area_fast(src, dst, dst_w, dst_h, iscale_x as usize, iscale_y as usize);
        } else {
            resize_area_down(src, dst, dst_w, dst_h, scale_x, scale_y);
        }
    } else {
        resize_area_linear(src, dst, dst_w, dst_h);
    }
}

/// 整数倍缩小：对每个 N×M 块求和后取平均
///
/// 2x2 块加 2 右移两位，其余块乘以 `1/area` 后四舍六入五成双
fn resize_area_fast(
    src: &Plane<'_>,
    dst: &mut [u8],
    dst_w: usize,
    dst_h: usize,
    iscale_x: usize,
    iscale_y: usize,
) {
    let scale = 1.0 / (iscale_x * iscale_y) as f32;
    let two_by_two = iscale_x == 2 && iscale_y == 2;

    for dy in 0..dst_h {
        let drow = &mut dst[dy * dst_w..(dy + 1) * dst_w];
        for (dx, d) in drow.iter_mut().enumerate() {
            let sx = dx * iscale_x;
            let mut sum = 0u64;
            for ky in 0..iscale_y {
                let srow = src.row(dy * iscale_y + ky);
                sum += srow[sx..sx + iscale_x].iter().map(|&p| p as u64).sum::<u64>();
            }
            *d = if two_by_two { ((sum + 2) >> 2) as u8 } else { saturate_f32(sum as f32 * scale) };
        }
    }
}

/// 计算某一方向的区域插值表
fn compute_area_tab(ssize: usize, dsize: usize, scale: f64) -> Vec<DecimateAlpha> {
    let mut tab = Vec::with_capacity(ssize * 2 + 2);
    for dx in 0..dsize {
        let fsx1 = dx as f64 * scale;
        let fsx2 = fsx1 + scale;
        let cell_width = scale.min(ssize as f64 - fsx1);

        let mut sx1 = fsx1.ceil() as i64;
        let sx2 = (fsx2.floor() as i64).min(ssize as i64 - 1);
        if sx1 > sx2 {
            sx1 = sx2;
        }

        if sx1 as f64 - fsx1 > 1e-3 {
            tab.push(DecimateAlpha {
                si: (sx1 - 1) as usize,
                di: dx,
                alpha: ((sx1 as f64 - fsx1) / cell_width) as f32,
            });
        }

        for sx in sx1..sx2 {
            tab.push(DecimateAlpha { si: sx as usize, di: dx, alpha: (1.0 / cell_width) as f32 });
        }

        if fsx2 - sx2 as f64 > 1e-3 {
            let w = (fsx2 - sx2 as f64).min(1.0).min(cell_width);
            tab.push(DecimateAlpha { si: sx2 as usize, di: dx, alpha: (w / cell_width) as f32 });
        }
    }
    tab
}

/// 非整数倍缩小：先按行累加水平权重，再按垂直权重累加到输出缓冲
fn resize_area_down(
    src: &Plane<'_>,
    dst: &mut [u8],
    dst_w: usize,
    dst_h: usize,
    scale_x: f64,
    scale_y: f64,
) {
    let xtab = compute_area_tab(src.width, dst_w, scale_x);
    let ytab = compute_area_tab(src.height, dst_h, scale_y);

    let mut buf = vec![0f32; dst_w];
    let mut sum = vec![0f32; dst_w];

    let mut start = 0;
    for dy in 0..dst_h {
        let end = start + ytab[start..].iter().take_while(|t| t.di == dy).count();
        if start == end {
            sum.fill(0.0);
        }
        for (j, ty) in ytab[start..end].iter().enumerate() {
            let srow = src.row(ty.si);
            let beta = ty.alpha;
            buf.fill(0.0);
            for tx in &xtab {
                buf[tx.di] += tx.alpha * srow[tx.si] as f32;
            }
            if j == 0 {
                for (s, b) in sum.iter_mut().zip(&buf) {
                    *s = b * beta;
                }
            } else {
                for (s, b) in sum.iter_mut().zip(&buf) {
                    *s += b * beta;
                }
            }
        }
        start = end;

        let drow = &mut dst[dy * dst_w..(dy + 1) * dst_w];
        for (d, &s) in drow.iter_mut().zip(&sum) {
            *d = saturate_f32(s);
        }
    }
}

/// 计算双线性插值的源坐标与定点权重 `(源坐标, w0, w1)`
///
/// 注意这里使用的是 INTER_AREA 放大时的坐标映射，而不是 INTER_LINEAR 的像素中心映射
fn linear_coeffs(ssize: usize, dsize: usize) -> Vec<(usize, i32, i32)> {
    let scale = ssize as f64 / dsize as f64;
    let inv_scale = 1.0 / scale;
    (0..dsize)
        .map(|d| {
            let mut s = 0i64;
            let mut f = 0f32;
            if ssize > 1 {
                s = (d as f64 * scale).floor() as i64;
                f = ((d + 1) as f64 - (s + 1) as f64 * inv_scale) as f32;
                f = if f <= 0.0 { 0.0 } else { f - (f as f64).floor() as f32 };
                if s < 0 {
                    s = 0;
                    f = 0.0;
                }
                if s >= ssize as i64 - 1 {
                    s = ssize as i64 - 2;
                    f = 1.0;
                }
            }
            let w1 = (f * INTER_RESIZE_COEF_SCALE as f32).round_ties_even() as i32;
            (s as usize, INTER_RESIZE_COEF_SCALE - w1, w1)
        })
        .collect()
}

fn resize_area_linear(src: &Plane<'_>, dst: &mut [u8], dst_w: usize, dst_h: usize) {
    let xcoef = linear_coeffs(src.width, dst_w);
    let ycoef = linear_coeffs(src.height, dst_h);

    for (dy, &(sy, wy0, wy1)) in ycoef.iter().enumerate() {
        let srow0 = src.row(sy);
        let srow1 = if src.height > 1 { src.row(sy + 1) } else { srow0 };
        let drow = &mut dst[dy * dst_w..(dy + 1) * dst_w];
        for (d, &(sx0, wx0, wx1)) in drow.iter_mut().zip(&xcoef) {
            let sx1 = if sx0 + 1 >= src.width { sx0 } else { sx0 + 1 };
            let t0 = wx0 * srow0[sx0] as i32 + wx1 * srow0[sx1] as i32;
            let t1 = wx0 * srow1[sx0] as i32 + wx1 * srow1[sx1] as i32;
            // 与 OpenCV 的 FixedPtCast<int, uchar, INTER_RESIZE_COEF_BITS*2> 等价
            let v0 = (wy0 * (t0 >> 4)) >> 16;
            let v1 = (wy1 * (t1 >> 4)) >> 16;
            *d = ((v0 + v1 + 2) >> 2).clamp(0, 255) as u8;
        }
    }
}

/// 四舍六入五成双后截断到 0~255
#[inline(always)]
fn saturate_f32(v: f32) -> u8 {
    (v.round_ties_even() as i32).clamp(0, 255) as u8
}
