use std::fmt::Debug;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("dhash length mismatch: {left} vs {right}")]
pub struct LengthMismatch {
    pub left: usize,
    pub right: usize,
}

#[inline(always)]
fn check_len(va: &[u8], vb: &[u8]) -> Result<(), LengthMismatch> {
    if va.len() != vb.len() {
        return Err(LengthMismatch { left: va.len(), right: vb.len() });
    }
    Ok(())
}

/// 逐字节计算汉明距离
#[inline(always)]
pub fn hamming_naive(va: &[u8], vb: &[u8]) -> Result<u32, LengthMismatch> {
    check_len(va, vb)?;
    Ok(va.iter().zip(vb).map(|(a, b)| (a ^ b).count_ones()).sum())
}

/// 按 8 字节一组计算汉明距离，剩余部分逐字节处理
#[inline(always)]
pub fn hamming_u64(va: &[u8], vb: &[u8]) -> Result<u32, LengthMismatch> {
    check_len(va, vb)?;
    let (ca, ra) = va.as_chunks::<8>();
    let (cb, rb) = vb.as_chunks::<8>();
    let mut sum = 0;
    for (a, b) in ca.iter().zip(cb) {
        // 此处 pod_read_unaligned 不要求输入对齐
        let a: u64 = bytemuck::pod_read_unaligned(a);
        let b: u64 = bytemuck::pod_read_unaligned(b);
        sum += (a ^ b).count_ones();
    }
    for (a, b) in ra.iter().zip(rb) {
        sum += (a ^ b).count_ones();
    }
    Ok(sum)
}

/// 数据库侧计算汉明距离的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDistance {
    /// 由加载的 SQLite 扩展提供的函数，参数为两个 BLOB
    Function(&'static str),
    /// 纯 SQL 位运算实现，作用于整数形式的 dHash
    Portable,
}

/// 汉明距离的实现，启动时选定一次，之后所有查询都使用同一个实现
pub trait HammingDistance: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// 数据库中使用的距离谓词
    fn sql(&self) -> SqlDistance;
}

/// 纯软件实现，总是可用
#[derive(Debug, Default, Clone, Copy)]
pub struct Portable;

impl HammingDistance for Portable {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn sql(&self) -> SqlDistance {
        SqlDistance::Portable
    }
}

/// 通过 SQLite 可加载扩展提供 `hamming_distance(blob, blob)`
#[derive(Debug, Clone)]
pub struct SqliteExtension {
    path: PathBuf,
}

impl SqliteExtension {
    /// 扩展的入口函数
    pub const ENTRY_POINT: &'static str = "sqlite3_hammdist_init";
    /// 扩展注册的 SQL 函数名
    pub const FUNCTION: &'static str = "hamming_distance";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HammingDistance for SqliteExtension {
    fn name(&self) -> &'static str {
        "sqlite-extension"
    }

    fn sql(&self) -> SqlDistance {
        SqlDistance::Function(Self::FUNCTION)
    }
}
