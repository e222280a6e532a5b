mod export;
mod hash;
mod info;
mod scan;
pub mod server;
mod sight;
mod similar;
mod stat;
mod whitelist;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
pub use export::*;
pub use hash::*;
pub use info::*;
pub use scan::*;
pub use server::*;
pub use sight::*;
pub use similar::*;
pub use stat::*;
pub use whitelist::*;

use crate::config::{DbOptions, Opts};
use crate::dhash::Fingerprint;
use crate::imdedup::{ImDedup, ImDedupBuilder, ImageSource};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 以图片文件或 dHash 指定的目标图片
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ImageTarget {
    /// 图片路径
    pub image: Option<PathBuf>,
    /// 十六进制形式的 dHash
    #[arg(short = 'H', long, value_name = "HEX")]
    pub fingerprint: Option<Fingerprint>,
}

impl ImageTarget {
    /// 获取目标的 dHash，图片文件的 dHash 会写入缓存
    pub async fn resolve(&self, db: &ImDedup) -> anyhow::Result<Fingerprint> {
        match (&self.fingerprint, &self.image) {
            (Some(fingerprint), _) => Ok(*fingerprint),
            (None, Some(path)) => {
                db.fingerprint(&file_ref(path), ImageSource::File(path.clone())).await
            }
            (None, None) => Err(anyhow::anyhow!("需要指定图片路径或 dHash")),
        }
    }
}

/// 本地文件的缓存键
pub fn file_ref(path: &std::path::Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    format!("file:{}", path.display())
}

pub async fn open_db(opts: &Opts, db: &DbOptions) -> anyhow::Result<ImDedup> {
    ImDedupBuilder::new(opts.conf_dir.clone()).hammdist(db.hammdist.clone()).open().await
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}
