use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "aloxaf", "imdedup")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".imdedup"));
    ConfDir { path }
});

#[derive(Parser, Debug, Clone, Default)]
pub struct DbOptions {
    /// 提供 hamming_distance(blob, blob) 函数的 SQLite 扩展，加载失败时使用纯 SQL 实现
    #[arg(long, value_name = "PATH")]
    pub hammdist: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct BatchOptions {
    /// 同一批次的第一张图片到达后，等待多久开始处理整个批次
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    pub batch_delay_ms: u64,
    /// 单个批次最多处理的图片数量，超出的部分会被丢弃
    #[arg(long, value_name = "N", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_limit: u32,
}

impl BatchOptions {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SimilarOptions {
    /// 汉明距离上限（不含），范围从 1 到 65
    #[arg(long, value_name = "N", default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=65))]
    pub distance: u32,
    /// 显示的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub limit: u32,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imdedup", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imdedup 配置文件目录
    #[arg(short, long, global = true, default_value_t = CONF_DIR.clone())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 计算图片的 dHash
    Hash(HashCommand),
    /// 记录图片在群组中的一次出现
    Sight(SightCommand),
    /// 扫描目录，将其中的图片依次记录到群组中
    Scan(ScanCommand),
    /// 查找群组中相似的图片
    Similar(SimilarCommand),
    /// 设置图片是否在群组白名单中
    Whitelist(WhitelistCommand),
    /// 管理群组用户白名单
    UserWhitelist(UserWhitelistCommand),
    /// 查看图片在群组中的记录
    Info(InfoCommand),
    /// 查看统计信息
    Stat(StatCommand),
    /// 以 CSV 格式导出群组的全部记录
    Export(ExportCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imdedup.db")
    }
}

impl std::fmt::Display for ConfDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
