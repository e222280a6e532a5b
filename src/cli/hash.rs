use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::task::spawn_blocking;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::dhash::d_hash_bytes;

#[derive(Parser, Debug, Clone)]
pub struct HashCommand {
    /// 图片路径
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
}

impl SubCommandExtend for HashCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        for path in &self.images {
            let data = tokio::fs::read(path).await?;
            let fingerprint = spawn_blocking(move || d_hash_bytes(&data)).await??;
            println!("{fingerprint}\t{}", path.display());
        }
        Ok(())
    }
}
