use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::{SubCommandExtend, open_db};
use crate::config::{DbOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    /// 输出文件，不填则输出到标准输出
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let count = match &self.output {
            Some(path) => db.export(self.group, std::fs::File::create(path)?).await?,
            None => db.export(self.group, std::io::stdout()).await?,
        };
        info!("导出成功，共 {count} 条记录");
        Ok(())
    }
}
