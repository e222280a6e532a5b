use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, open_db};
use crate::config::{DbOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct StatCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 同时显示该群组记录过的图片数量
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: Option<i64>,
}

impl SubCommandExtend for StatCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        println!("groups\t{}", db.count_groups().await?);
        if let Some(group) = self.group {
            println!("images\t{}", db.group_image_count(group).await?);
        }
        Ok(())
    }
}
