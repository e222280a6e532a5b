use anyhow::Result;
use clap::Parser;

use crate::cli::{ImageTarget, SubCommandExtend, open_db};
use crate::config::{DbOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct WhitelistCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    #[command(flatten)]
    pub target: ImageTarget,
    /// 移出白名单
    #[arg(long)]
    pub remove: bool,
}

impl SubCommandExtend for WhitelistCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let fingerprint = self.target.resolve(&db).await?;
        db.whitelist(self.group, &fingerprint, !self.remove).await?;
        println!("{fingerprint}\t{}", if self.remove { "removed" } else { "added" });
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct UserWhitelistCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    /// 用户 ID
    #[arg(short, long)]
    pub user: i64,
    /// 移出白名单
    #[arg(long, conflicts_with = "check")]
    pub remove: bool,
    /// 只检查用户是否在白名单中
    #[arg(long)]
    pub check: bool,
}

impl SubCommandExtend for UserWhitelistCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let status = if self.check {
            match db.user_whitelist_contains(self.group, self.user).await? {
                true => "listed",
                false => "not_listed",
            }
        } else if self.remove {
            match db.user_whitelist_remove(self.group, self.user).await? {
                true => "removed",
                false => "not_listed",
            }
        } else {
            match db.user_whitelist_add(self.group, self.user).await? {
                true => "added",
                false => "already_listed",
            }
        };
        println!("{}\t{status}", self.user);
        Ok(())
    }
}
