use anyhow::Result;
use clap::Parser;

use crate::cli::{ImageTarget, OutputFormat, SubCommandExtend, open_db};
use crate::config::{DbOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    #[command(flatten)]
    pub target: ImageTarget,
    /// 输出格式
    #[arg(long, value_enum, default_value_t)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for InfoCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let fingerprint = self.target.resolve(&db).await?;
        let record = db.info(self.group, &fingerprint).await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
            OutputFormat::Table => {
                println!("fingerprint\t{}", record.fingerprint);
                println!("count\t{}", record.count);
                println!("last_message_id\t{}", record.last_message_id);
                println!("in_whitelist\t{}", record.in_whitelist);
            }
        }
        Ok(())
    }
}
