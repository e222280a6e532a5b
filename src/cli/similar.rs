use anyhow::Result;
use clap::Parser;
use serde_json::json;

use crate::cli::{ImageTarget, OutputFormat, SubCommandExtend, open_db};
use crate::config::{DbOptions, Opts, SimilarOptions};

#[derive(Parser, Debug, Clone)]
pub struct SimilarCommand {
    #[command(flatten)]
    pub db: DbOptions,
    #[command(flatten)]
    pub search: SimilarOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    #[command(flatten)]
    pub target: ImageTarget,
    /// 输出格式
    #[arg(long, value_enum, default_value_t)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SimilarCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let fingerprint = self.target.resolve(&db).await?;
        let result =
            db.similar(self.group, &fingerprint, self.search.distance, self.search.limit).await?;

        match self.output_format {
            OutputFormat::Json => {
                let result = result
                    .iter()
                    .map(|(record, distance)| json!({ "distance": distance, "record": record }))
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table => {
                for (record, distance) in &result {
                    println!(
                        "{distance}\t{}\t{}\t{}",
                        record.fingerprint, record.count, record.last_message_id
                    );
                }
            }
        }
        Ok(())
    }
}
