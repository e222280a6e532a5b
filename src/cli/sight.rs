use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend, file_ref, open_db};
use crate::config::{DbOptions, Opts};
use crate::dedup::Outcome;
use crate::imdedup::{ImageSource, Sighting, Submission};

#[derive(Parser, Debug, Clone)]
pub struct SightCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    /// 消息 ID
    #[arg(short, long)]
    pub message: i64,
    /// 发送者 ID，在群组用户白名单中时不做处理
    #[arg(short, long)]
    pub user: Option<i64>,
    /// dHash 缓存使用的文件标识，默认为图片的绝对路径
    #[arg(long, value_name = "ID")]
    pub file_ref: Option<String>,
    /// 图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_enum, default_value_t)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SightCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = open_db(opts, &self.db).await?;
        let sighting = Sighting {
            group_id: self.group,
            message_id: self.message,
            user_id: self.user,
            file_ref: self.file_ref.clone().unwrap_or_else(|| file_ref(&self.image)),
            correlation_id: None,
            edited: false,
            source: ImageSource::File(self.image.clone()),
        };

        match db.submit(sighting).await? {
            Submission::Done(outcome) => print_outcome(&outcome, self.output_format),
            Submission::Ignored(reason) => {
                println!("ignored\t{}", serde_json::to_string(&reason)?.trim_matches('"'));
                Ok(())
            }
            other => Err(anyhow!("意外的处理结果: {other:?}")),
        }
    }
}

pub fn print_outcome(outcome: &Outcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Table => {
            let record = outcome.record();
            match outcome {
                Outcome::Repeated { previous_count, previous_message_id, .. } => println!(
                    "{}\t{}\tcount={}\tprevious_count={previous_count}\tprevious_message_id={previous_message_id}",
                    outcome.label(),
                    record.fingerprint,
                    record.count,
                ),
                _ => println!("{}\t{}\tcount={}", outcome.label(), record.fingerprint, record.count),
            }
        }
    }
    Ok(())
}
