use std::path::PathBuf;
use std::pin::pin;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use indicatif::ProgressBar;
use log::info;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::{JoinHandle, spawn_blocking};
use walkdir::WalkDir;

use crate::cli::{SubCommandExtend, file_ref, open_db};
use crate::config::{DbOptions, Opts};
use crate::dedup::Outcome;
use crate::imdedup::{ImDedup, ImageSource};
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct ScanCommand {
    #[command(flatten)]
    pub db: DbOptions,
    /// 群组 ID
    #[arg(short, long, allow_negative_numbers = true)]
    pub group: i64,
    /// 第一张图片使用的消息 ID，之后的图片依次递增
    #[arg(long, value_name = "ID", default_value_t = 1)]
    pub start_message: i64,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp,gif,bmp")]
    pub suffix: String,
    /// 图片所在目录
    pub path: PathBuf,
}

/// 扫描结果统计
#[derive(Debug, Default)]
struct ScanSummary {
    first_seen: usize,
    repeated: usize,
    skipped: usize,
    failed: usize,
}

impl SubCommandExtend for ScanCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let db = open_db(opts, &self.db).await?;

        let pb = ProgressBar::no_length().with_style(pb_style());

        let (t1, rx) = task_scan(self.path.clone(), re_suf, pb.clone());
        let t2 = task_sight(rx, db, self.group, self.start_message, pb.clone());

        let (_, summary) = tokio::try_join!(t1, t2)?;
        pb.finish_with_message("扫描完成");

        info!("扫描完成: {summary:?}");
        println!("first_seen\t{}", summary.first_seen);
        println!("repeated\t{}", summary.repeated);
        println!("skipped\t{}", summary.skipped);
        println!("failed\t{}", summary.failed);

        Ok(())
    }
}

fn task_scan(
    path: PathBuf,
    re_suf: Regex,
    pb: ProgressBar,
) -> (JoinHandle<()>, Receiver<PathBuf>) {
    let (tx, rx) = channel(num_cpus::get() * 2);
    let t = spawn_blocking(move || {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let path = entry.into_path();
            let matched = path
                .extension()
                .is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()));
            if !path.is_file() || !matched {
                continue;
            }
            pb.inc_length(1);
            if tx.blocking_send(path).is_err() {
                break;
            }
        }
    });
    (t, rx)
}

fn task_sight(
    mut rx: Receiver<PathBuf>,
    db: ImDedup,
    group_id: i64,
    start_message: i64,
    pb: ProgressBar,
) -> JoinHandle<ScanSummary> {
    tokio::spawn(async move {
        // dHash 并发计算，出现按扫描顺序依次记录
        let stream = futures::stream::poll_fn(move |cx| rx.poll_recv(cx))
            .map(|path| {
                let db = db.clone();
                async move {
                    let fingerprint =
                        db.fingerprint(&file_ref(&path), ImageSource::File(path.clone())).await;
                    (path, fingerprint)
                }
            })
            .buffered(num_cpus::get());
        let stream = pin!(stream);
        let mut stream = stream.enumerate();

        let mut summary = ScanSummary::default();
        while let Some((i, (path, fingerprint))) = stream.next().await {
            let result = match fingerprint {
                Ok(fingerprint) => {
                    db.sight_fingerprint(group_id, &fingerprint, start_message + i as i64).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(Outcome::FirstSeen { .. }) => summary.first_seen += 1,
                Ok(Outcome::Repeated { record, .. }) => {
                    summary.repeated += 1;
                    pb.println(format!("[DUP] {} ({} 次)", path.display(), record.count));
                }
                Ok(Outcome::Skipped { .. }) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    pb.println(format!("[ERR] {}: {e:#}", path.display()));
                }
            }
            pb.inc(1);
        }
        summary
    })
}
