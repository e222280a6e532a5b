use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;

use crate::batch::{self, BatchAggregator, Push};
use crate::config::ConfDir;
use crate::db::{Database, GroupRecord, crud, init_db, similar};
use crate::dedup::{self, Outcome};
use crate::dhash::{Fingerprint, d_hash_bytes};
use crate::hamming::HammingDistance;
use crate::metrics;

/// 图片数据来源，只在 dHash 缓存未命中时读取
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ImageSource {
    async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(data) => Ok(data),
            Self::File(path) => tokio::fs::read(path).await,
        }
    }
}

/// 图片在群组中的一次出现
#[derive(Debug, Clone)]
pub struct Sighting {
    pub group_id: i64,
    pub message_id: i64,
    /// 发送者，用于检查用户白名单
    pub user_id: Option<i64>,
    /// 文件的唯一标识，用作 dHash 缓存的键
    pub file_ref: String,
    /// 关联 ID，相同关联 ID 的图片作为一批处理
    pub correlation_id: Option<String>,
    /// 是否为编辑过的消息
    pub edited: bool,
    pub source: ImageSource,
}

/// 忽略一次出现的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// 发送者在群组的用户白名单中
    UserWhitelisted,
    /// 编辑过的批量消息
    EditedBatch,
}

/// 提交一次出现的结果
#[derive(Debug)]
pub enum Submission {
    /// 未处理
    Ignored(IgnoreReason),
    /// 单张图片，已处理完成
    Done(Outcome),
    /// 已加入批次，批次处理完成后通过 `report` 返回结果
    Queued { armed: bool, report: oneshot::Receiver<Arc<BatchReport>> },
    /// 批次已满，被丢弃
    Dropped,
}

/// 批次中的一个条目
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub group_id: i64,
    pub message_id: i64,
    pub file_ref: String,
    pub fingerprint: Option<Fingerprint>,
    /// 判定结果，同批次内重复的图片以及处理失败的图片没有结果
    pub outcome: Option<Outcome>,
    /// 同批次内携带相同图片的最早条目
    pub duplicate_of: Option<usize>,
    pub error: Option<String>,
}

/// 一个批次的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub correlation_id: String,
    pub items: Vec<BatchItem>,
    /// 代表整个批次的条目
    pub representative: Option<usize>,
}

impl BatchReport {
    /// 代表条目的判定结果，仅当其为重复出现时才需要通知
    pub fn notification(&self) -> Option<(&BatchItem, &Outcome)> {
        let item = self.items.get(self.representative?)?;
        let outcome = item.outcome.as_ref()?;
        outcome.is_repeated().then_some((item, outcome))
    }
}

/// 在未跳过的结果中选出次数最多的条目，次数相同时取最早的条目
pub fn select_representative(items: &[BatchItem]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (i, item) in items.iter().enumerate() {
        let Some(outcome) = item.outcome.as_ref().filter(|o| !o.is_skipped()) else {
            continue;
        };
        if best.is_none_or(|(_, count)| outcome.count() > count) {
            best = Some((i, outcome.count()));
        }
    }
    best.map(|(i, _)| i)
}

struct Pending {
    sighting: Sighting,
    reply: oneshot::Sender<Arc<BatchReport>>,
}

pub struct ImDedupBuilder {
    conf_dir: ConfDir,
    hammdist: Option<PathBuf>,
    batch_delay: Duration,
    batch_limit: usize,
}

impl ImDedupBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self {
            conf_dir,
            hammdist: None,
            batch_delay: batch::DEFAULT_DELAY,
            batch_limit: batch::DEFAULT_LIMIT,
        }
    }

    /// 汉明距离扩展路径
    pub fn hammdist(mut self, path: Option<PathBuf>) -> Self {
        self.hammdist = path;
        self
    }

    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub async fn open(self) -> Result<ImDedup> {
        tokio::fs::create_dir_all(self.conf_dir.path()).await?;
        let (db, backend) = init_db(self.conf_dir.database(), self.hammdist.as_deref()).await?;
        Ok(ImDedup {
            db,
            backend,
            batch: BatchAggregator::new(self.batch_delay, self.batch_limit),
        })
    }
}

#[derive(Clone)]
pub struct ImDedup {
    db: Database,
    backend: Arc<dyn HammingDistance>,
    batch: BatchAggregator<Pending>,
}

impl ImDedup {
    /// 当前使用的汉明距离实现
    pub fn backend(&self) -> &dyn HammingDistance {
        self.backend.as_ref()
    }

    /// 批次等待时间
    pub fn batch_delay(&self) -> Duration {
        self.batch.delay()
    }

    /// 单批最大条目数
    pub fn batch_limit(&self) -> usize {
        self.batch.limit()
    }

    /// 计算图片的 dHash，不使用缓存
    pub async fn hash(&self, source: ImageSource) -> Result<Fingerprint> {
        let data = source.into_bytes().await?;
        let len = data.len();
        let start = Instant::now();
        let fingerprint = spawn_blocking(move || d_hash_bytes(&data)).await??;
        metrics::inc_hash_duration(len, start.elapsed().as_secs_f32());
        Ok(fingerprint)
    }

    /// 获取文件的 dHash，优先读取缓存
    ///
    /// 缓存写入失败不影响结果
    pub async fn fingerprint(&self, file_ref: &str, source: ImageSource) -> Result<Fingerprint> {
        if let Some(fingerprint) = crud::cache_get(&self.db, file_ref).await? {
            metrics::inc_cache_count(true);
            return Ok(fingerprint);
        }
        metrics::inc_cache_count(false);

        let fingerprint = self.hash(source).await?;
        if let Err(e) = crud::cache_put(&self.db, file_ref, &fingerprint).await {
            warn!("写入 dHash 缓存失败 {file_ref}: {e}");
        }
        Ok(fingerprint)
    }

    /// 直接处理一次出现，不经过批次聚合与用户白名单检查
    pub async fn sight(&self, sighting: Sighting) -> Result<Outcome> {
        let Sighting { group_id, message_id, file_ref, source, .. } = sighting;
        let fingerprint = self.fingerprint(&file_ref, source).await?;
        self.sight_fingerprint(group_id, &fingerprint, message_id).await
    }

    /// 以已经算好的 dHash 处理一次出现
    pub async fn sight_fingerprint(
        &self,
        group_id: i64,
        fingerprint: &Fingerprint,
        message_id: i64,
    ) -> Result<Outcome> {
        let outcome = dedup::sight(&self.db, group_id, fingerprint, message_id).await?;
        metrics::inc_sighting_count(outcome.label());
        Ok(outcome)
    }

    /// 提交一次出现
    ///
    /// 带有关联 ID 的出现会加入批次，延迟后统一处理
    pub async fn submit(&self, sighting: Sighting) -> Result<Submission> {
        if let Some(user_id) = sighting.user_id
            && crud::user_whitelist_contains(&self.db, sighting.group_id, user_id).await?
        {
            debug!("用户 {user_id} 在群组 {} 的白名单中", sighting.group_id);
            return Ok(Submission::Ignored(IgnoreReason::UserWhitelisted));
        }

        let Some(correlation_id) = sighting.correlation_id.clone() else {
            return Ok(Submission::Done(self.sight(sighting).await?));
        };
        if sighting.edited {
            return Ok(Submission::Ignored(IgnoreReason::EditedBatch));
        }

        let (reply, report) = oneshot::channel();
        let this = self.clone();
        let push = self
            .batch
            .push(&correlation_id, Pending { sighting, reply }, move |pending| async move {
                this.flush(pending).await;
            })
            .await;

        Ok(match push {
            Push::Armed => Submission::Queued { armed: true, report },
            Push::Appended => Submission::Queued { armed: false, report },
            Push::Dropped => Submission::Dropped,
        })
    }

    async fn flush(&self, pending: Vec<Pending>) {
        let Some(correlation_id) = pending.first().and_then(|p| p.sighting.correlation_id.clone())
        else {
            return;
        };
        let (sightings, replies): (Vec<_>, Vec<_>) =
            pending.into_iter().map(|p| (p.sighting, p.reply)).unzip();

        let report = Arc::new(self.process_batch(correlation_id, sightings).await);
        if let Some((item, outcome)) = report.notification() {
            info!(
                "群组 {} 消息 {} 的图片已出现 {} 次",
                item.group_id,
                item.message_id,
                outcome.count()
            );
        }
        for reply in replies {
            // 接收方可能已经不再等待
            let _ = reply.send(report.clone());
        }
    }

    /// 处理一个批次
    ///
    /// 同一群组中相同的图片只处理一次，并从未跳过的结果中选出一个代表
    pub async fn process_batch(
        &self,
        correlation_id: String,
        sightings: Vec<Sighting>,
    ) -> BatchReport {
        metrics::inc_batch_size(sightings.len());

        let fingerprints = join_all(
            sightings.iter().map(|s| self.fingerprint(&s.file_ref, s.source.clone())),
        )
        .await;

        let mut items = Vec::with_capacity(sightings.len());
        let mut seen = HashMap::new();
        for (sighting, fingerprint) in sightings.into_iter().zip(fingerprints) {
            let mut item = BatchItem {
                group_id: sighting.group_id,
                message_id: sighting.message_id,
                file_ref: sighting.file_ref,
                fingerprint: None,
                outcome: None,
                duplicate_of: None,
                error: None,
            };

            match fingerprint {
                Ok(fingerprint) => {
                    item.fingerprint = Some(fingerprint);
                    match seen.entry((item.group_id, fingerprint)) {
                        Entry::Occupied(entry) => item.duplicate_of = Some(*entry.get()),
                        Entry::Vacant(entry) => {
                            entry.insert(items.len());
                            match dedup::sight(&self.db, item.group_id, &fingerprint, item.message_id)
                                .await
                            {
                                Ok(outcome) => {
                                    metrics::inc_sighting_count(outcome.label());
                                    item.outcome = Some(outcome);
                                }
                                Err(e) => {
                                    warn!("批次 {correlation_id} 处理 {} 失败: {e}", item.file_ref);
                                    item.error = Some(e.to_string());
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("批次 {correlation_id} 计算 {} 的 dHash 失败: {e:#}", item.file_ref);
                    item.error = Some(format!("{e:#}"));
                }
            }
            items.push(item);
        }

        let representative = select_representative(&items);
        BatchReport { correlation_id, items, representative }
    }

    /// 设置图片是否在群组白名单中
    pub async fn whitelist(&self, group_id: i64, fingerprint: &Fingerprint, flag: bool) -> Result<()> {
        crud::whitelist_set(&self.db, group_id, fingerprint, flag).await?;
        Ok(())
    }

    /// 将用户加入群组白名单，返回是否为新加入
    pub async fn user_whitelist_add(&self, group_id: i64, user_id: i64) -> Result<bool> {
        Ok(crud::user_whitelist_add(&self.db, group_id, user_id).await?)
    }

    /// 将用户移出群组白名单，返回用户之前是否在白名单中
    pub async fn user_whitelist_remove(&self, group_id: i64, user_id: i64) -> Result<bool> {
        Ok(crud::user_whitelist_remove(&self.db, group_id, user_id).await?)
    }

    pub async fn user_whitelist_contains(&self, group_id: i64, user_id: i64) -> Result<bool> {
        Ok(crud::user_whitelist_contains(&self.db, group_id, user_id).await?)
    }

    /// 获取图片在群组中的记录，不存在时返回次数为 0 的记录
    pub async fn info(&self, group_id: i64, fingerprint: &Fingerprint) -> Result<GroupRecord> {
        Ok(crud::record_get(&self.db, group_id, fingerprint)
            .await?
            .unwrap_or_else(|| GroupRecord::empty(group_id, *fingerprint)))
    }

    /// 查找群组中相似的图片
    ///
    /// # Arguments
    ///
    /// * `max_distance` - 汉明距离上限（不含）
    /// * `limit` - 最多返回的数量
    pub async fn similar(
        &self,
        group_id: i64,
        fingerprint: &Fingerprint,
        max_distance: u32,
        limit: u32,
    ) -> Result<Vec<(GroupRecord, u32)>> {
        Ok(similar::nearest(
            &self.db,
            self.backend.as_ref(),
            group_id,
            fingerprint,
            max_distance,
            limit,
        )
        .await?)
    }

    /// 群组记录过的不同图片数量
    pub async fn group_image_count(&self, group_id: i64) -> Result<i64> {
        Ok(crud::group_image_count(&self.db, group_id).await?)
    }

    /// 服务过的群组数量
    pub async fn count_groups(&self) -> Result<i64> {
        Ok(crud::count_groups(&self.db).await?)
    }

    /// 以 CSV 格式导出群组的全部记录，返回导出的记录数
    pub async fn export<W: Write>(&self, group_id: i64, writer: W) -> Result<usize> {
        let records = crud::list_records(&self.db, group_id).await?;
        let mut writer = csv::Writer::from_writer(writer);
        for record in &records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SkipReason;

    fn record(count: i64) -> GroupRecord {
        GroupRecord { count, ..GroupRecord::empty(1, Fingerprint::default()) }
    }

    fn item(outcome: Option<Outcome>) -> BatchItem {
        BatchItem {
            group_id: 1,
            message_id: 1,
            file_ref: String::new(),
            fingerprint: None,
            outcome,
            duplicate_of: None,
            error: None,
        }
    }

    fn repeated(count: i64) -> Option<Outcome> {
        Some(Outcome::Repeated {
            previous_count: count - 1,
            previous_message_id: 0,
            record: record(count),
        })
    }

    #[test]
    fn test_select_representative() {
        let items = vec![
            item(Some(Outcome::FirstSeen { record: record(1) })),
            item(repeated(3)),
            item(Some(Outcome::Skipped { reason: SkipReason::Whitelisted, record: record(9) })),
            item(None),
            item(repeated(3)),
        ];
        assert_eq!(select_representative(&items), Some(1));

        let items = vec![
            item(Some(Outcome::Skipped { reason: SkipReason::SameMessage, record: record(2) })),
            item(None),
        ];
        assert_eq!(select_representative(&items), None);
        assert_eq!(select_representative(&[]), None);
    }

    #[test]
    fn test_notification_only_for_repeated() {
        let report = BatchReport {
            correlation_id: "a".into(),
            items: vec![item(Some(Outcome::FirstSeen { record: record(1) }))],
            representative: Some(0),
        };
        assert!(report.notification().is_none());

        let report = BatchReport {
            correlation_id: "a".into(),
            items: vec![item(repeated(2))],
            representative: Some(0),
        };
        assert_eq!(report.notification().map(|(_, o)| o.count()), Some(2));
    }
}
