//! 单次图片出现的判重状态机
//!
//! 每次出现都在一个 `BEGIN IMMEDIATE` 事务中完成读取、判断和写入，
//! 同一 (群组, dHash) 的并发请求由 SQLite 的写锁串行化。
use log::debug;
use serde::Serialize;

use crate::db::{Database, GroupRecord, crud};
use crate::dhash::Fingerprint;

/// 跳过计数的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 图片在白名单中
    Whitelisted,
    /// 同一条消息被重复投递
    SameMessage,
}

/// 一次出现的判定结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// 首次出现
    FirstSeen { record: GroupRecord },
    /// 重复出现，附带更新前的次数与消息 ID
    Repeated { previous_count: i64, previous_message_id: i64, record: GroupRecord },
    /// 未做任何修改
    Skipped { reason: SkipReason, record: GroupRecord },
}

impl Outcome {
    /// 判定后的记录
    pub fn record(&self) -> &GroupRecord {
        match self {
            Self::FirstSeen { record }
            | Self::Repeated { record, .. }
            | Self::Skipped { record, .. } => record,
        }
    }

    /// 判定后的出现次数
    pub fn count(&self) -> i64 {
        self.record().count
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, Self::Repeated { .. })
    }

    /// 用于指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstSeen { .. } => "first_seen",
            Self::Repeated { .. } => "repeated",
            Self::Skipped { reason: SkipReason::Whitelisted, .. } => "whitelisted",
            Self::Skipped { reason: SkipReason::SameMessage, .. } => "same_message",
        }
    }
}

/// 处理图片在群组中的一次出现
///
/// # Arguments
///
/// * `db` - 数据库连接池
/// * `group_id` - 群组 ID
/// * `fingerprint` - 图片 dHash
/// * `message_id` - 消息 ID
pub async fn sight(
    db: &Database,
    group_id: i64,
    fingerprint: &Fingerprint,
    message_id: i64,
) -> sqlx::Result<Outcome> {
    // 立即获取写锁，避免两个事务都读到旧值后再争抢升级
    let mut tx = db.begin_with("BEGIN IMMEDIATE").await?;

    let outcome = match crud::record_get(&mut *tx, group_id, fingerprint).await? {
        Some(record) if record.in_whitelist => {
            Outcome::Skipped { reason: SkipReason::Whitelisted, record }
        }
        Some(record) if record.count > 0 && record.last_message_id == message_id => {
            Outcome::Skipped { reason: SkipReason::SameMessage, record }
        }
        Some(previous) if previous.count > 0 => {
            let record =
                crud::record_increment(&mut *tx, group_id, fingerprint, message_id).await?;
            Outcome::Repeated {
                previous_count: previous.count,
                previous_message_id: previous.last_message_id,
                record,
            }
        }
        // 不存在，或仅通过白名单接口创建且已移出白名单
        _ => {
            let record =
                crud::record_increment(&mut *tx, group_id, fingerprint, message_id).await?;
            crud::group_stat_increment(&mut *tx, group_id).await?;
            Outcome::FirstSeen { record }
        }
    };

    tx.commit().await?;

    debug!("群组 {group_id} 消息 {message_id} 图片 {fingerprint}: {}", outcome.label());
    Ok(outcome)
}
