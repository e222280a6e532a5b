use serde::Serialize;

use crate::dhash::Fingerprint;

/// 群组中一张图片的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct GroupRecord {
    /// 群组 ID
    pub group_id: i64,
    /// 图片 dHash
    #[sqlx(try_from = "Vec<u8>")]
    pub fingerprint: Fingerprint,
    /// 出现次数，仅通过白名单创建的记录为 0
    pub count: i64,
    /// 最后一次出现的消息 ID
    pub last_message_id: i64,
    /// 是否在白名单中
    pub in_whitelist: bool,
}

impl GroupRecord {
    /// 尚未出现过的记录
    pub fn empty(group_id: i64, fingerprint: Fingerprint) -> Self {
        Self { group_id, fingerprint, count: 0, last_message_id: 0, in_whitelist: false }
    }
}

/// 相似查询的结果
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SimilarRecord {
    #[sqlx(flatten)]
    pub record: GroupRecord,
    /// 与目标 dHash 的汉明距离
    pub distance: i64,
}
