use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::dhash::Fingerprint;

/// 记录图片出现的请求参数
#[derive(TryFromMultipart)]
pub struct SightingRequest {
    pub group_id: i64,
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub file_ref: Option<String>,
    pub correlation_id: Option<String>,
    pub edited: Option<bool>,
    pub file: Bytes,
}

/// 记录图片出现的表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SightingForm {
    /// 群组 ID
    pub group_id: i64,
    /// 消息 ID
    pub message_id: i64,
    /// 发送者 ID，在群组用户白名单中时不做处理
    pub user_id: Option<i64>,
    /// 文件的唯一标识，用作 dHash 缓存的键，不填则使用文件内容的 blake3 哈希
    pub file_ref: Option<String>,
    /// 关联 ID，相同关联 ID 的图片会在短暂延迟后作为一批处理
    pub correlation_id: Option<String>,
    /// 是否为编辑过的消息
    pub edited: Option<bool>,
    /// 图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 设置图片白名单的参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct WhitelistRequest {
    pub group_id: i64,
    /// 十六进制形式的 dHash
    #[schema(value_type = String)]
    pub fingerprint: Fingerprint,
    #[schema(default = true)]
    #[serde(default = "default_true")]
    pub in_whitelist: bool,
}

fn default_true() -> bool {
    true
}

/// 设置用户白名单的参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct UserWhitelistRequest {
    pub group_id: i64,
    pub user_id: i64,
    /// 是否移出白名单
    #[schema(default = false)]
    #[serde(default)]
    pub remove: bool,
}

/// 指定群组中的一张图片
#[derive(Debug, Deserialize, IntoParams)]
pub struct RecordQuery {
    pub group_id: i64,
    /// 十六进制形式的 dHash
    #[param(value_type = String)]
    pub fingerprint: Fingerprint,
}

/// 相似查询参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct SimilarQuery {
    pub group_id: i64,
    /// 十六进制形式的 dHash
    #[param(value_type = String)]
    pub fingerprint: Fingerprint,
    /// 汉明距离上限（不含）
    pub distance: Option<u32>,
    /// 最多返回的数量
    pub limit: Option<u32>,
}

/// 群组查询参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct GroupQuery {
    pub group_id: i64,
}

/// 统计查询参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct StatQuery {
    pub group_id: Option<i64>,
}
