use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum_typed_multipart::TypedMultipart;
use log::info;
use serde_json::{Value, json};

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::imdedup::{ImageSource, Sighting, Submission};

/// 记录图片在群组中的一次出现
///
/// 带有关联 ID 的图片会等待整个批次处理完成后返回批次结果
#[utoipa::path(
    post,
    path = "/sighting",
    request_body(content = SightingForm, content_type = "multipart/form-data")
)]
pub async fn sighting_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<SightingRequest>,
) -> Result<Json<Value>> {
    let file_ref = match data.file_ref {
        Some(file_ref) => file_ref,
        None => format!("blake3:{}", blake3::hash(&data.file).to_hex()),
    };
    let sighting = Sighting {
        group_id: data.group_id,
        message_id: data.message_id,
        user_id: data.user_id,
        file_ref,
        correlation_id: data.correlation_id,
        edited: data.edited.unwrap_or(false),
        source: ImageSource::Bytes(data.file.to_vec()),
    };

    let response = match state.db.submit(sighting).await? {
        Submission::Ignored(reason) => json!({ "status": "ignored", "reason": reason }),
        Submission::Done(outcome) => json!({ "status": "done", "outcome": outcome }),
        Submission::Queued { report, .. } => {
            let report = report.await?;
            json!({ "status": "batched", "report": &*report })
        }
        Submission::Dropped => json!({ "status": "dropped" }),
    };
    Ok(Json(response))
}

/// 设置图片是否在群组白名单中
#[utoipa::path(post, path = "/whitelist", request_body = WhitelistRequest)]
pub async fn whitelist_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<WhitelistRequest>,
) -> Result<Json<Value>> {
    info!(
        "群组 {} 图片 {} 白名单: {}",
        data.group_id, data.fingerprint, data.in_whitelist
    );
    state.db.whitelist(data.group_id, &data.fingerprint, data.in_whitelist).await?;
    Ok(Json(json!({})))
}

/// 管理群组用户白名单
#[utoipa::path(post, path = "/user_whitelist", request_body = UserWhitelistRequest)]
pub async fn user_whitelist_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<UserWhitelistRequest>,
) -> Result<Json<Value>> {
    let changed = if data.remove {
        state.db.user_whitelist_remove(data.group_id, data.user_id).await?
    } else {
        state.db.user_whitelist_add(data.group_id, data.user_id).await?
    };
    Ok(Json(json!({ "changed": changed })))
}

/// 查看图片在群组中的记录
#[utoipa::path(get, path = "/info", params(RecordQuery))]
pub async fn info_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<Value>> {
    let record = state.db.info(query.group_id, &query.fingerprint).await?;
    Ok(Json(json!(record)))
}

/// 查找群组中相似的图片
#[utoipa::path(get, path = "/similar", params(SimilarQuery))]
pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SimilarQuery>,
) -> Result<Json<Value>> {
    let distance = query.distance.unwrap_or(state.search.distance);
    let limit = query.limit.unwrap_or(state.search.limit);
    let result = state.db.similar(query.group_id, &query.fingerprint, distance, limit).await?;
    let result = result
        .into_iter()
        .map(|(record, distance)| json!({ "distance": distance, "record": record }))
        .collect::<Vec<_>>();
    Ok(Json(json!({ "result": result })))
}

/// 查看统计信息
#[utoipa::path(get, path = "/stat", params(StatQuery))]
pub async fn stat_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<Value>> {
    let groups = state.db.count_groups().await?;
    let images = match query.group_id {
        Some(group_id) => Some(state.db.group_image_count(group_id).await?),
        None => None,
    };
    Ok(Json(json!({ "groups": groups, "images": images })))
}

/// 以 CSV 格式导出群组的全部记录
#[utoipa::path(get, path = "/export", params(GroupQuery))]
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupQuery>,
) -> Result<impl IntoResponse> {
    let mut buf = Vec::new();
    state.db.export(query.group_id, &mut buf).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], buf))
}

/// prometheus 指标
pub async fn metrics_handler() -> Result<String> {
    let encoder = prometheus::TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}
