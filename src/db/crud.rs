use sqlx::{Executor, Result, Sqlite};

use super::GroupRecord;
use crate::dhash::Fingerprint;

fn decode_fingerprint(blob: Vec<u8>) -> Result<Fingerprint> {
    Fingerprint::try_from(blob).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// 根据文件 ID 获取缓存的 dHash
pub async fn cache_get<'c, E>(executor: E, file_ref: &str) -> Result<Option<Fingerprint>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let blob: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT fingerprint FROM file_cache WHERE file_ref = ?")
            .bind(file_ref)
            .fetch_optional(executor)
            .await?;

    blob.map(decode_fingerprint).transpose()
}

/// 缓存文件 ID 对应的 dHash，已存在时覆盖
pub async fn cache_put<'c, E>(executor: E, file_ref: &str, fingerprint: &Fingerprint) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO file_cache (file_ref, fingerprint)
        VALUES (?, ?)
        ON CONFLICT (file_ref) DO UPDATE SET fingerprint = excluded.fingerprint
        "#,
    )
    .bind(file_ref)
    .bind(&fingerprint[..])
    .execute(executor)
    .await?;

    Ok(())
}

/// 获取群组中某张图片的记录
pub async fn record_get<'c, E>(
    executor: E,
    group_id: i64,
    fingerprint: &Fingerprint,
) -> Result<Option<GroupRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT group_id, fingerprint, count, last_message_id, in_whitelist
        FROM group_record
        WHERE group_id = ? AND fingerprint = ?
        "#,
    )
    .bind(group_id)
    .bind(&fingerprint[..])
    .fetch_optional(executor)
    .await
}

/// 增加图片出现次数并更新最后一次出现的消息 ID，返回更新后的记录
///
/// 记录不存在时以 count = 1 创建
pub async fn record_increment<'c, E>(
    executor: E,
    group_id: i64,
    fingerprint: &Fingerprint,
    message_id: i64,
) -> Result<GroupRecord>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        INSERT INTO group_record (group_id, fingerprint, fingerprint_bits, count, last_message_id)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT (group_id, fingerprint) DO UPDATE
        SET count = count + 1, last_message_id = excluded.last_message_id
        RETURNING group_id, fingerprint, count, last_message_id, in_whitelist
        "#,
    )
    .bind(group_id)
    .bind(&fingerprint[..])
    .bind(fingerprint.bits())
    .bind(message_id)
    .fetch_one(executor)
    .await
}

/// 设置图片是否在白名单中，记录不存在时以 count = 0 创建
pub async fn whitelist_set<'c, E>(
    executor: E,
    group_id: i64,
    fingerprint: &Fingerprint,
    flag: bool,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO group_record (group_id, fingerprint, fingerprint_bits, in_whitelist)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (group_id, fingerprint) DO UPDATE SET in_whitelist = excluded.in_whitelist
        "#,
    )
    .bind(group_id)
    .bind(&fingerprint[..])
    .bind(fingerprint.bits())
    .bind(flag)
    .execute(executor)
    .await?;

    Ok(())
}

/// 群组图片数量加一
pub async fn group_stat_increment<'c, E>(executor: E, group_id: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO group_stat (group_id, image_count)
        VALUES (?, 1)
        ON CONFLICT (group_id) DO UPDATE SET image_count = image_count + 1
        "#,
    )
    .bind(group_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// 群组记录过的不同图片数量
pub async fn group_image_count<'c, E>(executor: E, group_id: i64) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let count: Option<i64> =
        sqlx::query_scalar("SELECT image_count FROM group_stat WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(executor)
            .await?;

    Ok(count.unwrap_or(0))
}

/// 服务过的群组数量
pub async fn count_groups<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM group_stat").fetch_one(executor).await
}

/// 列出群组的所有记录，按出现次数降序
pub async fn list_records<'c, E>(executor: E, group_id: i64) -> Result<Vec<GroupRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT group_id, fingerprint, count, last_message_id, in_whitelist
        FROM group_record
        WHERE group_id = ?
        ORDER BY count DESC, fingerprint ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}

/// 将用户加入群组白名单，返回是否为新加入
pub async fn user_whitelist_add<'c, E>(executor: E, group_id: i64, user_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO group_user_whitelist (group_id, user_id) VALUES (?, ?)",
    )
    .bind(group_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// 将用户移出群组白名单，返回用户之前是否在白名单中
pub async fn user_whitelist_remove<'c, E>(executor: E, group_id: i64, user_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result =
        sqlx::query("DELETE FROM group_user_whitelist WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(executor)
            .await?;

    Ok(result.rows_affected() == 1)
}

/// 用户是否在群组白名单中
pub async fn user_whitelist_contains<'c, E>(executor: E, group_id: i64, user_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM group_user_whitelist WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?;

    Ok(found.is_some())
}
