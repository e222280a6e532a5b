//! 在数据库中按汉明距离查询相似图片
//!
//! 加载了汉明距离扩展时直接调用扩展函数比较 BLOB；否则对整数形式的 dHash 做异或后，
//! 分高低 32 位用 SWAR 方式统计置位数，全部在 SQLite 内完成。
use sqlx::{Executor, Result, Sqlite};

use super::{GroupRecord, SimilarRecord};
use crate::dhash::Fingerprint;
use crate::hamming::{HammingDistance, SqlDistance};

/// 纯 SQL 实现
///
/// 参数依次为：目标 dHash 整数（两次）、群组 ID、距离上限（不含）、数量上限
const PORTABLE_NEAREST: &str = r#"
WITH x AS (
    SELECT group_id, fingerprint, count, last_message_id, in_whitelist,
           (fingerprint_bits | ?) - (fingerprint_bits & ?) AS v
    FROM group_record
    WHERE group_id = ?
),
s1 AS (
    SELECT *,
           (v & 4294967295) - (((v & 4294967295) >> 1) & 1431655765) AS lo1,
           ((v >> 32) & 4294967295) - ((((v >> 32) & 4294967295) >> 1) & 1431655765) AS hi1
    FROM x
),
s2 AS (
    SELECT *,
           (lo1 & 858993459) + ((lo1 >> 2) & 858993459) AS lo2,
           (hi1 & 858993459) + ((hi1 >> 2) & 858993459) AS hi2
    FROM s1
),
s3 AS (
    SELECT *,
           ((((lo2 + (lo2 >> 4)) & 252645135) * 16843009) & 4294967295) >> 24 AS lo3,
           ((((hi2 + (hi2 >> 4)) & 252645135) * 16843009) & 4294967295) >> 24 AS hi3
    FROM s2
),
d AS (
    SELECT group_id, fingerprint, count, last_message_id, in_whitelist, lo3 + hi3 AS distance
    FROM s3
)
SELECT * FROM d
WHERE distance < ?
ORDER BY distance ASC, fingerprint ASC
LIMIT ?
"#;

/// 使用扩展函数的实现
///
/// 参数依次为：目标 dHash、群组 ID、距离上限（不含）、数量上限
fn function_nearest(function: &str) -> String {
    format!(
        r#"
WITH d AS (
    SELECT group_id, fingerprint, count, last_message_id, in_whitelist,
           {function}(fingerprint, ?) AS distance
    FROM group_record
    WHERE group_id = ?
)
SELECT * FROM d
WHERE distance < ?
ORDER BY distance ASC, fingerprint ASC
LIMIT ?
"#
    )
}

/// 查找群组中与目标 dHash 汉明距离小于 `max_distance` 的记录，按距离升序，最多 `limit` 条
pub async fn nearest<'c, E>(
    executor: E,
    backend: &dyn HammingDistance,
    group_id: i64,
    fingerprint: &Fingerprint,
    max_distance: u32,
    limit: u32,
) -> Result<Vec<(GroupRecord, u32)>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows: Vec<SimilarRecord> = match backend.sql() {
        SqlDistance::Portable => {
            sqlx::query_as(PORTABLE_NEAREST)
                .bind(fingerprint.bits())
                .bind(fingerprint.bits())
                .bind(group_id)
                .bind(i64::from(max_distance))
                .bind(i64::from(limit))
                .fetch_all(executor)
                .await?
        }
        SqlDistance::Function(function) => {
            let sql = function_nearest(function);
            sqlx::query_as(&sql)
                .bind(&fingerprint[..])
                .bind(group_id)
                .bind(i64::from(max_distance))
                .bind(i64::from(limit))
                .fetch_all(executor)
                .await?
        }
    };

    Ok(rows.into_iter().map(|r| (r.record, r.distance as u32)).collect())
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::db::{crud, init_db};
    use crate::hamming::{Portable, hamming_naive};

    fn flip(fp: &Fingerprint, bits: &[usize]) -> Fingerprint {
        let mut bytes = *fp.as_bytes();
        for &b in bits {
            bytes[b / 8] ^= 0x80 >> (b % 8);
        }
        Fingerprint::new(bytes)
    }

    #[tokio::test]
    async fn test_nearest_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        let (db, backend) = init_db(dir.path().join("test.db"), None).await.unwrap();

        let target = Fingerprint::new([0xA5, 0x5A, 0xFF, 0x00, 0x12, 0x34, 0x56, 0x78]);
        let d2 = flip(&target, &[0, 63]);
        let d9 = flip(&target, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let d5 = flip(&target, &[10, 20, 30, 40, 50]);
        for (i, fp) in [d2, d9, d5].iter().enumerate() {
            crud::record_increment(&db, 1, fp, i as i64).await.unwrap();
        }
        // 其他群组的记录不参与查询
        crud::record_increment(&db, 2, &target, 1).await.unwrap();

        let result = nearest(&db, backend.as_ref(), 1, &target, 6, 10).await.unwrap();
        let found = result.iter().map(|(r, d)| (r.fingerprint, *d)).collect::<Vec<_>>();
        assert_eq!(found, vec![(d2, 2), (d5, 5)]);

        let result = nearest(&db, backend.as_ref(), 1, &target, 64, 2).await.unwrap();
        assert_eq!(result.len(), 2);

        let result = nearest(&db, backend.as_ref(), 1, &target, 2, 10).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_portable_sql_matches_software() {
        let dir = TempDir::new().unwrap();
        let (db, _) = init_db(dir.path().join("test.db"), None).await.unwrap();

        let mut rng = rand::rng();
        let mut fps = Vec::new();
        for i in 0..64 {
            let mut bytes = [0u8; 8];
            rng.fill_bytes(&mut bytes);
            let fp = Fingerprint::new(bytes);
            crud::record_increment(&db, 7, &fp, i).await.unwrap();
            fps.push(fp);
        }

        let mut bytes = [0u8; 8];
        rng.fill_bytes(&mut bytes);
        let target = Fingerprint::new(bytes);

        let result = nearest(&db, &Portable, 7, &target, 65, 100).await.unwrap();
        assert_eq!(result.len(), 64);
        for (record, distance) in &result {
            assert_eq!(Ok(*distance), hamming_naive(&record.fingerprint, &target));
        }
        assert!(result.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
