use std::io::Cursor;
use std::time::Duration;

use anyhow::Result;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imdedup::config::ConfDir;
use imdedup::dedup::{Outcome, SkipReason};
use imdedup::dhash::Fingerprint;
use imdedup::imdedup::{IgnoreReason, ImageSource, Sighting, Submission};
use imdedup::imgproc::ImageError;
use imdedup::{ImDedup, ImDedupBuilder};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;

/// 每 10 列亮度递减 20 的灰度图，dHash 所有位均为 1
fn decreasing(scale: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(90 * scale, 80 * scale, |x, _| Luma([(255 - 2 * x / scale) as u8]));
    encode(img)
}

/// 亮度从左到右递增，dHash 为 0
fn increasing() -> Vec<u8> {
    encode(GrayImage::from_fn(90, 80, |x, _| Luma([(40 + 2 * x) as u8])))
}

fn encode(img: GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn sighting(group_id: i64, message_id: i64, file_ref: &str, data: &[u8]) -> Sighting {
    Sighting {
        group_id,
        message_id,
        user_id: None,
        file_ref: file_ref.to_string(),
        correlation_id: None,
        edited: false,
        source: ImageSource::Bytes(data.to_vec()),
    }
}

async fn open(dir: &TempDir) -> Result<ImDedup> {
    let conf_dir: ConfDir = dir.path().to_string_lossy().parse()?;
    ImDedupBuilder::new(conf_dir).batch_delay(Duration::from_millis(50)).open().await
}

#[tokio::test]
async fn fingerprint_is_cached_by_file_ref() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;

    let fp = db.fingerprint("file-1", ImageSource::Bytes(decreasing(1))).await?;
    assert_eq!(fp, Fingerprint::new([0xFF; 8]));

    // 命中缓存时不会读取图片
    let missing = dir.path().join("missing.png");
    let cached = db.fingerprint("file-1", ImageSource::File(missing.clone())).await?;
    assert_eq!(cached, fp);

    assert!(db.fingerprint("file-2", ImageSource::File(missing)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn cache_write_failure_does_not_fail_sighting() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;

    let options = SqliteConnectOptions::new().filename(dir.path().join("imdedup.db"));
    let pool = SqlitePool::connect_with(options).await?;
    sqlx::query(
        "CREATE TRIGGER reject_cache BEFORE INSERT ON file_cache BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(&pool)
    .await?;
    pool.close().await;

    let outcome = db.sight(sighting(1, 1, "a", &decreasing(1))).await?;
    assert!(matches!(outcome, Outcome::FirstSeen { .. }));
    assert_eq!(db.info(1, &Fingerprint::new([0xFF; 8])).await?.count, 1);

    // 没有写入缓存，再次查询需要读取图片
    let missing = dir.path().join("missing.png");
    assert!(db.fingerprint("a", ImageSource::File(missing)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn builder_settings() -> Result<()> {
    let dir = TempDir::new()?;
    let conf_dir: ConfDir = dir.path().to_string_lossy().parse()?;
    let db = ImDedupBuilder::new(conf_dir).batch_limit(0).open().await?;
    assert_eq!(db.batch_limit(), 1);
    assert_eq!(db.batch_delay(), Duration::from_millis(1500));
    assert_eq!(db.backend().name(), "portable");
    Ok(())
}

#[tokio::test]
async fn invalid_image_touches_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;

    let err = db.sight(sighting(1, 1, "broken", b"not an image")).await.unwrap_err();
    assert!(err.downcast_ref::<ImageError>().is_some());
    assert_eq!(db.count_groups().await?, 0);
    Ok(())
}

#[tokio::test]
async fn single_sightings() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;
    let a = decreasing(1);
    let a2 = decreasing(2);

    let outcome = db.sight(sighting(1, 100, "a", &a)).await?;
    assert!(matches!(outcome, Outcome::FirstSeen { .. }));

    // 不同文件，相同 dHash
    let outcome = db.sight(sighting(1, 101, "a2", &a2)).await?;
    assert!(matches!(outcome, Outcome::Repeated { previous_count: 1, .. }));
    assert_eq!(outcome.count(), 2);

    let outcome = db.sight(sighting(1, 101, "a2", &a2)).await?;
    assert!(matches!(outcome, Outcome::Skipped { reason: SkipReason::SameMessage, .. }));

    let fp = outcome.record().fingerprint;
    db.whitelist(1, &fp, true).await?;
    let outcome = db.sight(sighting(1, 102, "a", &a)).await?;
    assert!(matches!(outcome, Outcome::Skipped { reason: SkipReason::Whitelisted, .. }));

    let record = db.info(1, &fp).await?;
    assert_eq!((record.count, record.last_message_id, record.in_whitelist), (2, 101, true));
    assert_eq!(db.group_image_count(1).await?, 1);

    let empty = db.info(2, &fp).await?;
    assert_eq!(empty.count, 0);
    Ok(())
}

#[tokio::test]
async fn submit_ignores_whitelisted_users_and_edited_batches() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;
    let a = decreasing(1);

    assert!(db.user_whitelist_add(1, 42).await?);
    assert!(!db.user_whitelist_add(1, 42).await?);

    let mut s = sighting(1, 100, "a", &a);
    s.user_id = Some(42);
    let submission = db.submit(s).await?;
    assert!(matches!(submission, Submission::Ignored(IgnoreReason::UserWhitelisted)));

    // 其他群组不受影响
    let mut s = sighting(2, 100, "a", &a);
    s.user_id = Some(42);
    assert!(matches!(db.submit(s).await?, Submission::Done(Outcome::FirstSeen { .. })));

    let mut s = sighting(1, 101, "a", &a);
    s.correlation_id = Some("album".into());
    s.edited = true;
    assert!(matches!(db.submit(s).await?, Submission::Ignored(IgnoreReason::EditedBatch)));

    assert!(db.user_whitelist_remove(1, 42).await?);
    assert!(!db.user_whitelist_contains(1, 42).await?);
    assert_eq!(db.group_image_count(1).await?, 0);
    Ok(())
}

#[tokio::test]
async fn batch_is_deduplicated_and_truncated() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;
    let a = decreasing(1);
    let a2 = decreasing(2);
    let b = increasing();

    db.sight(sighting(1, 1, "a", &a)).await?;

    let mut items = vec![("a".to_string(), a.clone()), ("a2".to_string(), a2), ("b".to_string(), b.clone())];
    for i in 0..9 {
        items.push((format!("b-{i}"), b.clone()));
    }
    assert_eq!(items.len(), 12);

    let mut receivers = Vec::new();
    let mut dropped = 0;
    for (i, (file_ref, data)) in items.iter().enumerate() {
        let mut s = sighting(1, 10 + i as i64, file_ref, data);
        s.correlation_id = Some("album-1".into());
        match db.submit(s).await? {
            Submission::Queued { armed, report } => {
                assert_eq!(armed, i == 0);
                receivers.push(report);
            }
            Submission::Dropped => dropped += 1,
            other => panic!("unexpected submission: {other:?}"),
        }
    }
    assert_eq!((receivers.len(), dropped), (10, 2));

    let mut reports = Vec::new();
    for rx in receivers {
        reports.push(rx.await?);
    }
    let report = &reports[0];
    assert!(reports.iter().all(|r| r.items.len() == 10));

    assert_eq!(report.items[1].duplicate_of, Some(0));
    assert!(report.items[1].outcome.is_none());
    assert!(report.items[3..].iter().all(|item| item.duplicate_of == Some(2)));
    assert!(matches!(report.items[2].outcome, Some(Outcome::FirstSeen { .. })));

    assert_eq!(report.representative, Some(0));
    let (item, outcome) = report.notification().expect("representative should be repeated");
    assert_eq!(item.file_ref, "a");
    assert_eq!(outcome.count(), 2);

    let a_fp = Fingerprint::new([0xFF; 8]);
    assert_eq!(db.info(1, &a_fp).await?.count, 2);
    assert_eq!(db.info(1, &Fingerprint::default()).await?.count, 1);
    assert_eq!(db.group_image_count(1).await?, 2);
    Ok(())
}

#[tokio::test]
async fn batch_of_new_images_does_not_notify() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;

    let mut s = sighting(1, 1, "b", &increasing());
    s.correlation_id = Some("album-2".into());
    let Submission::Queued { report, .. } = db.submit(s).await? else {
        panic!("expected the item to be queued");
    };
    let report = report.await?;
    assert_eq!(report.representative, Some(0));
    assert!(report.notification().is_none());
    Ok(())
}

#[tokio::test]
async fn similar_and_export() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open(&dir).await?;

    db.sight(sighting(1, 1, "a", &decreasing(1))).await?;
    db.sight(sighting(1, 2, "b", &increasing())).await?;

    let target = Fingerprint::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
    let result = db.similar(1, &target, 6, 10).await?;
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].0.fingerprint, Fingerprint::new([0xFF; 8]));
    assert_eq!(result[0].1, 1);

    let result = db.similar(1, &target, 65, 10).await?;
    assert_eq!(result.iter().map(|(_, d)| *d).collect::<Vec<_>>(), vec![1, 63]);

    let mut buf = Vec::new();
    assert_eq!(db.export(1, &mut buf).await?, 2);
    let csv = String::from_utf8(buf)?;
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("group_id,fingerprint,count,last_message_id,in_whitelist"));
    assert!(csv.contains("1,FFFFFFFFFFFFFFFF,1,1,false"));
    assert!(csv.contains("1,0000000000000000,1,2,false"));
    Ok(())
}
