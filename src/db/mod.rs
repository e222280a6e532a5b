use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use sqlx::{SqlitePool, sqlite::*};

use crate::hamming::{HammingDistance, Portable, SqliteExtension};

pub mod crud;
pub mod model;
pub mod similar;

pub use model::*;

pub type Database = SqlitePool;

/// 打开数据库并选定汉明距离实现
///
/// 指定了扩展路径且扩展可用时使用扩展，否则回退到纯 SQL 实现
pub async fn init_db(
    filename: impl AsRef<Path>,
    hammdist: Option<&Path>,
) -> Result<(Database, Arc<dyn HammingDistance>), sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .filename(filename)
        .create_if_missing(true);

    let mut selected: Option<(Database, Arc<dyn HammingDistance>)> = None;
    if let Some(path) = hammdist {
        let ext = SqliteExtension::new(path);
        match connect_with_extension(options.clone(), &ext).await {
            Ok(pool) => selected = Some((pool, Arc::new(ext))),
            Err(e) => warn!("无法加载汉明距离扩展 {}，使用纯 SQL 实现: {e}", path.display()),
        }
    }
    let (pool, backend) = match selected {
        Some(selected) => selected,
        None => (SqlitePool::connect_with(options).await?, Arc::new(Portable) as _),
    };
    info!("汉明距离实现: {}", backend.name());

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok((pool, backend))
}

async fn connect_with_extension(
    options: SqliteConnectOptions,
    ext: &SqliteExtension,
) -> Result<Database, sqlx::Error> {
    let options = options.extension_with_entrypoint(
        ext.path().to_string_lossy().into_owned(),
        SqliteExtension::ENTRY_POINT,
    );
    let pool = SqlitePool::connect_with(options).await?;

    // 确认函数确实可用
    let probe = format!("SELECT {}(x'00', x'01')", SqliteExtension::FUNCTION);
    match sqlx::query_scalar::<_, i64>(&probe).fetch_one(&pool).await {
        Ok(1) => Ok(pool),
        Ok(other) => {
            pool.close().await;
            Err(sqlx::Error::Protocol(format!("汉明距离扩展返回了错误的结果: {other}")))
        }
        Err(e) => {
            pool.close().await;
            Err(e)
        }
    }
}
