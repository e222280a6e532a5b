use std::sync::Arc;

use crate::cli::server::ServerCommand;
use crate::config::SimilarOptions;
use crate::imdedup::ImDedup;

/// 应用状态
pub struct AppState {
    /// 数据库
    pub db: ImDedup,
    /// 相似查询的默认参数
    pub search: SimilarOptions,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: ImDedup, opts: ServerCommand) -> Arc<Self> {
        Arc::new(AppState { db, search: opts.search, token: opts.token })
    }
}
