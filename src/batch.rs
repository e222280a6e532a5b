//! 按关联 ID 聚合短时间内连续到达的条目
//!
//! 某个关联 ID 的第一个条目到达时启动一个一次性的延迟任务，
//! 延迟结束后取出该 ID 的全部条目交给回调统一处理。
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// 默认的延迟时间
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);
/// 默认的单批最大条目数
pub const DEFAULT_LIMIT: usize = 10;

/// 条目加入缓冲区的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// 新的批次，已启动延迟任务
    Armed,
    /// 加入已有批次
    Appended,
    /// 批次已满，条目被丢弃
    Dropped,
}

pub struct BatchAggregator<T> {
    buffers: Arc<Mutex<HashMap<String, Vec<T>>>>,
    delay: Duration,
    limit: usize,
}

impl<T> Clone for BatchAggregator<T> {
    fn clone(&self) -> Self {
        Self { buffers: self.buffers.clone(), delay: self.delay, limit: self.limit }
    }
}

impl<T: Send + 'static> BatchAggregator<T> {
    /// # Arguments
    ///
    /// * `delay` - 第一个条目到达后等待多久处理整个批次
    /// * `limit` - 单批最大条目数，至少为 1
    pub fn new(delay: Duration, limit: usize) -> Self {
        Self { buffers: Default::default(), delay, limit: limit.max(1) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 将条目加入关联 ID 对应的缓冲区
    ///
    /// 新批次会启动延迟任务，到期后以缓冲区中的全部条目调用 `on_flush`
    pub async fn push<F, Fut>(&self, key: &str, item: T, on_flush: F) -> Push
    where
        F: FnOnce(Vec<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut buffers = self.buffers.lock().await;
        match buffers.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                if entry.get().len() >= self.limit {
                    warn!("批次 {key} 已满 {} 条，丢弃新条目", self.limit);
                    return Push::Dropped;
                }
                entry.get_mut().push(item);
                Push::Appended
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![item]);

                let buffers = self.buffers.clone();
                let delay = self.delay;
                let key = key.to_owned();
                tokio::spawn(async move {
                    sleep(delay).await;
                    let items = buffers.lock().await.remove(&key).unwrap_or_default();
                    debug!("处理批次 {key}，共 {} 条", items.len());
                    on_flush(items).await;
                });
                Push::Armed
            }
        }
    }

    /// 关联 ID 当前缓冲的条目数
    pub async fn pending(&self, key: &str) -> usize {
        self.buffers.lock().await.get(key).map_or(0, Vec::len)
    }
}
