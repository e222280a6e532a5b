use std::sync::LazyLock;

use prometheus::*;

static METRIC_SIGHTING_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "im_dedup_sighting_count",
        "count of the processed sightings by outcome",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_HASH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "im_dedup_hash_duration",
        "duration of decoding and hashing one image in seconds",
        &["size"]
    )
    .unwrap()
});

static METRIC_CACHE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "im_dedup_cache_count",
        "count of the dhash cache lookups",
        &["result"]
    )
    .unwrap()
});

static METRIC_BATCH_SIZE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "im_dedup_batch_size",
        "number of the items in a flushed batch",
        (1..=10).map(|x| x as f64).collect()
    )
    .unwrap()
});

/// 增加判定结果计数
pub fn inc_sighting_count(outcome: &str) {
    METRIC_SIGHTING_COUNT.with_label_values(&[outcome]).inc();
}

pub fn inc_hash_duration(len: usize, duration: f32) {
    METRIC_HASH_DURATION.with_label_values(&[to_fixed_size(len)]).observe(duration as f64);
}

pub fn inc_cache_count(hit: bool) {
    METRIC_CACHE_COUNT.with_label_values(&[if hit { "hit" } else { "miss" }]).inc();
}

pub fn inc_batch_size(size: usize) {
    METRIC_BATCH_SIZE.observe(size as f64);
}

/// 将文件大小调整到几个固定值
fn to_fixed_size(len: usize) -> &'static str {
    const KB: usize = 1024;
    if len <= 64 * KB {
        "64K"
    } else if len <= 256 * KB {
        "256K"
    } else if len <= 1024 * KB {
        "1M"
    } else if len <= 4096 * KB {
        "4M"
    } else {
        "4M+"
    }
}
