use indicatif::ProgressStyle;

/// 进度条样式
pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}
