//! 程序运行函数.

use crate::report::FeedSummary;
use std::env;
use std::path::PathBuf;
use std::thread;
use stroke_berry::dataset::materialize::materialize;
use stroke_berry::dataset::split::stratified_split;
use stroke_berry::dataset::{assemble, home_dataset_dir_with};
use stroke_berry::prelude::*;

/// 获取卒中数据集根目录.
///
/// 1. 若环境变量 `$STROKE_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/stroke`.
pub fn data_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("STROKE_DATA_DIR") {
        PathBuf::from(d)
    } else {
        home_dataset_dir_with(["stroke"]).unwrap()
    }
}

/// 获取 `.npy` 输出目录.
///
/// 1. 若环境变量 `$STROKE_OUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `{数据集根目录}/feed_out`.
pub fn out_dir_from_env_or_data(data_dir: &std::path::Path) -> PathBuf {
    if let Ok(d) = env::var("STROKE_OUT_DIR") {
        PathBuf::from(d)
    } else {
        data_dir.join("feed_out")
    }
}

/// 流水线错误. 任一结构性错误都会终止整个流程.
#[derive(Debug)]
pub enum RunError {
    /// 扫描表为空 (根目录不存在, 或其中没有带标签的 `.dcm` 文件).
    EmptyTable(PathBuf),

    /// 分层划分失败.
    Split(SplitError),

    /// 某分区物化失败.
    Materialize(&'static str, MaterializeError),

    /// 输出目录或 `.npy` 文件写出失败.
    Io(std::io::Error),

    /// `.npy` 序列化失败.
    Npy(&'static str, stroke_berry::dataset::materialize::WriteNpyError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTable(root) => {
                write!(f, "`{}` 下没有可用的带标签扫描", root.display())
            }
            Self::Split(e) => write!(f, "分层划分失败: {e}"),
            Self::Materialize(part, e) => write!(f, "分区 `{part}` 物化失败: {e}"),
            Self::Io(e) => write!(f, "IO 错误: {e}"),
            Self::Npy(part, e) => write!(f, "分区 `{part}` 写出失败: {e}"),
        }
    }
}

impl From<SplitError> for RunError {
    fn from(e: SplitError) -> Self {
        Self::Split(e)
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 实际运行.
pub fn run() -> Result<FeedSummary, RunError> {
    let data_dir = data_dir_from_env_or_home();
    let out_dir = out_dir_from_env_or_data(&data_dir);

    println!("组装扫描表: {}", data_dir.display());
    let records = assemble::read_scan_table(&data_dir);
    if records.is_empty() {
        return Err(RunError::EmptyTable(data_dir));
    }

    let (meta, meta_failures) = assemble::read_meta_table(&data_dir);
    println!(
        "扫描表 {} 行, 元信息表 {} 行, 提取失败 {} 个",
        records.len(),
        meta.len(),
        meta_failures.len()
    );

    let tables = stratified_split(&records, SplitRatios::default(), DEFAULT_SPLIT_SEED)?;
    println!(
        "分层划分: train {} / val {} / test {}",
        tables.train.len(),
        tables.val.len(),
        tables.test.len()
    );

    std::fs::create_dir_all(&out_dir)?;

    // 三个分区的物化彼此独立, 可安全并行.
    let cfg = TransformConfig::default();
    let parts = [
        ("train", tables.train.as_slice()),
        ("val", tables.val.as_slice()),
        ("test", tables.test.as_slice()),
    ];
    let results = thread::scope(|s| {
        let meta = &meta;
        let cfg = &cfg;
        let handles =
            parts.map(|(name, part)| (name, s.spawn(move || materialize(part, meta, cfg))));
        handles.map(|(name, th)| (name, th.join().expect("Thread joining error")))
    });

    let mut summary = FeedSummary::new(records.len(), meta_failures);
    for (name, result) in results {
        let (batch, failures) = result.map_err(|e| RunError::Materialize(name, e))?;
        batch
            .save_npy(&out_dir, name)
            .map_err(|e| RunError::Npy(name, e))?;
        summary.push_partition(name, batch.len(), failures);
    }
    summary.set_out_dir(out_dir);
    Ok(summary)
}
