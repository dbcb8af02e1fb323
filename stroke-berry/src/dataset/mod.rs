//! 数据集操作: 组装, 分层划分, 批量物化.

use std::path::{Path, PathBuf};

pub mod assemble;
pub mod materialize;
pub mod split;

pub use assemble::{MetaFailure, MetaTable, ScanRecord};
pub use materialize::{MaterializeError, SampleBatch, SampleFailure};
pub use split::{SplitError, SplitRatios, SplitTables};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}
