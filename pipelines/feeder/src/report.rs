//! 流水线结果汇总.

use std::io::{self, Write};
use std::path::PathBuf;
use stroke_berry::dataset::assemble::MetaFailure;
use stroke_berry::dataset::materialize::SampleFailure;

const SEP: &str = "--------------------------------------------------------";

/// 单个分区的物化统计.
struct PartitionStat {
    name: &'static str,
    materialized: usize,
    failures: Vec<SampleFailure>,
}

/// 流水线最终结果.
pub struct FeedSummary {
    scan_rows: usize,
    meta_failures: Vec<MetaFailure>,
    partitions: Vec<PartitionStat>,
    out_dir: Option<PathBuf>,
}

impl FeedSummary {
    /// 创建汇总, 记录组装阶段的统计.
    pub fn new(scan_rows: usize, meta_failures: Vec<MetaFailure>) -> Self {
        Self {
            scan_rows,
            meta_failures,
            partitions: Vec::with_capacity(3),
            out_dir: None,
        }
    }

    /// 追加一个分区的物化统计.
    pub fn push_partition(
        &mut self,
        name: &'static str,
        materialized: usize,
        failures: Vec<SampleFailure>,
    ) {
        self.partitions.push(PartitionStat {
            name,
            materialized,
            failures,
        });
    }

    /// 记录输出目录.
    pub fn set_out_dir(&mut self, dir: PathBuf) {
        self.out_dir = Some(dir);
    }

    /// 将汇总写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        writeln!(w, "{SEP}")?;
        writeln!(w, "扫描表共 {} 行", self.scan_rows)?;
        writeln!(w, "元信息提取失败 {} 个:", self.meta_failures.len())?;
        for f in &self.meta_failures {
            writeln!(w, "{S4}{}: {}", f.path.display(), f.error)?;
        }
        for p in &self.partitions {
            writeln!(
                w,
                "分区 `{}`: 物化 {} 个, 跳过 {} 个",
                p.name,
                p.materialized,
                p.failures.len()
            )?;
            for f in &p.failures {
                writeln!(w, "{S4}{}: {}", f.path.display(), f.error)?;
            }
        }
        if let Some(dir) = &self.out_dir {
            writeln!(w, "`.npy` 已写入 {}", dir.display())?;
        }
        writeln!(w, "{SEP}")?;
        Ok(())
    }

    /// 将汇总打印到标准输出.
    pub fn print(&self) {
        let stdout = io::stdout();
        self.describe_into(&mut stdout.lock())
            .expect("Writing summary to stdout error");
    }
}
