//! 数据集组装.
//!
//! 从按标签组织的目录树建立两张独立的表:
//!
//! 1. 扫描表 ([`ScanRecord`] 序列): (文件路径, 标签) 对. 仅接受直接父目录名为
//!   `0`/`1` 的 `.dcm` 文件 (扩展名忽略大小写).
//! 2. 元信息表 ([`MetaTable`]): 按文件路径索引的放射学参数.
//!   对根目录下 **任意位置** 的 `.dcm` 文件都会尝试提取, 不限于标签子目录.
//!
//! 两张表独立构建, 由文件路径关联 (best-effort 连接). 逐文件的提取失败会被
//! 记录并汇总成结构化报告, 不会中断组装流程.

use crate::consts::{label, DCM_EXTENSION};
use crate::data::meta::{read_scan_meta, HeaderReadError, ScanMeta};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 扫描表的一行: 文件路径 (主键) 与二分类标签.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanRecord {
    /// 扫描文件路径.
    pub file_path: PathBuf,

    /// 二分类标签, 取值为 [`label::STROKE_NEGATIVE`] 或 [`label::STROKE_POSITIVE`].
    pub label: u8,
}

/// 元信息提取失败的结构化记录.
#[derive(Debug)]
pub struct MetaFailure {
    /// 出错的文件路径.
    pub path: PathBuf,

    /// 具体错误.
    pub error: HeaderReadError,
}

/// 按文件路径索引的元信息表.
#[derive(Debug, Default, Clone)]
pub struct MetaTable {
    rows: Vec<ScanMeta>,
    index: HashMap<PathBuf, usize>,
}

impl MetaTable {
    /// 从行集合建表. 同一路径出现多次时保留首行.
    pub fn from_rows(rows: Vec<ScanMeta>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.file_path.clone()).or_insert(i);
        }
        Self { rows, index }
    }

    /// 追加一行. 同一路径已存在时保留原行, 新行仅占位不可见.
    pub fn push(&mut self, row: ScanMeta) {
        let i = self.rows.len();
        self.index.entry(row.file_path.clone()).or_insert(i);
        self.rows.push(row);
    }

    /// 按路径查找元信息.
    #[inline]
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<&ScanMeta> {
        self.index.get(path.as_ref()).map(|&i| &self.rows[i])
    }

    /// 按路径查找层厚特征. 无匹配行时返回 0 (best-effort 连接的默认值),
    /// 而不是报错.
    #[inline]
    pub fn slice_thickness_or_zero<P: AsRef<Path>>(&self, path: P) -> f32 {
        self.get(path).map_or(0.0, |m| m.slice_thickness as f32)
    }

    /// 表内行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 表是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 获取能按行迭代元信息的迭代器.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ScanMeta> {
        self.rows.iter()
    }
}

/// 路径扩展名是否是 `.dcm` (忽略大小写)?
fn is_dcm(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DCM_EXTENSION))
}

/// 递归遍历 `root`, 建立扫描表.
///
/// 仅收录直接父目录名为 `0`/`1` 的 `.dcm` 文件; 其余目录在打标签时被跳过
/// (但它们的 `.dcm` 文件仍会被 [`read_meta_table`] 扫描到).
/// 根目录不存在时返回空表并记录 warning, 不视作硬错误.
///
/// 遍历按文件名排序, 因此相同目录树总是产出相同的表.
pub fn read_scan_table<P: AsRef<Path>>(root: P) -> Vec<ScanRecord> {
    let root = root.as_ref();
    if !root.is_dir() {
        warn!("数据集根目录 `{}` 不存在, 返回空扫描表", root.display());
        return Vec::new();
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !is_dcm(entry.path()) {
            continue;
        }
        let lab = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(label::from_dir_name);
        if let Some(lab) = lab {
            out.push(ScanRecord {
                file_path: entry.path().to_owned(),
                label: lab,
            });
        }
    }
    info!("扫描表组装完成: {} 行 (根目录 `{}`)", out.len(), root.display());
    out
}

/// 平铺双子目录策略: 仅列举 `root/0/*.dcm` 和 `root/1/*.dcm`, 不递归.
///
/// 与 [`read_scan_table`] 是两种独立的列举策略; 此策略下标签子目录之外的
/// 文件完全不参与流水线.
pub fn read_scan_table_flat<P: AsRef<Path>>(root: P) -> Vec<ScanRecord> {
    let root = root.as_ref();
    if !root.is_dir() {
        warn!("数据集根目录 `{}` 不存在, 返回空扫描表", root.display());
        return Vec::new();
    }

    let mut out = Vec::new();
    for (dir_name, lab) in [
        ("0", label::STROKE_NEGATIVE),
        ("1", label::STROKE_POSITIVE),
    ] {
        let sub = root.join(dir_name);
        let rd = match fs::read_dir(&sub) {
            Ok(rd) => rd,
            Err(e) => {
                warn!("标签子目录 `{}` 无法列举: {e}", sub.display());
                continue;
            }
        };
        let mut files: Vec<PathBuf> = rd
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_dcm(p))
            .collect();
        files.sort();
        out.extend(files.into_iter().map(|file_path| ScanRecord {
            file_path,
            label: lab,
        }));
    }
    out
}

/// 递归遍历 `root` 下的所有 `.dcm` 文件并尝试提取元信息.
///
/// 提取失败的文件被记录进返回的报告并排除在表外, 组装流程继续;
/// header 损坏不是瞬态故障, 不做重试.
pub fn read_meta_table<P: AsRef<Path>>(root: P) -> (MetaTable, Vec<MetaFailure>) {
    let root = root.as_ref();
    if !root.is_dir() {
        warn!("数据集根目录 `{}` 不存在, 返回空元信息表", root.display());
        return (MetaTable::default(), Vec::new());
    }

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !is_dcm(entry.path()) {
            continue;
        }
        match read_scan_meta(entry.path()) {
            Ok(meta) => rows.push(meta),
            Err(error) => {
                warn!("读取 `{}` 元信息失败: {error}", entry.path().display());
                failures.push(MetaFailure {
                    path: entry.path().to_owned(),
                    error,
                });
            }
        }
    }
    info!(
        "元信息表组装完成: {} 行, 失败 {} 个 (根目录 `{}`)",
        rows.len(),
        failures.len(),
        root.display()
    );
    (MetaTable::from_rows(rows), failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    /// 在临时目录中搭建 `0/` (3 个文件), `1/` (7 个文件) 和一个
    /// 无标签目录 `misc/` (1 个文件) 的布局. 文件内容是垃圾字节,
    /// 只用于目录遍历测试.
    fn fake_layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (sub, n) in [("0", 3), ("1", 7)] {
            let d = dir.path().join(sub);
            fs::create_dir(&d).unwrap();
            for i in 0..n {
                let mut f = File::create(d.join(format!("scan_{i}.dcm"))).unwrap();
                f.write_all(b"not a real dicom").unwrap();
            }
        }
        let misc = dir.path().join("misc");
        fs::create_dir(&misc).unwrap();
        File::create(misc.join("extra.DCM")).unwrap();
        File::create(dir.path().join("0").join("notes.txt")).unwrap();
        dir
    }

    #[test]
    fn test_scan_table_recursive() {
        let dir = fake_layout();
        let table = read_scan_table(dir.path());
        // misc/ 下的文件不计入标签, notes.txt 不是 .dcm.
        assert_eq!(table.len(), 10);
        let neg = table.iter().filter(|r| label::is_negative(r.label)).count();
        let pos = table.iter().filter(|r| label::is_positive(r.label)).count();
        assert_eq!((neg, pos), (3, 7));
    }

    #[test]
    fn test_scan_table_flat() {
        let dir = fake_layout();
        let table = read_scan_table_flat(dir.path());
        assert_eq!(table.len(), 10);
        // 平铺策略与递归策略在该布局下收录相同的文件集合.
        let mut a: Vec<_> = table.iter().map(|r| r.file_path.clone()).collect();
        let mut b: Vec<_> = read_scan_table(dir.path())
            .iter()
            .map(|r| r.file_path.clone())
            .collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_scan_table_case_insensitive_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("1");
        fs::create_dir(&d).unwrap();
        File::create(d.join("upper.DCM")).unwrap();
        File::create(d.join("mixed.Dcm")).unwrap();
        File::create(d.join("other.dicom")).unwrap();
        let table = read_scan_table(dir.path());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_root_yields_empty() {
        let table = read_scan_table("/definitely/not/here");
        assert!(table.is_empty());
        let (meta, failures) = read_meta_table("/definitely/not/here");
        assert!(meta.is_empty());
        assert!(failures.is_empty());
    }

    #[test]
    fn test_meta_table_scans_unlabeled_dirs_and_reports_failures() {
        let dir = fake_layout();
        let (meta, failures) = read_meta_table(dir.path());
        // 布局中的文件都不是合法 DICOM: 全部进入失败报告, 表为空.
        // misc/ 下的文件也被扫描 (11 = 10 + 1).
        assert!(meta.is_empty());
        assert_eq!(failures.len(), 11);
        for f in &failures {
            assert!(matches!(f.error, HeaderReadError::Open(_)));
        }
    }

    #[test]
    fn test_meta_table_lookup_and_default() {
        use crate::data::meta::ScanMeta;
        let row = ScanMeta {
            file_path: PathBuf::from("a.dcm"),
            slice_thickness: 2.5,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            window_centers: vec![40.0],
            window_widths: vec![80.0],
        };
        let table = MetaTable::from_rows(vec![row]);
        assert_eq!(table.len(), 1);
        assert!(table.get("a.dcm").is_some());
        assert_eq!(table.slice_thickness_or_zero("a.dcm"), 2.5);
        // 无匹配行时默认 0, 不报错.
        assert_eq!(table.slice_thickness_or_zero("missing.dcm"), 0.0);
    }
}
