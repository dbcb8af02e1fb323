//! 批量物化: 把扫描表的一个分区变成可直接喂给外部训练组件的对齐张量组.
//!
//! 对分区内的每条记录逐文件执行窗口化变换, 与层厚特征做 best-effort 连接.
//! 逐文件失败 (header 缺陷, 非法窗口) 会被记录并整体跳过该文件 —— 图像,
//! 特征和标签一起缩短, 绝不会用占位值顶替. 物化结束后做 **硬性** 计数对齐
//! 校验: 三组序列长度不一致说明出现了数据完整性 bug, 整批失败,
//! 绝不返回部分对齐的数据.

use crate::dataset::assemble::{MetaTable, ScanRecord};
use crate::transform::{preprocess_file, TransformConfig, TransformError};
use itertools::izip;
use log::warn;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis};
use std::path::{Path, PathBuf};

pub use ndarray_npy::WriteNpyError;

/// 单个文件物化失败的结构化记录.
#[derive(Debug)]
pub struct SampleFailure {
    /// 出错的文件路径.
    pub path: PathBuf,

    /// 具体错误.
    pub error: TransformError,
}

/// 批量物化错误. 这类错误是结构性的, 会使整批失败并向调用者传播.
#[derive(Debug)]
pub enum MaterializeError {
    /// 图像/特征/标签三组序列计数不一致.
    /// 三个参数依次为图像数, 特征数, 标签数.
    ///
    /// 这是数据完整性 bug 的信号, 绝不静默修补.
    Alignment(usize, usize, usize),

    /// 分区内出现了不同形状的图像张量.
    /// 两个参数依次为期望形状和实际形状.
    ShapeMismatch(crate::Idx3d, crate::Idx3d),
}

impl std::fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alignment(i, m, l) => {
                write!(f, "计数错位: {i} 个图像, {m} 个特征, {l} 个标签")
            }
            Self::ShapeMismatch(expect, actual) => {
                write!(f, "图像形状不一致: 期望 {expect:?}, 实际 {actual:?}")
            }
        }
    }
}

/// 一个分区物化后的对齐张量组.
///
/// 三个成员按样本索引对齐: 第 `i` 个图像, 第 `i` 个特征和第 `i` 个标签
/// 来自同一个文件.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// 图像张量, 形状 `(N, H, W, C)`, 像素落在 `[0, 1]`.
    pub images: Array4<f32>,

    /// 标量特征 (层厚) 矩阵, 形状 `(N, 1)`.
    pub features: Array2<f32>,

    /// 标签数组, 形状 `(N,)`.
    pub labels: Array1<u8>,
}

impl SampleBatch {
    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// 是否没有样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 获取能按样本迭代 (图像, 特征, 标签) 三元组的迭代器.
    pub fn iter(&self) -> impl Iterator<Item = (ArrayView3<'_, f32>, f32, u8)> {
        izip!(
            self.images.outer_iter(),
            self.features.outer_iter(),
            self.labels.iter()
        )
        .map(|(img, feat, &lab)| (img, feat[0], lab))
    }

    /// 将张量组保存为 `{prefix}_images.npy`, `{prefix}_features.npy`,
    /// `{prefix}_labels.npy` 三个文件. 这是与外部训练组件交接的格式.
    pub fn save_npy<P: AsRef<Path>>(
        &self,
        dir: P,
        prefix: &str,
    ) -> Result<(), ndarray_npy::WriteNpyError> {
        let dir = dir.as_ref();
        ndarray_npy::write_npy(dir.join(format!("{prefix}_images.npy")), &self.images)?;
        ndarray_npy::write_npy(dir.join(format!("{prefix}_features.npy")), &self.features)?;
        ndarray_npy::write_npy(dir.join(format!("{prefix}_labels.npy")), &self.labels)?;
        Ok(())
    }
}

/// 把并行序列拼装成 `SampleBatch`, 并执行硬性对齐校验.
fn assemble_batch(
    images: Vec<Array3<f32>>,
    features: Vec<f32>,
    labels: Vec<u8>,
) -> Result<SampleBatch, MaterializeError> {
    if images.len() != features.len() || images.len() != labels.len() {
        return Err(MaterializeError::Alignment(
            images.len(),
            features.len(),
            labels.len(),
        ));
    }

    if images.is_empty() {
        return Ok(SampleBatch {
            images: Array4::zeros((0, 0, 0, 0)),
            features: Array2::zeros((0, 1)),
            labels: Array1::zeros(0),
        });
    }

    let shape = images[0].dim();
    for img in &images[1..] {
        if img.dim() != shape {
            return Err(MaterializeError::ShapeMismatch(shape, img.dim()));
        }
    }

    let n = images.len();
    let views: Vec<_> = images.iter().map(|i| i.view()).collect();
    // 形状已校验一致, 可直接 unwrap.
    let images = ndarray::stack(Axis(0), &views).unwrap();
    let features = Array2::from_shape_vec((n, 1), features).unwrap();
    let labels = Array1::from_vec(labels);

    Ok(SampleBatch {
        images,
        features,
        labels,
    })
}

/// 以 `loader` 作为逐文件变换入口物化一个分区.
///
/// `loader` 失败的文件被记录进返回的报告并整体跳过 (图像, 特征, 标签
/// 一起缩短); 层厚特征按 best-effort 连接, 无匹配元信息时取 0.
pub fn materialize_with<F>(
    records: &[ScanRecord],
    meta: &MetaTable,
    mut loader: F,
) -> Result<(SampleBatch, Vec<SampleFailure>), MaterializeError>
where
    F: FnMut(&Path) -> Result<Array3<f32>, TransformError>,
{
    let mut images = Vec::with_capacity(records.len());
    let mut features = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    let mut failures = Vec::new();

    for rec in records {
        match loader(&rec.file_path) {
            Ok(img) => {
                images.push(img);
                features.push(meta.slice_thickness_or_zero(&rec.file_path));
                labels.push(rec.label);
            }
            Err(error) => {
                warn!("物化 `{}` 失败: {error}", rec.file_path.display());
                failures.push(SampleFailure {
                    path: rec.file_path.clone(),
                    error,
                });
            }
        }
    }

    assemble_batch(images, features, labels).map(|batch| (batch, failures))
}

/// 按配置的窗口化变换物化一个分区. 逐文件顺序执行.
#[inline]
pub fn materialize(
    records: &[ScanRecord],
    meta: &MetaTable,
    cfg: &TransformConfig,
) -> Result<(SampleBatch, Vec<SampleFailure>), MaterializeError> {
    materialize_with(records, meta, |path| preprocess_file(path, cfg))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// 借助 `rayon`, 并行地物化一个分区.
        ///
        /// 逐文件变换彼此独立, 可以安全并行; 结果带序号收集后 **显式按
        /// 输入序重排**, 再做与顺序版本相同的对齐校验, 因此输出与
        /// [`materialize`] 逐字节一致.
        pub fn par_materialize(
            records: &[ScanRecord],
            meta: &MetaTable,
            cfg: &TransformConfig,
        ) -> Result<(SampleBatch, Vec<SampleFailure>), MaterializeError> {
            let mut results: Vec<(usize, Result<Array3<f32>, TransformError>)> = records
                .par_iter()
                .enumerate()
                .map(|(i, rec)| (i, preprocess_file(&rec.file_path, cfg)))
                .collect();
            results.sort_by_key(|&(i, _)| i);

            let mut images = Vec::with_capacity(records.len());
            let mut features = Vec::with_capacity(records.len());
            let mut labels = Vec::with_capacity(records.len());
            let mut failures = Vec::new();
            for (i, result) in results {
                let rec = &records[i];
                match result {
                    Ok(img) => {
                        images.push(img);
                        features.push(meta.slice_thickness_or_zero(&rec.file_path));
                        labels.push(rec.label);
                    }
                    Err(error) => {
                        warn!("物化 `{}` 失败: {error}", rec.file_path.display());
                        failures.push(SampleFailure {
                            path: rec.file_path.clone(),
                            error,
                        });
                    }
                }
            }

            assemble_batch(images, features, labels).map(|batch| (batch, failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::{STROKE_NEGATIVE, STROKE_POSITIVE};
    use crate::data::meta::ScanMeta;
    use ndarray::Array3;
    use std::path::PathBuf;

    fn records_3() -> Vec<ScanRecord> {
        vec![
            ScanRecord {
                file_path: PathBuf::from("a.dcm"),
                label: STROKE_NEGATIVE,
            },
            ScanRecord {
                file_path: PathBuf::from("b.dcm"),
                label: STROKE_POSITIVE,
            },
            ScanRecord {
                file_path: PathBuf::from("c.dcm"),
                label: STROKE_POSITIVE,
            },
        ]
    }

    fn meta_for(path: &str, thickness: f64) -> ScanMeta {
        ScanMeta {
            file_path: PathBuf::from(path),
            slice_thickness: thickness,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            window_centers: vec![40.0],
            window_widths: vec![80.0],
        }
    }

    fn const_image(v: f32) -> Array3<f32> {
        Array3::from_elem((2, 2, 1), v)
    }

    #[test]
    fn test_materialize_aligned_output() {
        let records = records_3();
        let meta = MetaTable::from_rows(vec![meta_for("a.dcm", 5.0), meta_for("b.dcm", 2.5)]);
        let (batch, failures) =
            materialize_with(&records, &meta, |_| Ok(const_image(0.5))).unwrap();
        assert!(failures.is_empty());
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.images.dim(), (3, 2, 2, 1));
        assert_eq!(batch.features.dim(), (3, 1));
        // b.dcm 有元信息, c.dcm 没有 (默认 0).
        assert_eq!(batch.features[(0, 0)], 5.0);
        assert_eq!(batch.features[(1, 0)], 2.5);
        assert_eq!(batch.features[(2, 0)], 0.0);
        assert_eq!(batch.labels.to_vec(), vec![0, 1, 1]);
    }

    #[test]
    fn test_failed_file_shrinks_all_sequences_together() {
        let records = records_3();
        let meta = MetaTable::from_rows(vec![meta_for("b.dcm", 2.5)]);
        // 第二个文件故意失败: 图像/特征/标签一起缩短, 而不是只缩短一边.
        let (batch, failures) = materialize_with(&records, &meta, |path| {
            if path.ends_with("b.dcm") {
                Err(TransformError::NoWindows)
            } else {
                Ok(const_image(0.1))
            }
        })
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.images.dim().0, 2);
        assert_eq!(batch.features.dim().0, 2);
        assert_eq!(batch.labels.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, PathBuf::from("b.dcm"));
        // 幸存样本保持原始顺序与标签.
        assert_eq!(batch.labels.to_vec(), vec![0, 1]);
    }

    #[test]
    fn test_shape_mismatch_fails_whole_batch() {
        let records = records_3();
        let meta = MetaTable::default();
        let mut turn = 0;
        let err = materialize_with(&records, &meta, |_| {
            turn += 1;
            if turn == 2 {
                Ok(Array3::from_elem((3, 3, 1), 0.0))
            } else {
                Ok(const_image(0.0))
            }
        })
        .unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::ShapeMismatch((2, 2, 1), (3, 3, 1))
        ));
    }

    #[test]
    fn test_alignment_check_rejects_mismatch() {
        let err = assemble_batch(vec![const_image(0.0)], vec![1.0, 2.0], vec![0]).unwrap_err();
        assert!(matches!(err, MaterializeError::Alignment(1, 2, 1)));
    }

    #[test]
    fn test_empty_partition() {
        let meta = MetaTable::default();
        let (batch, failures) =
            materialize_with(&[], &meta, |_| Ok(const_image(0.0))).unwrap();
        assert!(batch.is_empty());
        assert!(failures.is_empty());
    }

    #[test]
    fn test_sample_iter() {
        let records = records_3();
        let meta = MetaTable::from_rows(vec![meta_for("a.dcm", 4.0)]);
        let (batch, _) = materialize_with(&records, &meta, |_| Ok(const_image(0.25))).unwrap();
        let mut it = batch.iter();
        let (img, feat, lab) = it.next().unwrap();
        assert_eq!(img.dim(), (2, 2, 1));
        assert_eq!(feat, 4.0);
        assert_eq!(lab, 0);
        assert_eq!(it.count(), 2);
    }

    #[test]
    fn test_save_npy_round_trip() {
        let records = records_3();
        let meta = MetaTable::default();
        let (batch, _) = materialize_with(&records, &meta, |_| Ok(const_image(0.75))).unwrap();

        let dir = tempfile::tempdir().unwrap();
        batch.save_npy(dir.path(), "train").unwrap();

        let images: Array4<f32> =
            ndarray_npy::read_npy(dir.path().join("train_images.npy")).unwrap();
        let labels: Array1<u8> =
            ndarray_npy::read_npy(dir.path().join("train_labels.npy")).unwrap();
        assert_eq!(images, batch.images);
        assert_eq!(labels, batch.labels);
    }
}
