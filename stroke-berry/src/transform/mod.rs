//! 多窗口通道堆叠变换.
//!
//! 把单张 DICOM 扫描变换为网络输入张量: 对每个配置窗口做 clip + `[0, 1]`
//! 规范化, 双线性缩放到固定分辨率, 再沿通道维堆叠. 输出形状为
//! `(H, W, 窗口数)`.
//!
//! 规范化约定: 所有通道像素都落在 `[0, 1]` 区间内 ([`CtWindow::eval_unit`]).
//! 外部训练组件的输入规范化依赖该约定, 不可更改.

use crate::data::meta::{HeaderReadError, ScanMeta};
use crate::data::{RawScan, ReadScanError, RescalePolicy};
use crate::{consts, CtWindow, Idx2d};
use dicom::object::{open_file, InMemDicomObject};
use image::{imageops, ImageBuffer, Luma};
use ndarray::{Array2, Array3, Axis};
use std::path::Path;

/// 窗口化变换错误.
#[derive(Debug)]
pub enum TransformError {
    /// 扫描读取错误 (打开失败, header 缺陷, 像素数据缺陷).
    Scan(ReadScanError),

    /// 配置或 header 给出的窗口参数非法 (窗宽必须为正).
    /// 两个参数依次为窗位和窗宽.
    InvalidWindow(f64, f64),

    /// 没有可用的窗口 (配置窗口列表为空, 或要求的通道数为 0).
    NoWindows,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan(e) => write!(f, "{e}"),
            Self::InvalidWindow(c, w) => write!(f, "非法窗口参数: 窗位 {c}, 窗宽 {w}"),
            Self::NoWindows => write!(f, "没有可用的窗口"),
        }
    }
}

impl From<ReadScanError> for TransformError {
    #[inline]
    fn from(e: ReadScanError) -> Self {
        Self::Scan(e)
    }
}

impl From<HeaderReadError> for TransformError {
    #[inline]
    fn from(e: HeaderReadError) -> Self {
        Self::Scan(ReadScanError::Header(e))
    }
}

/// 窗口化变换配置.
///
/// 默认配置即外部训练组件期望的输入形式: 脑窗/硬膜下窗/骨窗三通道,
/// 299x299 分辨率, 严格标定策略.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// 各通道的窗口预设, 顺序即通道顺序.
    pub windows: Vec<CtWindow>,

    /// 网络输入分辨率, 按 (高, 宽) 存储.
    pub resolution: Idx2d,

    /// RescaleSlope/RescaleIntercept 缺失时的处理策略.
    pub rescale: RescalePolicy,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            windows: consts::STANDARD_WINDOWS.to_vec(),
            resolution: consts::NETWORK_INPUT_RESOLUTION,
            rescale: RescalePolicy::Strict,
        }
    }
}

/// 将单位区间图像按双线性插值缩放到 `(h, w)`.
///
/// Triangle (双线性) 核的权重非负且和为 1, 因此输出仍落在输入值域的凸包内,
/// `[0, 1]` 边界不会被插值越过.
fn resize_unit(img: &Array2<f32>, (h, w): Idx2d) -> Array2<f32> {
    let (ih, iw) = img.dim();
    if (ih, iw) == (h, w) {
        return img.clone();
    }

    // 行优先数据可直接搬进行优先的 ImageBuffer. 长度匹配, 可直接 unwrap.
    let buf: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(iw as u32, ih as u32, img.iter().copied().collect()).unwrap();
    let resized = imageops::resize(&buf, w as u32, h as u32, imageops::FilterType::Triangle);

    // 形状匹配, 可直接 unwrap.
    Array2::from_shape_vec((h, w), resized.into_raw()).unwrap()
}

/// 对 HU 矩阵应用一组窗口, 产出 `(H, W, 窗口数)` 的通道堆叠张量.
///
/// 每个通道独立做 clip + `[0, 1]` 规范化 + 双线性缩放. 非有限的 HU 值
/// (上游数据缺陷) 按窗下限处理, 不会产生 NaN 输出.
///
/// 当 `windows` 为空时程序 panic; 空窗口列表应在配置层被
/// [`TransformError::NoWindows`] 拦截.
pub fn window_stack(hu: &Array2<f32>, windows: &[CtWindow], resolution: Idx2d) -> Array3<f32> {
    assert!(!windows.is_empty(), "窗口列表为空");

    let channels: Vec<Array2<f32>> = windows
        .iter()
        .map(|win| {
            let unit = hu.mapv(|v| win.eval_unit(v).unwrap_or(0.0));
            resize_unit(&unit, resolution)
        })
        .collect();

    let views: Vec<_> = channels.iter().map(|c| c.view()).collect();
    // 所有通道形状一致, 可直接 unwrap.
    ndarray::stack(Axis(2), &views).unwrap()
}

/// 从 header 元信息构建 `channels` 个窗口.
///
/// 当 header 给出的窗口少于所需通道数时, **复用最后一个窗口** 补齐剩余通道.
/// 这是确定性的回退规则, 永远不会用零窗填充. 窗宽非正的 header 窗口返回
/// [`TransformError::InvalidWindow`].
pub fn windows_for_channels(
    meta: &ScanMeta,
    channels: usize,
) -> Result<Vec<CtWindow>, TransformError> {
    if channels == 0 || meta.window_centers.is_empty() {
        return Err(TransformError::NoWindows);
    }

    let mut out = Vec::with_capacity(channels);
    for i in 0..channels {
        let j = i.min(meta.window_centers.len() - 1);
        let (c, w) = (meta.window_centers[j], meta.window_widths[j]);
        let win =
            CtWindow::new(c as f32, w as f32).ok_or(TransformError::InvalidWindow(c, w))?;
        out.push(win);
    }
    Ok(out)
}

/// 对已读取的原始扫描应用配置窗口.
pub fn preprocess_scan(scan: &RawScan, cfg: &TransformConfig) -> Result<Array3<f32>, TransformError> {
    if cfg.windows.is_empty() {
        return Err(TransformError::NoWindows);
    }
    Ok(window_stack(&scan.to_hu(), &cfg.windows, cfg.resolution))
}

/// 对内存中的 DICOM 对象应用配置窗口.
pub fn preprocess_obj(
    obj: &InMemDicomObject,
    cfg: &TransformConfig,
) -> Result<Array3<f32>, TransformError> {
    let scan = RawScan::of_obj(obj, cfg.rescale)?;
    preprocess_scan(&scan, cfg)
}

/// 打开 `path` 处的 DICOM 扫描并应用配置窗口 (默认即标准三窗口).
///
/// 这是批量物化阶段逐文件调用的变换入口.
pub fn preprocess_file<P: AsRef<Path>>(
    path: P,
    cfg: &TransformConfig,
) -> Result<Array3<f32>, TransformError> {
    let scan = RawScan::open_with(path, cfg.rescale)?;
    preprocess_scan(&scan, cfg)
}

/// 打开 `path` 处的 DICOM 扫描, 改用 **扫描自身 header 建议的窗口**
/// 构建 `channels` 个通道.
///
/// header 窗口不足时按 [`windows_for_channels`] 的规则复用最后一个窗口.
pub fn preprocess_file_header_windows<P: AsRef<Path>>(
    path: P,
    channels: usize,
    cfg: &TransformConfig,
) -> Result<Array3<f32>, TransformError> {
    let obj = open_file(path.as_ref())
        .map_err(|e| TransformError::from(HeaderReadError::Open(e)))?;
    let meta = crate::data::meta::scan_meta_of(path.as_ref(), &obj)?;
    let windows = windows_for_channels(&meta, channels)?;
    let scan = RawScan::of_obj(&obj, cfg.rescale)?;
    Ok(window_stack(&scan.to_hu(), &windows, cfg.resolution))
}

/// 将 HU 矩阵按给定窗口保存为 8-bit 灰度 PNG, 用于人工检查.
///
/// 图像按原始分辨率保存, 不做缩放.
pub fn save_window_preview<P: AsRef<Path>>(
    hu: &Array2<f32>,
    window: CtWindow,
    path: P,
) -> image::ImageResult<()> {
    let (height, width) = hu.dim();
    let mut buf = image::GrayImage::new(width as u32, height as u32);
    for ((h, w), &v) in hu.indexed_iter() {
        let gray = window.eval(v).unwrap_or(u8::MIN);
        buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
    }
    buf.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::path::PathBuf;

    fn meta_with_windows(centers: Vec<f64>, widths: Vec<f64>) -> ScanMeta {
        ScanMeta {
            file_path: PathBuf::from("t.dcm"),
            slice_thickness: 5.0,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            window_centers: centers,
            window_widths: widths,
        }
    }

    #[test]
    fn test_window_stack_shape_and_bounds() {
        let hu = array![[-2000.0_f32, 0.0], [40.0, 4000.0]];
        let windows = crate::consts::STANDARD_WINDOWS.to_vec();
        let out = window_stack(&hu, &windows, (4, 4));
        assert_eq!(out.dim(), (4, 4, 3));
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v), "像素越界: {v}");
        }
    }

    #[test]
    fn test_window_stack_non_finite_input() {
        let hu = array![[f32::NAN, f32::INFINITY], [0.0, 40.0]];
        let out = window_stack(&hu, &[CtWindow::from_brain_visual()], (2, 2));
        for &v in out.iter() {
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
        // inf 在 eval_unit 中为 None, 按窗下限处理.
        assert_eq!(out[(0, 1, 0)], 0.0);
    }

    #[test]
    fn test_window_stack_identity_resolution() {
        let hu = array![[0.0_f32, 80.0], [40.0, 20.0]];
        let out = window_stack(&hu, &[CtWindow::from_brain_visual()], (2, 2));
        assert_eq!(out.dim(), (2, 2, 1));
        assert_eq!(out[(0, 0, 0)], 0.0);
        assert_eq!(out[(0, 1, 0)], 1.0);
        assert_eq!(out[(1, 0, 0)], 0.5);
        assert_eq!(out[(1, 1, 0)], 0.25);
    }

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let img = Array2::from_elem((3, 3), 0.5_f32);
        let out = resize_unit(&img, (7, 5));
        assert_eq!(out.dim(), (7, 5));
        for &v in out.iter() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_windows_for_channels_reuses_last() {
        // header 只有一个窗口, 但需要三个通道: 最后一个窗口被复用.
        let meta = meta_with_windows(vec![40.0], vec![80.0]);
        let windows = windows_for_channels(&meta, 3).unwrap();
        assert_eq!(windows.len(), 3);
        for w in &windows {
            assert_eq!(w.level(), 40.0);
            assert_eq!(w.width(), 80.0);
        }

        // 两个窗口, 三个通道: 第三个通道复用第二个窗口.
        let meta = meta_with_windows(vec![40.0, 80.0], vec![80.0, 200.0]);
        let windows = windows_for_channels(&meta, 3).unwrap();
        assert_eq!(windows[0].level(), 40.0);
        assert_eq!(windows[1].level(), 80.0);
        assert_eq!(windows[2].level(), 80.0);
    }

    #[test]
    fn test_windows_for_channels_rejects_zero_width() {
        let meta = meta_with_windows(vec![40.0, 80.0], vec![80.0, 0.0]);
        let err = windows_for_channels(&meta, 2).unwrap_err();
        assert!(matches!(err, TransformError::InvalidWindow(c, w)
            if c == 80.0 && w == 0.0));
    }

    #[test]
    fn test_preprocess_scan_empty_windows() {
        let scan = RawScan::fake(Array2::zeros((2, 2)), 1.0, 0.0);
        let cfg = TransformConfig {
            windows: Vec::new(),
            ..TransformConfig::default()
        };
        assert!(matches!(
            preprocess_scan(&scan, &cfg),
            Err(TransformError::NoWindows)
        ));
    }

    #[test]
    fn test_preprocess_scan_default_config() {
        let scan = RawScan::fake(array![[0.0_f32, 1024.0], [2048.0, 4096.0]], 1.0, -1024.0);
        let cfg = TransformConfig::default();
        let out = preprocess_scan(&scan, &cfg).unwrap();
        assert_eq!(out.dim(), (299, 299, 3));
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
