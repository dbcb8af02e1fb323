//! DICOM header 元信息提取.
//!
//! 每个扫描文件的放射学参数 (层厚, 线性标定系数, 窗位/窗宽列表) 在这里一次性
//! 提取并规整. 标量形式的窗位/窗宽会在提取时被强制转换为单元素序列,
//! 下游消费者永远只面对序列形式.

use dicom::core::value::ConvertValueError;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, InMemDicomObject};
use std::path::{Path, PathBuf};

/// 读取 header 元信息错误.
#[derive(Debug)]
pub enum HeaderReadError {
    /// 文件无法作为 DICOM 对象打开或解析.
    Open(dicom::object::ReadError),

    /// 缺少必需的 header 字段. 参数为字段名.
    MissingField(&'static str),

    /// header 字段存在, 但无法转换为期望的数值形式.
    Convert(&'static str, ConvertValueError),

    /// WindowCenter 与 WindowWidth 序列长度不一致.
    /// 两个参数依次为 centers 长度和 widths 长度.
    WindowListMismatch(usize, usize),
}

impl std::fmt::Display for HeaderReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "无法打开 DICOM 文件: {e}"),
            Self::MissingField(name) => write!(f, "缺少 header 字段 `{name}`"),
            Self::Convert(name, e) => write!(f, "header 字段 `{name}` 无法转为数值: {e}"),
            Self::WindowListMismatch(c, w) => {
                write!(f, "WindowCenter/WindowWidth 长度不一致: {c} vs {w}")
            }
        }
    }
}

/// 单个扫描文件的放射学元信息.
///
/// 该结构与 [`crate::dataset::ScanRecord`] 通过 `file_path` 关联
/// (best-effort 连接: 提取失败的文件没有对应记录).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanMeta {
    /// 扫描文件路径, 作为元信息表的主键.
    pub file_path: PathBuf,

    /// 层厚, 以毫米为单位. 作为标量特征与图像张量一同输出.
    pub slice_thickness: f64,

    /// 线性标定斜率. 存储值换算 HU: `hu = raw * slope + intercept`.
    pub rescale_slope: f64,

    /// 线性标定截距.
    pub rescale_intercept: f64,

    /// header 建议的窗位序列. 标量字段已被规整为单元素序列.
    pub window_centers: Vec<f64>,

    /// header 建议的窗宽序列. 与 `window_centers` 等长.
    pub window_widths: Vec<f64>,
}

/// 读取必需的标量字段.
fn required_f64(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<f64, HeaderReadError> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .ok_or(HeaderReadError::MissingField(name))?
        .to_float64()
        .map_err(|e| HeaderReadError::Convert(name, e))
}

/// 读取必需的数值序列字段. 标量值会得到单元素序列.
fn required_f64_list(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<Vec<f64>, HeaderReadError> {
    let list = obj
        .element_opt(tag)
        .ok()
        .flatten()
        .ok_or(HeaderReadError::MissingField(name))?
        .to_multi_float64()
        .map_err(|e| HeaderReadError::Convert(name, e))?;
    if list.is_empty() {
        return Err(HeaderReadError::MissingField(name));
    }
    Ok(list)
}

/// 从已在内存中的 DICOM 对象提取元信息. `path` 仅用于填充主键.
///
/// 必需字段: SliceThickness, RescaleSlope, RescaleIntercept,
/// WindowCenter, WindowWidth. 任一字段缺失或无法转换则返回 `Err`.
pub fn scan_meta_of<P: AsRef<Path>>(
    path: P,
    obj: &InMemDicomObject,
) -> Result<ScanMeta, HeaderReadError> {
    let slice_thickness = required_f64(obj, tags::SLICE_THICKNESS, "SliceThickness")?;
    let rescale_slope = required_f64(obj, tags::RESCALE_SLOPE, "RescaleSlope")?;
    let rescale_intercept = required_f64(obj, tags::RESCALE_INTERCEPT, "RescaleIntercept")?;
    let window_centers = required_f64_list(obj, tags::WINDOW_CENTER, "WindowCenter")?;
    let window_widths = required_f64_list(obj, tags::WINDOW_WIDTH, "WindowWidth")?;

    if window_centers.len() != window_widths.len() {
        return Err(HeaderReadError::WindowListMismatch(
            window_centers.len(),
            window_widths.len(),
        ));
    }

    Ok(ScanMeta {
        file_path: path.as_ref().to_owned(),
        slice_thickness,
        rescale_slope,
        rescale_intercept,
        window_centers,
        window_widths,
    })
}

/// 打开 `path` 处的 DICOM 文件并提取元信息.
///
/// header 损坏不是瞬态故障, 因此失败时不做重试; 调用者应记录错误并将该文件
/// 排除在元信息表之外, 而不是中断整个提取流程.
pub fn read_scan_meta<P: AsRef<Path>>(path: P) -> Result<ScanMeta, HeaderReadError> {
    let obj = open_file(path.as_ref()).map_err(HeaderReadError::Open)?;
    scan_meta_of(path, &obj)
}
