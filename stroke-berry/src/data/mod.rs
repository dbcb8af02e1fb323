//! 2D DICOM 扫描基础数据结构.

use ndarray::{Array2, ArrayView2};
use std::path::Path;

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, InMemDicomObject};

pub mod meta;
pub mod window;

use meta::HeaderReadError;

pub use window::CtWindow;

/// RescaleSlope/RescaleIntercept 缺失时的处理策略.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RescalePolicy {
    /// 严格模式: 字段缺失视作 header 错误并向上传播. 默认行为.
    Strict,

    /// 恒等模式: 字段缺失时显式回退到 `slope = 1, intercept = 0`.
    ///
    /// 仅当调用者明确配置该策略时才会发生回退, 不存在隐式默认值.
    Identity,
}

/// 读取原始扫描像素错误.
#[derive(Debug)]
pub enum ReadScanError {
    /// header 解析错误 (打开失败, 字段缺失或无法转换).
    Header(HeaderReadError),

    /// 不支持的 BitsAllocated 值. 目前仅支持 8 和 16.
    UnsupportedBits(u16),

    /// PixelData 字节数与 `Rows * Columns * (bits / 8)` 不符.
    /// 两个参数依次为期望字节数和实际字节数.
    PixelLength(usize, usize),
}

impl std::fmt::Display for ReadScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Header(e) => write!(f, "{e}"),
            Self::UnsupportedBits(b) => write!(f, "不支持的 BitsAllocated: {b}"),
            Self::PixelLength(expect, actual) => {
                write!(f, "PixelData 长度不符: 期望 {expect} 字节, 实际 {actual} 字节")
            }
        }
    }
}

/// 2D DICOM 扫描的原始像素矩阵与线性标定系数.
///
/// `data` 保存的是文件中的存储值 (stored values), **尚未** 换算为 HU.
/// 需要 HU 矩阵时调用 [`RawScan::to_hu`].
#[derive(Debug, Clone)]
pub struct RawScan {
    data: Array2<f32>,
    rescale_slope: f32,
    rescale_intercept: f32,
}

/// 读取必需的整数字段.
fn required_u16(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<u16, ReadScanError> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .ok_or(ReadScanError::Header(HeaderReadError::MissingField(name)))?
        .to_int::<u16>()
        .map_err(|e| ReadScanError::Header(HeaderReadError::Convert(name, e)))
}

/// 按照 `policy` 读取可回退的标定系数字段.
fn rescale_field(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
    policy: RescalePolicy,
    fallback: f64,
) -> Result<f64, ReadScanError> {
    match obj.element_opt(tag).ok().flatten() {
        Some(elem) => elem
            .to_float64()
            .map_err(|e| ReadScanError::Header(HeaderReadError::Convert(name, e))),
        None => match policy {
            RescalePolicy::Strict => {
                Err(ReadScanError::Header(HeaderReadError::MissingField(name)))
            }
            RescalePolicy::Identity => Ok(fallback),
        },
    }
}

impl RawScan {
    /// 以严格标定策略打开 `path` 处的 DICOM 扫描.
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadScanError> {
        Self::open_with(path, RescalePolicy::Strict)
    }

    /// 以指定标定策略打开 `path` 处的 DICOM 扫描.
    pub fn open_with<P: AsRef<Path>>(path: P, policy: RescalePolicy) -> Result<Self, ReadScanError> {
        let obj = open_file(path.as_ref())
            .map_err(|e| ReadScanError::Header(HeaderReadError::Open(e)))?;
        Self::of_obj(&obj, policy)
    }

    /// 从已在内存中的 DICOM 对象读取原始像素矩阵.
    ///
    /// 支持 BitsAllocated 为 8 或 16 的非封装 (native) 像素编码;
    /// 16-bit 数据按 PixelRepresentation 区分有符号/无符号, 小端字节序.
    pub fn of_obj(obj: &InMemDicomObject, policy: RescalePolicy) -> Result<Self, ReadScanError> {
        let rows = required_u16(obj, tags::ROWS, "Rows")? as usize;
        let cols = required_u16(obj, tags::COLUMNS, "Columns")? as usize;
        let bits = required_u16(obj, tags::BITS_ALLOCATED, "BitsAllocated")?;
        // PixelRepresentation: 0 = 无符号, 1 = 二进制补码.
        let signed = required_u16(obj, tags::PIXEL_REPRESENTATION, "PixelRepresentation")? == 1;

        let rescale_slope =
            rescale_field(obj, tags::RESCALE_SLOPE, "RescaleSlope", policy, 1.0)? as f32;
        let rescale_intercept =
            rescale_field(obj, tags::RESCALE_INTERCEPT, "RescaleIntercept", policy, 0.0)? as f32;

        let bytes = obj
            .element_opt(tags::PIXEL_DATA)
            .ok()
            .flatten()
            .ok_or(ReadScanError::Header(HeaderReadError::MissingField(
                "PixelData",
            )))?
            .to_bytes()
            .map_err(|e| ReadScanError::Header(HeaderReadError::Convert("PixelData", e)))?;

        let pixels: Vec<f32> = match bits {
            8 => {
                if bytes.len() != rows * cols {
                    return Err(ReadScanError::PixelLength(rows * cols, bytes.len()));
                }
                bytes.iter().map(|&b| b as f32).collect()
            }
            16 => {
                if bytes.len() != rows * cols * 2 {
                    return Err(ReadScanError::PixelLength(rows * cols * 2, bytes.len()));
                }
                if signed {
                    bytes
                        .chunks_exact(2)
                        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32)
                        .collect()
                } else {
                    bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32)
                        .collect()
                }
            }
            other => return Err(ReadScanError::UnsupportedBits(other)),
        };

        // 长度已校验, 该操作不会生成 `Err`, 可直接 unwrap.
        let data = Array2::from_shape_vec((rows, cols), pixels).unwrap();

        Ok(Self {
            data,
            rescale_slope,
            rescale_intercept,
        })
    }

    /// 获取存储值矩阵形状, 按 (高, 宽) 返回.
    #[inline]
    pub fn shape(&self) -> crate::Idx2d {
        let s = self.data.dim();
        (s.0, s.1)
    }

    /// 获得存储值矩阵的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// 线性标定斜率.
    #[inline]
    pub fn rescale_slope(&self) -> f32 {
        self.rescale_slope
    }

    /// 线性标定截距.
    #[inline]
    pub fn rescale_intercept(&self) -> f32 {
        self.rescale_intercept
    }

    /// 按 `hu = raw * slope + intercept` 将存储值矩阵换算为 HU 矩阵.
    pub fn to_hu(&self) -> Array2<f32> {
        self.data
            .mapv(|p| p * self.rescale_slope + self.rescale_intercept)
    }

    /// 从裸数据和标定系数直接创建实体.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建与任何硬盘文件都不对应的实体, 因此你应仅将其用于实验目的.
    #[inline]
    pub fn fake(data: Array2<f32>, rescale_slope: f32, rescale_intercept: f32) -> Self {
        Self {
            data,
            rescale_slope,
            rescale_intercept,
        }
    }
}
