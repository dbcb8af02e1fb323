//! 通用常量.

use crate::CtWindow;
use crate::Idx2d;
use once_cell::sync::Lazy;

/// 二分类标签.
pub mod label {
    /// 阴性 (无卒中征象) 样本的标签值, 即目录名 `0`.
    pub const STROKE_NEGATIVE: u8 = 0;

    /// 阳性 (有卒中征象) 样本的标签值, 即目录名 `1`.
    pub const STROKE_POSITIVE: u8 = 1;

    /// 标签是否为阳性?
    #[inline]
    pub const fn is_positive(label: u8) -> bool {
        matches!(label, STROKE_POSITIVE)
    }

    /// 标签是否为阴性?
    #[inline]
    pub const fn is_negative(label: u8) -> bool {
        matches!(label, STROKE_NEGATIVE)
    }

    /// 从标签目录名解析标签值. 仅接受 `"0"` 和 `"1"`.
    #[inline]
    pub fn from_dir_name(name: &str) -> Option<u8> {
        match name {
            "0" => Some(STROKE_NEGATIVE),
            "1" => Some(STROKE_POSITIVE),
            _ => None,
        }
    }
}

/// 网络输入分辨率, 按 (高, 宽) 存储.
pub const NETWORK_INPUT_RESOLUTION: Idx2d = (299, 299);

/// 数据集划分的默认随机种子. 固定种子保证划分可复现.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// 数据集文件的扩展名 (忽略大小写).
pub const DCM_EXTENSION: &str = "dcm";

/// 卒中头部 CT 的三个标准窗口: 脑窗, 硬膜下窗, 骨窗.
///
/// 每个窗口对应网络输入的一个通道, 顺序固定.
pub static STANDARD_WINDOWS: Lazy<[CtWindow; 3]> = Lazy::new(|| {
    [
        CtWindow::from_brain_visual(),
        CtWindow::from_subdural_visual(),
        CtWindow::from_bone_visual(),
    ]
});

/// 标准窗口个数, 即默认网络输入的通道数.
pub const STANDARD_WINDOW_LEN: usize = 3;
