#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供卒中 (stroke) 头部 CT DICOM 数据集的结构化信息和确定性预处理算法:
//! 从按标签组织的目录树出发, 经过 CT 窗口化规范, 最终获得可直接喂给外部训练组件的
//! 对齐张量组.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 以 "根目录下 `0`/`1` 两个标签子目录" 的组织方式为一等公民.
//!   其它组织方式的数据需先按该模式整理.
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//! 3. 逐文件错误 (header 解析失败, 窗口化失败) 会被就地记录并跳过, 不会中断
//!   整个流水线; 结构性错误 (分层样本不足, 计数错位) 会向调用者传播.
//!
//! # 开发计划
//!
//! ### CT window 视图 ✅
//!
//! 提供一个独立的 CT 窗口对象, 以便将 CT HU 值转换为 8-bit 灰度值或 `[0, 1]`
//! 单位区间分布点. 内置脑窗/硬膜下窗/骨窗三个卒中标准窗口.
//!
//! 实现位于 `stroke-berry/src/data/window.rs`.
//!
//! ### DICOM header 元信息提取 ✅
//!
//! 读取 SliceThickness, RescaleSlope, RescaleIntercept, WindowCenter,
//! WindowWidth. 标量字段在提取时统一转为序列, 下游不再做类型判断.
//!
//! 实现位于 `stroke-berry/src/data/meta.rs`.
//!
//! ### 原始像素读取与 HU 换算 ✅
//!
//! 从 PixelData 读取存储值矩阵, 按 `hu = raw * slope + intercept` 换算.
//!
//! 实现位于 `stroke-berry/src/data/mod.rs`.
//!
//! ### 多窗口通道堆叠变换 ✅
//!
//! 对每个配置窗口做 clip + `[0, 1]` 规范化 + 双线性缩放, 然后沿通道维堆叠成
//! `(H, W, C)` 网络输入. 当来源窗口少于所需通道时, 复用最后一个窗口补齐.
//!
//! 实现位于 `stroke-berry/src/transform`.
//!
//! ### 数据集组装 ✅
//!
//! 遍历标签目录树, 建立 (文件路径, 标签) 表和按路径索引的元信息表.
//! 提供递归 + 标签目录过滤、平铺双子目录两种列举策略.
//!
//! 实现位于 `stroke-berry/src/dataset/assemble.rs`.
//!
//! ### 分层划分 ✅
//!
//! 70/20/10 的 train/validation/test 分层划分, 固定种子, 可复现.
//!
//! 实现位于 `stroke-berry/src/dataset/split.rs`.
//!
//! ### 批量物化 ✅
//!
//! 逐文件窗口化, 与切片厚度特征做 best-effort 连接, 校验计数对齐后产出
//! `(N, H, W, C)` 图像张量 + `(N, 1)` 特征 + 标签数组.
//!
//! 实现位于 `stroke-berry/src/dataset/materialize.rs`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private API 提供文档.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 2D DICOM 扫描基础数据结构.
mod data;

pub use data::meta::{HeaderReadError, ScanMeta};
pub use data::window::CtWindow;
pub use data::{RawScan, ReadScanError, RescalePolicy};

pub mod consts;

pub mod transform;

pub mod dataset;
pub mod prelude;
