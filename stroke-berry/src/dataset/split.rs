//! 数据集分层划分.
//!
//! 按 70/20/10 的目标比例把扫描表划分为 train/validation/test 三个两两不交的
//! 分区, 每个分区保持与全表一致的标签比例 (分层抽样). 划分分两步进行:
//! 先分出 test (10%), 再从剩余部分按 `0.2 / 0.9` 分出 validation,
//! 与原始实现的两次 `train_test_split` 调用一致.
//!
//! 随机性完全由显式种子驱动, 并且输入表在洗牌前先按文件路径规范化排序,
//! 因此相同的表 (无论行序如何) 总是产出逐字节相同的分区.

use crate::dataset::ScanRecord;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// 三分区目标比例. 只读; 构造时校验.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SplitRatios {
    train: f64,
    val: f64,
    test: f64,
}

impl SplitRatios {
    /// 构建目标比例. 三个分量必须均为正且和为 1 (容差 1e-6), 否则返回 `None`.
    pub fn new(train: f64, val: f64, test: f64) -> Option<SplitRatios> {
        let sum = train + val + test;
        if train > 0.0 && val > 0.0 && test > 0.0 && (sum - 1.0).abs() <= 1e-6 {
            Some(Self { train, val, test })
        } else {
            None
        }
    }

    /// train 比例.
    #[inline]
    pub fn train(&self) -> f64 {
        self.train
    }

    /// validation 比例.
    #[inline]
    pub fn val(&self) -> f64 {
        self.val
    }

    /// test 比例.
    #[inline]
    pub fn test(&self) -> f64 {
        self.test
    }
}

/// 默认 70% train / 20% validation / 10% test.
impl Default for SplitRatios {
    #[inline]
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.2,
            test: 0.1,
        }
    }
}

/// 划分结果: 两两不交的三张子表, 并集等于输入表.
#[derive(Debug, Clone)]
pub struct SplitTables {
    /// 训练子表, 约占 70%.
    pub train: Vec<ScanRecord>,

    /// 验证子表, 约占 20%.
    pub val: Vec<ScanRecord>,

    /// 测试子表, 约占 10%.
    pub test: Vec<ScanRecord>,
}

impl SplitTables {
    /// 三张子表的总行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// 是否全部为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 划分错误.
#[derive(Debug)]
pub enum SplitError {
    /// 某标签类的样本太少, 无法按请求的比例分层.
    /// 两个参数依次为标签值和该类的样本数.
    ///
    /// 该错误无法通过重试恢复; 调用者应调整比例或补充数据.
    InsufficientSamples(u8, usize),
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientSamples(lab, cnt) => {
                write!(f, "标签 `{lab}` 仅有 {cnt} 个样本, 不足以分层划分")
            }
        }
    }
}

/// 对 `records` 做一次二分的分层划分, 第二部分的目标占比为 `frac`.
///
/// 每类先按 `floor(类大小 * frac)` 分配, 再按最大余数法把剩余名额
/// 分给小数部分最大的类, 与常见分层抽样实现的舍入规则一致.
fn split_once(
    records: &[ScanRecord],
    frac: f64,
    rng: &mut StdRng,
) -> Result<(Vec<ScanRecord>, Vec<ScanRecord>), SplitError> {
    debug_assert!((0.0..1.0).contains(&frac));

    // 按标签分组. BTreeMap 保证遍历顺序与标签值一致.
    let mut groups: BTreeMap<u8, Vec<&ScanRecord>> = BTreeMap::new();
    for rec in records {
        groups.entry(rec.label).or_default().push(rec);
    }
    for (&lab, group) in &groups {
        if group.len() < 2 {
            return Err(SplitError::InsufficientSamples(lab, group.len()));
        }
    }

    let n = records.len();
    let total_second = ((n as f64 * frac).round() as usize).clamp(1, n - 1);

    // 每类的基础名额与小数余项.
    let mut quota: BTreeMap<u8, usize> = BTreeMap::new();
    let mut remainders: Vec<(u8, f64)> = Vec::with_capacity(groups.len());
    let mut assigned = 0usize;
    for (&lab, group) in &groups {
        let exact = group.len() as f64 * frac;
        let base = exact.floor() as usize;
        quota.insert(lab, base);
        remainders.push((lab, exact - base as f64));
        assigned += base;
    }

    // 最大余数法分配剩余名额; 余项相同时标签值小者优先.
    remainders.sort_by_key(|&(lab, rem)| (std::cmp::Reverse(OrderedFloat(rem)), lab));
    let mut cursor = 0usize;
    while assigned < total_second {
        let (lab, _) = remainders[cursor % remainders.len()];
        cursor += 1;
        let cap = groups[&lab].len() - 1;
        let q = quota.get_mut(&lab).unwrap();
        if *q < cap {
            *q += 1;
            assigned += 1;
        } else if cursor > remainders.len() * 2 {
            // 所有类都已到上限, 无法继续分配.
            break;
        }
    }

    // 每类独立洗牌, 前 `quota` 个进第二部分, 其余进第一部分.
    let mut first = Vec::with_capacity(n - total_second);
    let mut second = Vec::with_capacity(total_second);
    for (&lab, group) in &groups {
        let mut shuffled: Vec<&ScanRecord> = group.clone();
        shuffled.shuffle(rng);
        let k = quota[&lab];
        second.extend(shuffled[..k].iter().map(|&r| r.clone()));
        first.extend(shuffled[k..].iter().map(|&r| r.clone()));
    }
    Ok((first, second))
}

/// 将扫描表分层划分为 train/validation/test 三个分区.
///
/// 不变量:
///
/// 1. 三个分区两两不交, 并集等于输入表;
/// 2. 每个分区的标签比例与全表一致 (舍入容差内);
/// 3. 相同的输入表和种子总是产出相同的分区 (与输入行序无关).
///
/// 任一标签类的样本数少于 2 时返回
/// [`SplitError::InsufficientSamples`].
pub fn stratified_split(
    records: &[ScanRecord],
    ratios: SplitRatios,
    seed: u64,
) -> Result<SplitTables, SplitError> {
    let mut rng = StdRng::seed_from_u64(seed);

    // 洗牌前按文件路径规范化, 使结果与调用者提供的行序无关.
    let mut sorted: Vec<ScanRecord> = records.to_vec();
    sorted.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let (rest, test) = split_once(&sorted, ratios.test(), &mut rng)?;
    let val_frac = ratios.val() / (1.0 - ratios.test());
    let (train, val) = split_once(&rest, val_frac, &mut rng)?;

    Ok(SplitTables { train, val, test })
}
