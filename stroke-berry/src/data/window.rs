/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
///
/// 流水线约定: 网络输入通道统一使用 [`CtWindow::eval_unit`] 的 `[0, 1]`
/// 规范化形式; `eval` / `eval_f32` 的 8-bit 形式仅用于可视化.
#[derive(Copy, Clone, Debug)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    /// 特别地, 零窗宽或负窗宽永远无法构建出实例, 因此下游的规范化
    /// 计算不可能出现除零或 NaN.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个便于观察脑实质的 CT 窗口 (脑窗). 窗位 40, 窗宽 80.
    #[inline]
    pub const fn from_brain_visual() -> CtWindow {
        Self {
            level: 40.0,
            width: 80.0,
        }
    }

    /// 构建一个便于观察硬膜下出血的 CT 窗口 (硬膜下窗). 窗位 80, 窗宽 200.
    #[inline]
    pub const fn from_subdural_visual() -> CtWindow {
        Self {
            level: 80.0,
            width: 200.0,
        }
    }

    /// 构建一个便于观察颅骨结构的 CT 窗口 (骨窗). 窗位 600, 窗宽 2800.
    #[inline]
    pub const fn from_bone_visual() -> CtWindow {
        Self {
            level: 600.0,
            width: 2800.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255)
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f32) -> Option<u8> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(u8::MIN)
        } else if ct >= self.upper_bound() {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((((ct - lb) / self.width()) * 255.0) as u8)
        }
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, ct: f32) -> Option<f32> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        let ub = self.upper_bound();
        if ct <= lb {
            Some(0.0)
        } else if ct >= ub {
            Some(255.0)
        } else {
            Some((ct - lb) / self.width() * 255.0)
        }
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的单位区间分布点 (0.0 <= value <= 1.0).
    ///
    /// 这是网络输入通道的规范化形式: 窗下限及以下映射为 0.0,
    /// 窗上限及以上映射为 1.0, 区间内线性插值.
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_unit(&self, ct: f32) -> Option<f32> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        let ub = self.upper_bound();
        if ct <= lb {
            Some(0.0)
        } else if ct >= ub {
            Some(1.0)
        } else {
            Some((ct - lb) / self.width())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::CtWindow;

    fn is_valid_init(level: f32, width: f32) -> bool {
        CtWindow::new(level, width).is_some()
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(!is_valid_init(1e6, 80.0));
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-8
    }

    #[test]
    fn test_ct_window_generic() {
        // [60, 100]
        let ct = CtWindow::new(80.0, 40.0).unwrap();
        assert_eq!(ct.eval(f32::NAN), None);
        assert_eq!(ct.eval(f32::MIN), Some(0));
        assert_eq!(ct.eval(f32::MAX), Some(255));

        assert_eq!(ct.eval(50.0), Some(0));
        assert!(float_eq(ct.eval_f32(50.0).unwrap(), 0.0));

        assert_eq!(ct.eval(60.0), Some(0));
        assert!(float_eq(ct.eval_f32(60.0).unwrap(), 0.0));

        assert_eq!(ct.eval(70.0).unwrap(), (255.0 * 0.25) as u8);
        assert!(float_eq(ct.eval_f32(70.0).unwrap(), 255.0 * 0.25));

        assert_eq!(ct.eval(80.0).unwrap(), (255.0 * 0.5) as u8);
        assert!(float_eq(ct.eval_f32(80.0).unwrap(), 255.0 * 0.5));

        assert_eq!(ct.eval(100.0).unwrap(), u8::MAX);
        assert!(float_eq(ct.eval_f32(100.0).unwrap(), 255.0));
    }

    #[test]
    fn test_ct_window_unit_range() {
        let ct = CtWindow::from_brain_visual(); // [0, 80]
        assert_eq!(ct.eval_unit(f32::INFINITY), None);
        assert!(float_eq(ct.eval_unit(-1000.0).unwrap(), 0.0));
        assert!(float_eq(ct.eval_unit(0.0).unwrap(), 0.0));
        assert!(float_eq(ct.eval_unit(20.0).unwrap(), 0.25));
        assert!(float_eq(ct.eval_unit(40.0).unwrap(), 0.5));
        assert!(float_eq(ct.eval_unit(80.0).unwrap(), 1.0));
        assert!(float_eq(ct.eval_unit(3000.0).unwrap(), 1.0));

        // 任意输入下输出都不逃出 [0, 1].
        for hu in [-4000.0f32, -24.5, 0.1, 39.9, 79.99, 80.01, 1e5] {
            let v = ct.eval_unit(hu).unwrap();
            assert!((0.0..=1.0).contains(&v), "hu = {hu} 映射出界: {v}");
        }
    }

    #[test]
    fn test_standard_presets() {
        let brain = CtWindow::from_brain_visual();
        assert!(float_eq(brain.lower_bound(), 0.0));
        assert!(float_eq(brain.upper_bound(), 80.0));

        let subdural = CtWindow::from_subdural_visual();
        assert!(float_eq(subdural.lower_bound(), -20.0));
        assert!(float_eq(subdural.upper_bound(), 180.0));

        let bone = CtWindow::from_bone_visual();
        assert!(float_eq(bone.lower_bound(), -800.0));
        assert!(float_eq(bone.upper_bound(), 2000.0));
    }
}
