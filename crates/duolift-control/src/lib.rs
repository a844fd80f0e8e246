//! # Duolift Control
//!
//! 电梯定位用的离散 PID 控制器。
//!
//! # 算法
//!
//! ```text
//! e[k]   = reference - measured
//! Σe[k]  = clamp(Σe[k-1] + e[k], ±100)
//! Δe[k]  = e[k] - e[k-1]
//! u[k]   = clamp(Kp·e[k] + (Ki·T)·Σe[k] + (Kd/T)·Δe[k], ±100)
//! ```
//!
//! 输出的符号编码方向（正 = 上行，负 = 下行），绝对值是电机占空比百分数。
//!
//! # 特性
//!
//! - **积分饱和保护**: 积分累积被钳位在输出区间内，防止积分饱和
//! - **参考值切换不清零**: `update_reference` 保留累积误差；
//!   需要干净状态的调用方（运动控制器在每次移动前）应构造新实例

/// 控制输出与积分累积的上限
pub const OUTPUT_MAX: f64 = 100.0;

/// 控制输出与积分累积的下限
pub const OUTPUT_MIN: f64 = -100.0;

/// PID 增益与采样周期
///
/// 默认值是本部署实测整定的结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// 比例增益
    pub kp: f64,
    /// 积分增益
    pub ki: f64,
    /// 微分增益
    pub kd: f64,
    /// 采样周期（秒）
    pub sample_period: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.009,
            ki: 0.04,
            kd: 0.011,
            sample_period: 0.2,
        }
    }
}

/// 离散 PID 控制器
#[derive(Debug, Clone)]
pub struct PidController {
    reference: f64,
    gains: PidGains,

    /// 累积误差（积分项）
    total_error: f64,
    /// 上一次误差（微分项用）
    previous_error: f64,
}

impl PidController {
    /// 用默认增益创建新控制器，参考值为 0
    pub fn new() -> Self {
        Self::with_gains(PidGains::default())
    }

    /// 用指定增益创建新控制器
    pub fn with_gains(gains: PidGains) -> Self {
        Self {
            reference: 0.0,
            gains,
            total_error: 0.0,
            previous_error: 0.0,
        }
    }

    /// 更新参考值（设定点）
    ///
    /// 不重置误差状态。需要干净控制器的调用方应构造新实例。
    pub fn update_reference(&mut self, reference: f64) {
        self.reference = reference;
    }

    /// 当前参考值
    pub fn reference(&self) -> f64 {
        self.reference
    }

    /// 当前积分累积（调试与监控用）
    pub fn total_error(&self) -> f64 {
        self.total_error
    }

    /// 由测量值计算一步控制输出
    ///
    /// # 参数
    ///
    /// - `measured`: 当前编码器位置
    ///
    /// # 返回
    ///
    /// 带符号占空比，范围 [−100, 100]。
    pub fn control(&mut self, measured: f64) -> f64 {
        let error = self.reference - measured;

        // 积分项：累积原始误差并钳位
        self.total_error = (self.total_error + error).clamp(OUTPUT_MIN, OUTPUT_MAX);

        // 微分项：误差的一阶差分
        let delta_error = error - self.previous_error;

        let output = self.gains.kp * error
            + (self.gains.ki * self.gains.sample_period) * self.total_error
            + (self.gains.kd / self.gains.sample_period) * delta_error;

        self.previous_error = error;

        output.clamp(OUTPUT_MIN, OUTPUT_MAX)
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}
