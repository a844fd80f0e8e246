//! 部署配置
//!
//! 所有默认值都等于现场部署实测的常数；TOML 里只需要覆盖想改的字段。

use std::time::Duration;

use duolift_control::PidGains;
use serde::{Deserialize, Serialize};

/// 整套系统的部署配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// 总线/链路参数
    pub bus: BusSettings,
    /// 单梯运动参数（两部电梯共用）
    pub car: CarSettings,
    /// 调度器两次单梯检查之间的间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            bus: BusSettings::default(),
            car: CarSettings::default(),
            poll_interval_ms: 50,
        }
    }
}

impl FleetConfig {
    /// 调度间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 总线/链路参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// 串口设备路径
    pub device_path: String,
    /// 外设板设备标识
    pub device_id: u8,
    /// 部署身份标签（板卡出厂配置，4 字节）
    pub identity_tag: [u8; 4],
    /// 发送后到读取响应之间的整定延迟（毫秒）
    pub settle_delay_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            device_path: "/dev/serial0".to_string(),
            device_id: 0x01,
            identity_tag: [0x09, 0x06, 0x02, 0x00],
            settle_delay_ms: 100,
        }
    }
}

impl BusSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// 单梯运动参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSettings {
    /// PID 比例增益
    pub kp: f64,
    /// PID 积分增益
    pub ki: f64,
    /// PID 微分增益
    pub kd: f64,

    /// 移动闭环周期（毫秒），同时是 PID 采样周期
    pub move_tick_ms: u64,
    /// 到站后模拟开门的驻留时间（毫秒）
    pub dwell_ms: u64,
    /// 到站判定窗口（编码器计数）
    pub arrival_window: i64,

    /// 校准慢速上行功率
    pub ascend_power: f64,
    /// 校准下行功率（负值）
    pub descend_power: f64,
    /// 校准等待上升沿的限时（毫秒）
    pub rising_timeout_ms: u64,
    /// 校准等待下降沿的限时（毫秒）
    pub falling_timeout_ms: u64,
}

impl Default for CarSettings {
    fn default() -> Self {
        Self {
            kp: 0.009,
            ki: 0.04,
            kd: 0.011,
            move_tick_ms: 200,
            dwell_ms: 5_000,
            arrival_window: 5,
            ascend_power: 15.0,
            descend_power: -10.0,
            rising_timeout_ms: 60_000,
            falling_timeout_ms: 2_000,
        }
    }
}

impl CarSettings {
    /// 本配置对应的 PID 增益（采样周期即移动闭环周期）
    pub fn pid_gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            sample_period: self.move_tick_ms as f64 / 1000.0,
        }
    }

    pub fn move_tick(&self) -> Duration {
        Duration::from_millis(self.move_tick_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn rising_timeout(&self) -> Duration {
        Duration::from_millis(self.rising_timeout_ms)
    }

    pub fn falling_timeout(&self) -> Duration {
        Duration::from_millis(self.falling_timeout_ms)
    }
}
