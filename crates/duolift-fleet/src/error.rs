//! 车队层错误类型定义

use duolift_bus::BusError;
use thiserror::Error;

use crate::floor::{Floor, RequestCode};

/// 单梯操作错误
#[derive(Error, Debug)]
pub enum CarError {
    /// 总线交易失败
    ///
    /// 发生在校准或移动闭环内时，电梯会停车并进入终态 Fault。
    #[error("bus transaction failed: {0}")]
    Bus(#[from] BusError),

    /// 目标楼层尚未校准出位置
    #[error("floor '{0}' has no calibrated position")]
    Uncalibrated(Floor),

    /// 请求码不指向任何楼层（紧急码不能作为移动目标）
    #[error("request code '{0}' does not name a floor")]
    NotAFloor(RequestCode),

    /// 传感器事件源已被占用或拆除
    #[error("floor sensor events are not available")]
    SensorsUnavailable,

    /// 操作被停机信号取消
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

/// 调度器运行错误
#[derive(Error, Debug)]
pub enum FleetError {
    /// 链路级致命故障，轮询循环无法继续
    #[error("bus became unusable: {0}")]
    Bus(#[from] BusError),
}
