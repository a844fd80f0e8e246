//! 电机驱动接口
//!
//! 外部协作者（GPIO 垫片）实现此 trait；核心只发命令。

/// 电机驱动
///
/// 功率符号编码方向：正 = 上行，负 = 下行，0 = 自由滑行。
/// 绝对值是 PWM 占空比百分数。
pub trait MotorDrive: Send + 'static {
    /// 以带符号功率驱动电机
    fn drive_with_power(&mut self, percent: f64);

    /// 制动（两条方向线同时拉高）
    fn brake(&mut self);

    /// 彻底断电
    fn shutdown(&mut self);
}
