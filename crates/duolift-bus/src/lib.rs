//! # Duolift Bus
//!
//! 共享链路上的串行化总线客户端。
//!
//! 全系统同一时刻最多只有一笔在途交易：每个操作在单个互斥锁的保护下
//! 完成"打开 → 发送 → 整定延迟 → 定长读取 → 校验回显 → 关闭"的完整序列，
//! 无论发起方是调度器、任意一部电梯还是温度上报。

mod client;
mod error;

pub use client::{BusClient, DEFAULT_SETTLE_DELAY};
pub use error::BusError;
