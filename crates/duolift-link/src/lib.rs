//! # Duolift Link
//!
//! 共享半双工链路的传输抽象层。
//!
//! 上层（总线客户端）只依赖 [`LinkTransport`] trait；
//! 具体后端由本 crate 提供：
//!
//! - `serial`: Linux 串口后端（termios 原始模式，115200-8N1）
//! - `mock`: 无硬件后端（`mock` feature），用于测试与仿真

use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod serial;

#[cfg(target_os = "linux")]
pub use serial::SerialTransport;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::MockTransport;

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Transport not connected")]
    NotConnected,
    #[error("Device Error: {0}")]
    Device(String),
}

impl LinkError {
    /// 是否为链路本身不可用的致命错误
    ///
    /// 超时是单次交易层面的失败，链路仍可继续使用；
    /// IO/设备/未连接错误则说明链路已不可信。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinkError::Timeout)
    }
}

/// 物理链路传输接口
///
/// 板卡协议是严格的请求/响应制，因此接收侧是"读满指定字节数"而非流式读取。
/// `connect` 必须幂等：对已连接的链路再次调用是无害的空操作。
pub trait LinkTransport: Send {
    /// 打开链路（幂等）
    fn connect(&mut self) -> Result<(), LinkError>;

    /// 关闭链路
    fn disconnect(&mut self) -> Result<(), LinkError>;

    /// 发送一帧完整字节
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 读满恰好 `len` 个字节
    ///
    /// 在限定时间内凑不齐则返回 [`LinkError::Timeout`]。
    fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_recoverable() {
        assert!(!LinkError::Timeout.is_fatal());
        assert!(LinkError::NotConnected.is_fatal());
        assert!(LinkError::Device("gone".into()).is_fatal());
    }
}
