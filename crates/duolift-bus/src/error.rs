//! 总线层错误类型定义

use duolift_link::LinkError;
use duolift_protocol::ProtocolError;
use thiserror::Error;

/// 总线交易错误
///
/// 任何一种都使本次交易整体失败，客户端内部不做重试。
#[derive(Error, Debug)]
pub enum BusError {
    /// 链路层错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 协议解析或回显校验错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl BusError {
    /// 是否为链路不可用级别的致命错误
    ///
    /// 协议类错误（超时、残帧、校验和、回显不符）只损失一笔交易，
    /// 下一个轮询/控制周期会自然重试；链路 IO 错误则不会自愈。
    pub fn is_fatal(&self) -> bool {
        match self {
            BusError::Link(e) => e.is_fatal(),
            BusError::Protocol(_) => false,
        }
    }
}
