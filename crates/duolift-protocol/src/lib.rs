//! # Duolift Protocol
//!
//! 电梯外设板二进制协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 功能码、子码与帧长度常量
//! - `crc`: CRC-16/MODBUS 校验和
//! - `codec`: 请求帧构建与响应帧解析
//!
//! ## 帧格式
//!
//! 所有多字节整数均为小端字节序：
//!
//! ```text
//! | device_id:1 | function_code:1 | sub_code:1 | payload:var | identity_tag:4 | checksum:2 |
//! ```
//!
//! 校验和覆盖它之前的每一个字节。响应帧不携带 identity_tag，
//! 其布局由功能码的 [`ResponseShape`](ids::ResponseShape) 决定。

pub mod codec;
pub mod crc;
pub mod ids;

// 重新导出常用类型
pub use codec::{EchoExpectation, FrameCodec, Response};
pub use ids::{FunctionCode, ResponseShape};

use thiserror::Error;

/// 协议解析错误类型
///
/// `IncompleteResponse` 与 `ChecksumMismatch` 表示整帧不可信；
/// `Violation` 表示帧本身完整但内容与请求不符。
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 收到的字节数少于调用方声明的期望长度
    #[error("incomplete response: expected {expected} bytes, got {actual}")]
    IncompleteResponse { expected: usize, actual: usize },

    /// 校验和不匹配
    ///
    /// 校验失败的帧整体不可信，直接使本次交易失败。
    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch { computed: u16, received: u16 },

    /// 帧完整但内容违反协议约定
    #[error("protocol violation: {0}")]
    Violation(#[from] ProtocolViolation),
}

/// 协议约定违例
///
/// 响应的 device_id 与 function_code 必须回显请求；
/// 未声明期望数据量时 sub_code 也必须回显，声明了则校验数据长度。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// 未知或不支持的功能码
    #[error("unknown function code {0:#04x}")]
    UnknownFunction(u8),

    /// device_id 未回显请求
    #[error("device id mismatch: expected {expected:#04x}, got {actual:#04x}")]
    DeviceId { expected: u8, actual: u8 },

    /// function_code 未回显请求
    #[error("function code mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Function { expected: u8, actual: u8 },

    /// sub_code 未回显请求
    #[error("sub code mismatch: expected {expected:#04x}, got {actual:#04x}")]
    SubCode { expected: u8, actual: u8 },

    /// 响应数据长度与声明的数量不符
    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    PayloadLength { expected: usize, actual: usize },

    /// 该响应形态不携带所要求的字段（如对寄存器响应要求 sub_code）
    #[error("response shape carries no {0}")]
    MissingField(&'static str),
}
