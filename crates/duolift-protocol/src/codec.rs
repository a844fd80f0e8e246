//! 请求帧构建与响应帧解析
//!
//! [`FrameCodec`] 持有本部署的设备标识与 4 字节身份标签，负责拼装请求帧；
//! [`Response`] 是按功能码形态打标签的响应视图，借用原始字节，零拷贝。

use smallvec::SmallVec;

use crate::crc;
use crate::ids::{FunctionCode, ResponseShape};
use crate::{ProtocolError, ProtocolViolation};

/// 请求帧编码缓冲
///
/// 最长的请求（写 11 个寄存器）也远小于 32 字节，栈上即可容纳。
pub type FrameBuffer = SmallVec<[u8; 32]>;

/// 帧编解码器
///
/// 每个部署只有一个设备标识和一个身份标签，二者在所有请求中保持不变。
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    device_id: u8,
    identity_tag: [u8; 4],
}

impl FrameCodec {
    /// 创建新的编解码器
    pub fn new(device_id: u8, identity_tag: [u8; 4]) -> Self {
        Self {
            device_id,
            identity_tag,
        }
    }

    /// 本部署的设备标识
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// 构建一个完整请求帧
    ///
    /// 布局：`device_id | function_code | sub_code | payload | identity_tag | crc_le16`，
    /// 校验和覆盖它之前的每一个字节。
    pub fn encode(&self, function: FunctionCode, sub_code: u8, payload: &[u8]) -> FrameBuffer {
        let mut frame = FrameBuffer::new();
        frame.push(self.device_id);
        frame.push(function as u8);
        frame.push(sub_code);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&self.identity_tag);

        let checksum = crc::compute(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame
    }
}

/// 回显校验期望
///
/// 寄存器读写交易声明期望数据量；控制/编码器交易则要求 sub_code 回显。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoExpectation {
    /// 响应的 sub_code 必须等于该值
    SubCode(u8),

    /// 响应数据长度必须等于该值（字节）
    Quantity(usize),
}

/// 已解析的响应帧（借用视图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    /// 寄存器读写响应
    ReadWrite {
        device_id: u8,
        function: FunctionCode,
        payload: &'a [u8],
    },

    /// 控制量/编码器响应；纯应答帧的 `payload` 为空
    ControlOrEncoder {
        device_id: u8,
        function: FunctionCode,
        sub_code: u8,
        payload: &'a [u8],
    },
}

impl<'a> Response<'a> {
    /// 解析一帧响应
    ///
    /// # 错误
    ///
    /// - [`ProtocolError::IncompleteResponse`]: 字节数少于 `expected_len`
    /// - [`ProtocolError::ChecksumMismatch`]: 校验和不符（整帧不可信）
    /// - [`ProtocolViolation::UnknownFunction`]: 功能码不在协议内
    pub fn parse(bytes: &'a [u8], expected_len: usize) -> Result<Self, ProtocolError> {
        if bytes.len() < expected_len || bytes.len() < 4 {
            return Err(ProtocolError::IncompleteResponse {
                expected: expected_len,
                actual: bytes.len(),
            });
        }

        let (body, tail) = bytes.split_at(bytes.len() - 2);
        let received = u16::from_le_bytes([tail[0], tail[1]]);
        let computed = crc::compute(body);
        if computed != received {
            return Err(ProtocolError::ChecksumMismatch { computed, received });
        }

        let function = FunctionCode::try_from(bytes[1])
            .map_err(|_| ProtocolViolation::UnknownFunction(bytes[1]))?;

        let response = match function.shape() {
            ResponseShape::ReadWrite => Response::ReadWrite {
                device_id: bytes[0],
                function,
                payload: &bytes[2..bytes.len() - 2],
            },
            ResponseShape::ControlOrEncoder => {
                // 总长不超过 4 字节的帧是纯应答，没有数据段
                let payload = if bytes.len() > 4 {
                    &bytes[3..bytes.len() - 2]
                } else {
                    &[][..]
                };
                Response::ControlOrEncoder {
                    device_id: bytes[0],
                    function,
                    sub_code: bytes[2],
                    payload,
                }
            },
        };

        Ok(response)
    }

    /// 响应携带的设备标识
    pub fn device_id(&self) -> u8 {
        match *self {
            Response::ReadWrite { device_id, .. } => device_id,
            Response::ControlOrEncoder { device_id, .. } => device_id,
        }
    }

    /// 响应携带的功能码
    pub fn function(&self) -> FunctionCode {
        match *self {
            Response::ReadWrite { function, .. } => function,
            Response::ControlOrEncoder { function, .. } => function,
        }
    }

    /// 响应数据段
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Response::ReadWrite { payload, .. } => payload,
            Response::ControlOrEncoder { payload, .. } => payload,
        }
    }

    /// 校验响应是否正确回显了请求
    ///
    /// # 参数
    ///
    /// - `device_id`: 请求使用的设备标识
    /// - `function`: 请求使用的功能码
    /// - `expectation`: sub_code 回显或数据量校验，二选一
    pub fn expect_echo(
        &self,
        device_id: u8,
        function: FunctionCode,
        expectation: EchoExpectation,
    ) -> Result<(), ProtocolViolation> {
        if self.device_id() != device_id {
            return Err(ProtocolViolation::DeviceId {
                expected: device_id,
                actual: self.device_id(),
            });
        }
        if self.function() != function {
            return Err(ProtocolViolation::Function {
                expected: function as u8,
                actual: self.function() as u8,
            });
        }

        match expectation {
            EchoExpectation::SubCode(expected) => match *self {
                Response::ControlOrEncoder { sub_code, .. } if sub_code == expected => Ok(()),
                Response::ControlOrEncoder { sub_code, .. } => Err(ProtocolViolation::SubCode {
                    expected,
                    actual: sub_code,
                }),
                Response::ReadWrite { .. } => Err(ProtocolViolation::MissingField("sub code")),
            },
            EchoExpectation::Quantity(expected) => {
                let actual = self.payload().len();
                if actual == expected {
                    Ok(())
                } else {
                    Err(ProtocolViolation::PayloadLength { expected, actual })
                }
            },
        }
    }
}
