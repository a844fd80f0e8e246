//! 功能码、子码与帧长度常量定义

use num_enum::TryFromPrimitive;

/// 协议功能码
///
/// 板卡只实现这四个功能码，其余值一律视为协议违例。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    /// 寄存器读取（按钮/指示灯快照）
    ReadRegisters = 0x03,

    /// 寄存器写入（点亮/熄灭指示灯）
    WriteRegisters = 0x06,

    /// 控制量写入（PWM 控制信号、温度上报）
    ControlWrite = 0x16,

    /// 特殊读取（编码器）
    SpecialRead = 0x23,
}

impl FunctionCode {
    /// 该功能码对应的响应形态
    ///
    /// 解析响应时只依据此形态分支，穷举匹配由编译器保证。
    pub fn shape(self) -> ResponseShape {
        match self {
            FunctionCode::ReadRegisters | FunctionCode::WriteRegisters => ResponseShape::ReadWrite,
            FunctionCode::ControlWrite | FunctionCode::SpecialRead => {
                ResponseShape::ControlOrEncoder
            },
        }
    }
}

/// 响应帧形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// 寄存器读写：`| device_id | function_code | payload... | checksum |`
    ReadWrite,

    /// 控制/编码器：`| device_id | function_code | sub_code | payload... | checksum |`
    ///
    /// 总长不超过 4 字节时没有 payload，是纯应答帧。
    ControlOrEncoder,
}

/// 编码器读取子码
pub const SUB_ENCODER_READ: u8 = 0xC1;

/// PWM 控制信号子码
pub const SUB_CONTROL_SIGNAL: u8 = 0xC2;

/// 温度上报子码
pub const SUB_TEMPERATURE: u8 = 0xD1;

/// 编码器读取响应总长
///
/// 1 (device_id) + 1 (function_code) + 1 (sub_code) + 4 (u32) + 2 (checksum)
pub const ENCODER_RESPONSE_LEN: usize = 9;

/// 纯应答响应总长
///
/// 1 (device_id) + 1 (function_code) + 1 (sub_code) + 2 (checksum)
pub const ACK_RESPONSE_LEN: usize = 5;

/// 寄存器读写响应在数据之外的开销
///
/// 1 (device_id) + 1 (function_code) + 2 (checksum)；总长 = 开销 + 数据量
pub const REGISTER_RESPONSE_OVERHEAD: usize = 4;

/// 默认外设板设备标识
pub const DEFAULT_DEVICE_ID: u8 = 0x01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_round_trip() {
        for byte in [0x03u8, 0x06, 0x16, 0x23] {
            let code = FunctionCode::try_from(byte).unwrap();
            assert_eq!(code as u8, byte);
        }
    }

    #[test]
    fn test_unknown_function_code_rejected() {
        assert!(FunctionCode::try_from(0x04u8).is_err());
        assert!(FunctionCode::try_from(0xFFu8).is_err());
    }

    #[test]
    fn test_shapes() {
        assert_eq!(FunctionCode::ReadRegisters.shape(), ResponseShape::ReadWrite);
        assert_eq!(FunctionCode::WriteRegisters.shape(), ResponseShape::ReadWrite);
        assert_eq!(
            FunctionCode::ControlWrite.shape(),
            ResponseShape::ControlOrEncoder
        );
        assert_eq!(
            FunctionCode::SpecialRead.shape(),
            ResponseShape::ControlOrEncoder
        );
    }
}
