//! 按钮/指示灯面板
//!
//! 两部电梯各有 11 个按钮寄存器；槽位 0–5 是两梯共享的厅外呼叫，
//! 槽位 6 是紧急按钮，槽位 7–10 是轿厢内呼叫。
//! 读按钮快照与写指示灯都经由总线客户端。

use std::sync::Arc;

use duolift_bus::{BusClient, BusError};

use crate::floor::RequestCode;

/// 电梯数量
pub const CAR_COUNT: usize = 2;

/// 每部电梯的按钮槽位数
pub const SLOT_COUNT: usize = 11;

/// 紧急按钮槽位
pub const EMERGENCY_SLOT: usize = 6;

/// 槽位 → 请求码映射表
///
/// 槽位 0–5: 厅外呼叫，6: 紧急，7–10: 轿厢呼叫。
pub const SLOT_CODES: [RequestCode; SLOT_COUNT] = [
    RequestCode::Ground,
    RequestCode::First,
    RequestCode::First,
    RequestCode::Second,
    RequestCode::Second,
    RequestCode::Third,
    RequestCode::Emergency,
    RequestCode::Ground,
    RequestCode::First,
    RequestCode::Second,
    RequestCode::Third,
];

/// 两部电梯的按钮寄存器地址表
pub const BUTTON_ADDRESSES: [[u8; SLOT_COUNT]; CAR_COUNT] = [
    [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
    ],
    [
        0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA,
    ],
];

/// 一次轮询读到的按钮快照
pub type ButtonSnapshot = [u8; SLOT_COUNT];

/// 按钮面板
pub struct ButtonPanel {
    bus: Arc<BusClient>,
}

impl ButtonPanel {
    /// 创建新面板
    pub fn new(bus: Arc<BusClient>) -> Self {
        Self { bus }
    }

    /// 读取某部电梯的 11 槽按钮快照
    pub fn read_snapshot(&self, car: usize) -> Result<ButtonSnapshot, BusError> {
        let raw = self
            .bus
            .read_registers(BUTTON_ADDRESSES[car][0], SLOT_COUNT)?;

        let mut snapshot = [0u8; SLOT_COUNT];
        snapshot.copy_from_slice(&raw[..SLOT_COUNT]);
        Ok(snapshot)
    }

    /// 点亮某部电梯的某个槽位指示灯
    pub fn light(&self, car: usize, slot: usize) -> Result<(), BusError> {
        self.bus.write_registers(BUTTON_ADDRESSES[car][slot], &[1])
    }

    /// 熄灭某部电梯上映射到 `code` 的**每一个**按钮指示灯
    pub fn extinguish_code(&self, car: usize, code: RequestCode) -> Result<(), BusError> {
        for (slot, &slot_code) in SLOT_CODES.iter().enumerate() {
            if slot_code == code {
                self.bus.write_registers(BUTTON_ADDRESSES[car][slot], &[0])?;
            }
        }
        Ok(())
    }

    /// 把两部电梯的全部按钮寄存器清零（维护工具用）
    pub fn reset_all(&self) -> Result<(), BusError> {
        for addresses in &BUTTON_ADDRESSES {
            for &address in addresses {
                self.bus.write_registers(address, &[0])?;
            }
        }
        Ok(())
    }
}
