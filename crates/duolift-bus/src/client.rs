//! 总线客户端
//!
//! [`BusClient`] 是唯一允许触碰链路的对象。锁的粒度是整笔交易：
//! 从打开链路到拿到校验过的响应为止，期间任何其他调用方都会排队等待。

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use duolift_link::LinkTransport;
use duolift_protocol::codec::{EchoExpectation, FrameCodec, Response};
use duolift_protocol::ids::{
    ACK_RESPONSE_LEN, ENCODER_RESPONSE_LEN, REGISTER_RESPONSE_OVERHEAD, SUB_CONTROL_SIGNAL,
    SUB_ENCODER_READ, SUB_TEMPERATURE,
};
use duolift_protocol::{FunctionCode, ProtocolError};

use crate::error::BusError;

/// 默认整定延迟
///
/// 发送请求后板卡需要的处理时间，之后响应才会完整出现在链路上。
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// 总线客户端
///
/// # 并发
///
/// 所有方法都取 `&self`，内部用单个 [`parking_lot::Mutex`] 串行化，
/// 可以放进 `Arc` 被调度器与两部电梯同时持有。
pub struct BusClient {
    /// 全系统唯一的链路互斥锁，覆盖整笔交易
    link: Mutex<Box<dyn LinkTransport>>,
    codec: FrameCodec,
    settle_delay: Duration,
}

impl BusClient {
    /// 创建新的总线客户端
    ///
    /// # 参数
    ///
    /// - `link`: 链路后端（被客户端独占）
    /// - `codec`: 本部署的帧编解码器
    pub fn new(link: impl LinkTransport + 'static, codec: FrameCodec) -> Self {
        Self {
            link: Mutex::new(Box::new(link)),
            codec,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// 设置整定延迟（测试与仿真用 `Duration::ZERO`）
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// 执行一笔完整交易，返回响应数据段
    fn transact(
        &self,
        function: FunctionCode,
        sub_code: u8,
        payload: &[u8],
        expected_len: usize,
        expectation: EchoExpectation,
    ) -> Result<Vec<u8>, BusError> {
        let mut link = self.link.lock();

        link.connect()?;

        let frame = self.codec.encode(function, sub_code, payload);
        trace!(tx = %hex::encode(&frame), "bus transaction");
        link.send(&frame)?;

        thread::sleep(self.settle_delay);

        let raw = link.receive_exact(expected_len)?;
        trace!(rx = %hex::encode(&raw), "bus response");

        let response = Response::parse(&raw, expected_len)?;
        response
            .expect_echo(self.codec.device_id(), function, expectation)
            .map_err(ProtocolError::from)?;
        let data = response.payload().to_vec();

        link.disconnect()?;
        Ok(data)
    }

    /// 读取某个电机的编码器位置
    pub fn read_encoder(&self, motor_id: u8) -> Result<u32, BusError> {
        let data = self.transact(
            FunctionCode::SpecialRead,
            SUB_ENCODER_READ,
            &[motor_id],
            ENCODER_RESPONSE_LEN,
            EchoExpectation::SubCode(SUB_ENCODER_READ),
        )?;

        let bytes: [u8; 4] = data.as_slice().try_into().map_err(|_| {
            ProtocolError::from(duolift_protocol::ProtocolViolation::PayloadLength {
                expected: 4,
                actual: data.len(),
            })
        })?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// 向对侧板转发控制信号
    ///
    /// 符号编码方向，绝对值是占空比百分数。
    pub fn send_control_signal(&self, motor_id: u8, value: i32) -> Result<(), BusError> {
        let mut payload = [0u8; 5];
        payload[0] = motor_id;
        payload[1..].copy_from_slice(&value.to_le_bytes());

        self.transact(
            FunctionCode::ControlWrite,
            SUB_CONTROL_SIGNAL,
            &payload,
            ACK_RESPONSE_LEN,
            EchoExpectation::SubCode(SUB_CONTROL_SIGNAL),
        )?;
        Ok(())
    }

    /// 上报某部电梯的温度（摄氏度）
    pub fn send_temperature(&self, car_id: u8, celsius: f32) -> Result<(), BusError> {
        let mut payload = [0u8; 5];
        payload[0] = car_id;
        payload[1..].copy_from_slice(&celsius.to_le_bytes());

        self.transact(
            FunctionCode::ControlWrite,
            SUB_TEMPERATURE,
            &payload,
            ACK_RESPONSE_LEN,
            EchoExpectation::SubCode(SUB_TEMPERATURE),
        )?;
        Ok(())
    }

    /// 从 `address` 起连续读取 `quantity` 个寄存器
    ///
    /// 寄存器地址放在 sub_code 位。
    pub fn read_registers(&self, address: u8, quantity: usize) -> Result<Vec<u8>, BusError> {
        debug_assert!(quantity <= u8::MAX as usize);

        self.transact(
            FunctionCode::ReadRegisters,
            address,
            &[quantity as u8],
            REGISTER_RESPONSE_OVERHEAD + quantity,
            EchoExpectation::Quantity(quantity),
        )
    }

    /// 从 `address` 起连续写入寄存器
    pub fn write_registers(&self, address: u8, values: &[u8]) -> Result<(), BusError> {
        debug_assert!(values.len() <= u8::MAX as usize);

        let mut payload = Vec::with_capacity(1 + values.len());
        payload.push(values.len() as u8);
        payload.extend_from_slice(values);

        self.transact(
            FunctionCode::WriteRegisters,
            address,
            &payload,
            REGISTER_RESPONSE_OVERHEAD + values.len(),
            EchoExpectation::Quantity(values.len()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duolift_link::mock::MockTransport;
    use duolift_protocol::crc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TAG: [u8; 4] = [0x09, 0x06, 0x02, 0x00];

    fn board_frame(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc::compute(body).to_le_bytes());
        frame
    }

    fn client(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> BusClient {
        BusClient::new(MockTransport::new(responder), FrameCodec::new(0x01, TAG))
            .with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_read_encoder() {
        let bus = client(|request| {
            // 请求：device_id, 0x23, 0xC1, motor_id, tag*4, crc*2
            assert_eq!(request[1], 0x23);
            assert_eq!(request[3], 0x00);
            board_frame(&[0x01, 0x23, 0xC1, 0xD2, 0x04, 0x00, 0x00])
        });

        assert_eq!(bus.read_encoder(0).unwrap(), 1234);
    }

    #[test]
    fn test_control_signal_ack() {
        let bus = client(|request| {
            assert_eq!(request[1], 0x16);
            assert_eq!(request[2], 0xC2);
            // 小端有符号值
            let value = i32::from_le_bytes(request[4..8].try_into().unwrap());
            assert_eq!(value, -42);
            board_frame(&[0x01, 0x16, 0xC2])
        });

        bus.send_control_signal(1, -42).unwrap();
    }

    #[test]
    fn test_read_registers_quantity_checked() {
        let bus = client(|_| board_frame(&[0x01, 0x03, 0x00, 0x01]));

        // 板卡只回了 2 个寄存器，调用方要 11 个
        let err = bus.read_registers(0x00, 11).unwrap_err();
        assert!(matches!(err, BusError::Link(duolift_link::LinkError::Timeout)));
    }

    #[test]
    fn test_function_echo_mismatch() {
        // 帧总长符合声明，但功能码回显的是寄存器写
        let bus = client(|_| {
            board_frame(&[0x01, 0x06, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00])
        });

        let err = bus.read_registers(0x00, 7).unwrap_err();
        assert!(matches!(
            err,
            BusError::Protocol(ProtocolError::Violation(
                duolift_protocol::ProtocolViolation::Function { .. }
            ))
        ));
    }

    #[test]
    fn test_checksum_failure_aborts_transaction() {
        let bus = client(|_| {
            let mut frame = board_frame(&[0x01, 0x16, 0xC2]);
            frame[1] ^= 0x01;
            frame
        });

        let err = bus.send_control_signal(0, 10).unwrap_err();
        assert!(matches!(
            err,
            BusError::Protocol(ProtocolError::ChecksumMismatch { .. })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_write_registers_payload_layout() {
        let transport =
            MockTransport::new(|_request: &[u8]| board_frame(&[0x01, 0x06, 0x00, 0x00, 0x00]));
        let log = transport.sent_log();
        let bus = BusClient::new(transport, FrameCodec::new(0x01, TAG))
            .with_settle_delay(Duration::ZERO);

        bus.write_registers(0xA3, &[0x01, 0x00, 0x01]).unwrap();

        let sent = log.lock().unwrap();
        let frame = &sent[0];
        assert_eq!(frame[1], 0x06);
        assert_eq!(frame[2], 0xA3); // 地址在 sub_code 位
        assert_eq!(frame[3], 3); // 数量
        assert_eq!(&frame[4..7], &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_transactions_are_serialized() {
        // 应答闭包不可重入：进入时置位、离开时复位，重入即 panic
        let in_flight = Arc::new(AtomicU32::new(0));
        let calls = Arc::new(AtomicU32::new(0));

        let bus = {
            let in_flight = in_flight.clone();
            let calls = calls.clone();
            Arc::new(client(move |_| {
                assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                calls.fetch_add(1, Ordering::SeqCst);
                let frame = board_frame(&[0x01, 0x23, 0xC1, 0x00, 0x00, 0x00, 0x00]);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                frame
            }))
        };

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        bus.read_encoder(0).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }
}
