//! # Duolift Sim
//!
//! 无硬件的被控对象仿真：两部电梯的一维运动学、楼层传感器窗口、
//! 以及一块按协议应答的外设板。
//!
//! 步进线程以固定周期把电机功率积分成位置；位置进出楼层窗口时
//! 产生上升/下降沿事件，与真实 GPIO 垫片推送的事件同构。
//! [`BoardSimulator`] 直接实现 [`LinkTransport`]，可以原样塞进
//! `BusClient`，让整套车队栈在进程内跑起来。
//!
//! 用途：集成测试与 `duolift-cli sim` 演示。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::debug;

use duolift_fleet::panel::BUTTON_ADDRESSES;
use duolift_fleet::{
    CAR_COUNT, CarEndpoints, Edge, FLOOR_COUNT, Floor, FloorEvent, FloorSensors, MotorDrive,
};
use duolift_link::{LinkError, LinkTransport};
use duolift_protocol::crc;
use duolift_protocol::ids::FunctionCode;

/// 仿真参数
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 四个楼层的真实位置（编码器计数）
    pub floor_positions: [f64; FLOOR_COUNT],
    /// 楼层传感器窗口半宽
    pub band_halfwidth: f64,
    /// 每个步进周期内，单位功率换算成的位移
    pub gain: f64,
    /// 步进周期
    pub tick: Duration,
    /// 两部电梯的初始位置
    pub initial_positions: [f64; CAR_COUNT],
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            floor_positions: [100.0, 600.0, 1100.0, 1600.0],
            band_halfwidth: 40.0,
            gain: 2.0,
            tick: Duration::from_millis(1),
            initial_positions: [0.0, 0.0],
        }
    }
}

/// 一部电梯的被控对象状态
struct CarPlant {
    position: f64,
    power: f64,
    braked: bool,
    in_band: [bool; FLOOR_COUNT],
}

impl CarPlant {
    fn new(position: f64) -> Self {
        Self {
            position,
            power: 0.0,
            braked: false,
            in_band: [false; FLOOR_COUNT],
        }
    }
}

/// 全部共享仿真状态
struct SimState {
    cars: [CarPlant; CAR_COUNT],
    registers: [u8; 256],
}

type Shared = Arc<Mutex<SimState>>;

/// 仿真世界句柄
///
/// 持有步进线程；Drop 时自动停表。
pub struct SimHandle {
    config: SimConfig,
    state: Shared,
    running: Arc<AtomicBool>,
    stepper: Option<JoinHandle<()>>,
    event_rxs: [Option<Receiver<FloorEvent>>; CAR_COUNT],
}

impl SimHandle {
    /// 启动仿真世界
    pub fn spawn(config: SimConfig) -> Self {
        let state: Shared = Arc::new(Mutex::new(SimState {
            cars: [
                CarPlant::new(config.initial_positions[0]),
                CarPlant::new(config.initial_positions[1]),
            ],
            registers: [0u8; 256],
        }));

        let (tx0, rx0) = unbounded();
        let (tx1, rx1) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let stepper = {
            let state = state.clone();
            let running = running.clone();
            let config = config.clone();
            thread::spawn(move || stepper_loop(state, [tx0, tx1], running, config))
        };

        Self {
            config,
            state,
            running,
            stepper: Some(stepper),
            event_rxs: [Some(rx0), Some(rx1)],
        }
    }

    /// 构造接入 `BusClient` 的板卡链路
    pub fn board(&self) -> BoardSimulator {
        BoardSimulator {
            state: self.state.clone(),
            pending: Vec::new(),
            connected: false,
        }
    }

    /// 取走某部电梯的硬件端点（每梯只能取一次）
    pub fn endpoints(&mut self, car: usize) -> CarEndpoints {
        let events = self.event_rxs[car]
            .take()
            .unwrap_or_else(|| unbounded().1);
        CarEndpoints {
            motor: Box::new(SimMotor {
                car,
                state: self.state.clone(),
            }),
            sensors: Box::new(SimSensors {
                car,
                state: self.state.clone(),
            }),
            events,
        }
    }

    /// 模拟按下某部电梯的某个按钮（写 1 到对应寄存器）
    pub fn press_button(&self, car: usize, slot: usize) {
        let address = BUTTON_ADDRESSES[car][slot] as usize;
        self.state.lock().registers[address] = 1;
    }

    /// 读某个寄存器的当前值
    pub fn register(&self, address: u8) -> u8 {
        self.state.lock().registers[address as usize]
    }

    /// 某部电梯的当前位置
    pub fn position(&self, car: usize) -> f64 {
        self.state.lock().cars[car].position
    }

    /// 某个楼层的真实位置
    pub fn floor_position(&self, floor: Floor) -> f64 {
        self.config.floor_positions[floor.index()]
    }

    /// 停表并回收步进线程
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stepper.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 步进循环：积分位置、翻转楼层窗口、派发沿事件
fn stepper_loop(
    state: Shared,
    event_txs: [Sender<FloorEvent>; CAR_COUNT],
    running: Arc<AtomicBool>,
    config: SimConfig,
) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(config.tick);

        let mut state = state.lock();
        for (idx, car) in state.cars.iter_mut().enumerate() {
            if !car.braked {
                // 底部有物理挡块
                car.position = (car.position + car.power * config.gain).max(0.0);
            }

            for floor in Floor::ALL {
                let distance = (car.position - config.floor_positions[floor.index()]).abs();
                let inside = distance <= config.band_halfwidth;
                if inside != car.in_band[floor.index()] {
                    car.in_band[floor.index()] = inside;
                    let edge = if inside { Edge::Rising } else { Edge::Falling };
                    debug!(car = idx, %floor, ?edge, position = car.position, "sensor edge");
                    // 接收端拆除后事件直接丢弃
                    let _ = event_txs[idx].send(FloorEvent { floor, edge });
                }
            }
        }
    }
}

/// 仿真电机
pub struct SimMotor {
    car: usize,
    state: Shared,
}

impl MotorDrive for SimMotor {
    fn drive_with_power(&mut self, percent: f64) {
        let mut state = self.state.lock();
        let car = &mut state.cars[self.car];
        car.power = percent;
        car.braked = false;
    }

    fn brake(&mut self) {
        let mut state = self.state.lock();
        let car = &mut state.cars[self.car];
        car.power = 0.0;
        car.braked = true;
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock();
        let car = &mut state.cars[self.car];
        car.power = 0.0;
    }
}

/// 仿真楼层传感器（电平源）
pub struct SimSensors {
    car: usize,
    state: Shared,
}

impl FloorSensors for SimSensors {
    fn level(&self, floor: Floor) -> bool {
        self.state.lock().cars[self.car].in_band[floor.index()]
    }
}

/// 按协议应答的仿真外设板
///
/// 与真实板卡一样：请求帧进来，整帧响应出去；
/// 响应不携带身份标签，以小端 CRC 结尾。
pub struct BoardSimulator {
    state: Shared,
    pending: Vec<u8>,
    connected: bool,
}

impl BoardSimulator {
    fn respond(&self, request: &[u8]) -> Vec<u8> {
        let device = request[0];
        let sub = request[2];

        let Ok(function) = FunctionCode::try_from(request[1]) else {
            return Vec::new();
        };

        let mut state = self.state.lock();
        let body = match function {
            FunctionCode::ReadRegisters => {
                let start = sub as usize;
                let quantity = request[3] as usize;
                let mut body = vec![device, function as u8];
                body.extend_from_slice(&state.registers[start..start + quantity]);
                body
            },
            FunctionCode::WriteRegisters => {
                let start = sub as usize;
                let quantity = request[3] as usize;
                let values = &request[4..4 + quantity];
                state.registers[start..start + quantity].copy_from_slice(values);
                let mut body = vec![device, function as u8];
                body.extend_from_slice(values);
                body
            },
            FunctionCode::SpecialRead => {
                let motor = request[3] as usize;
                let position = state.cars[motor].position.max(0.0) as u32;
                let mut body = vec![device, function as u8, sub];
                body.extend_from_slice(&position.to_le_bytes());
                body
            },
            FunctionCode::ControlWrite => vec![device, function as u8, sub],
        };

        let mut frame = body;
        let checksum = crc::compute(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame
    }
}

impl LinkTransport for BoardSimulator {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.connected = false;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.pending = self.respond(bytes);
        Ok(())
    }

    fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if self.pending.len() < len {
            return Err(LinkError::Timeout);
        }
        Ok(self.pending.drain(..len).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepper_integrates_power() {
        let mut sim = SimHandle::spawn(SimConfig::default());
        let mut endpoints = sim.endpoints(0);

        endpoints.motor.drive_with_power(10.0);
        thread::sleep(Duration::from_millis(50));
        endpoints.motor.drive_with_power(0.0);

        assert!(sim.position(0) > 0.0);
    }

    #[test]
    fn test_band_crossing_emits_edges() {
        let mut sim = SimHandle::spawn(SimConfig {
            initial_positions: [0.0, 0.0],
            ..SimConfig::default()
        });
        let mut endpoints = sim.endpoints(0);

        // 向上穿过底层窗口
        endpoints.motor.drive_with_power(15.0);
        let rising = endpoints
            .events
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(rising.floor, Floor::Ground);
        assert_eq!(rising.edge, Edge::Rising);

        let falling = endpoints
            .events
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(falling.floor, Floor::Ground);
        assert_eq!(falling.edge, Edge::Falling);

        endpoints.motor.drive_with_power(0.0);
    }

    #[test]
    fn test_board_register_round_trip() {
        let sim = SimHandle::spawn(SimConfig::default());
        let mut board = sim.board();
        board.connect().unwrap();

        // 写 0xA3 = 1（布局同真实请求帧：device, fc, sub, quantity, values, tag, crc）
        let mut write = vec![0x01, 0x06, 0xA3, 0x01, 0x01];
        write.extend_from_slice(&[0x09, 0x06, 0x02, 0x00]);
        let checksum = crc::compute(&write);
        write.extend_from_slice(&checksum.to_le_bytes());

        board.send(&write).unwrap();
        let ack = board.receive_exact(5).unwrap();
        assert!(crc::verify(&ack));
        assert_eq!(sim.register(0xA3), 1);
    }

    #[test]
    fn test_brake_freezes_position() {
        let mut sim = SimHandle::spawn(SimConfig {
            initial_positions: [500.0, 0.0],
            ..SimConfig::default()
        });
        let mut endpoints = sim.endpoints(0);

        endpoints.motor.drive_with_power(-10.0);
        thread::sleep(Duration::from_millis(20));
        endpoints.motor.brake();
        thread::sleep(Duration::from_millis(10));
        let frozen = sim.position(0);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(sim.position(0), frozen);
    }
}
