//! 车队调度器
//!
//! 独占两部电梯、两条请求队列与按钮面板。每个轮询周期：
//! 读快照 → 逐槽解码入队 → 快照归零 → 逐梯派发。
//! 每部电梯同一时刻至多一个在途移动任务（有界任务槽），
//! 任务线程观察停机信号，拆除时统一 join。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crossbeam_channel::Receiver;
use duolift_bus::{BusClient, BusError};

use crate::car::{ArrivalHooks, Car};
use crate::config::FleetConfig;
use crate::error::{CarError, FleetError};
use crate::floor::{CarState, Floor, RequestCode};
use crate::motor::MotorDrive;
use crate::panel::{ButtonPanel, ButtonSnapshot, CAR_COUNT, EMERGENCY_SLOT, SLOT_CODES, SLOT_COUNT};
use crate::queue::RequestQueue;
use crate::sensors::{FloorEvent, FloorSensors};
use crate::shutdown::ShutdownSignal;

/// 外部硬件垫片为一部电梯注入的端点
pub struct CarEndpoints {
    pub motor: Box<dyn MotorDrive>,
    pub sensors: Box<dyn FloorSensors>,
    pub events: Receiver<FloorEvent>,
}

/// 一部电梯的对外状态摘要（显示垫片消费）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarInfo {
    pub floor: Floor,
    pub state: CarState,
}

/// 有界移动任务槽：每部电梯至多一个在途移动
#[derive(Default)]
struct MoveSlot {
    handle: Option<JoinHandle<()>>,
}

impl MoveSlot {
    fn is_free(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// 车队调度器
pub struct FleetScheduler {
    bus: Arc<BusClient>,
    panel: Arc<ButtonPanel>,
    cars: [Arc<Car>; CAR_COUNT],
    queues: [Arc<Mutex<RequestQueue>>; CAR_COUNT],
    snapshots: [ButtonSnapshot; CAR_COUNT],
    slots: [MoveSlot; CAR_COUNT],
    listeners: Vec<JoinHandle<()>>,
    config: FleetConfig,
}

impl FleetScheduler {
    /// 组装整个车队
    ///
    /// 调度器独占两部电梯；每部电梯拿到的只是到站所需的窄能力
    /// （自己的队列 + 面板），不存在反向引用。
    pub fn new(bus: Arc<BusClient>, endpoints: [CarEndpoints; CAR_COUNT], config: FleetConfig) -> Self {
        let panel = Arc::new(ButtonPanel::new(bus.clone()));
        let queues = [
            Arc::new(Mutex::new(RequestQueue::new())),
            Arc::new(Mutex::new(RequestQueue::new())),
        ];

        let [endpoints_a, endpoints_b] = endpoints;
        let build = |id: usize, parts: CarEndpoints| {
            Arc::new(Car::new(
                id,
                bus.clone(),
                parts.motor,
                parts.sensors,
                parts.events,
                ArrivalHooks::new(queues[id].clone(), panel.clone()),
                config.car.clone(),
            ))
        };
        let cars = [build(0, endpoints_a), build(1, endpoints_b)];

        Self {
            bus,
            panel,
            cars,
            queues,
            snapshots: [[0; SLOT_COUNT]; CAR_COUNT],
            slots: [MoveSlot::default(), MoveSlot::default()],
            listeners: Vec::new(),
            config,
        }
    }

    /// 运行调度：校准 → 启动楼层监听 → 轮询直到停机
    ///
    /// 单梯校准失败只把那部电梯留在 Fault；链路级致命故障终止轮询。
    /// 返回前统一拆除：join 在途移动与监听线程、给电机断电。
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), FleetError> {
        for car in &self.cars {
            match car.calibrate(shutdown) {
                Ok(()) => {},
                Err(CarError::Cancelled) => {
                    self.teardown();
                    return Ok(());
                },
                Err(e) => {
                    error!(car = car.id(), error = %e, "calibration failed; car held in fault");
                },
            }
        }

        for car in &self.cars {
            if let Some(handle) = car.spawn_floor_listener(shutdown) {
                self.listeners.push(handle);
            }
        }

        info!("fleet scheduler entering poll loop");
        let result = loop {
            if shutdown.is_shutdown() {
                break Ok(());
            }
            if let Err(e) = self.poll_cycle(shutdown) {
                break Err(e);
            }
        };

        self.teardown();
        result
    }

    /// 一个完整的轮询周期
    fn poll_cycle(&mut self, shutdown: &ShutdownSignal) -> Result<(), FleetError> {
        for car in 0..CAR_COUNT {
            match self.panel.read_snapshot(car) {
                Ok(snapshot) => self.snapshots[car] = snapshot,
                Err(e) if e.is_fatal() => {
                    error!(car, error = %e, "button poll failed fatally");
                    return Err(e.into());
                },
                Err(e) => {
                    // 单次交易级故障：跳过本周期，下周期自然重试
                    warn!(car, error = %e, "button poll failed; skipping cycle");
                    return Ok(());
                },
            }
        }

        self.decode_buttons();

        // 快照归零；该保持点亮的指示灯已在解码时重新写回板卡
        self.snapshots = [[0; SLOT_COUNT]; CAR_COUNT];

        self.dispatch(shutdown);
        Ok(())
    }

    /// 逐槽解码按钮快照（§按钮布局见 panel 模块）
    fn decode_buttons(&mut self) {
        for car in 0..CAR_COUNT {
            let peer = 1 - car;

            for slot in 0..SLOT_COUNT {
                let pressed = self.snapshots[car][slot] != 0;
                let code = SLOT_CODES[slot];

                // 未按下、或该码已在本梯队列中：跳过
                if !pressed || self.queues[car].lock().contains(code) {
                    continue;
                }

                if slot == EMERGENCY_SLOT {
                    // 紧急优先：整条队列被替换，其余槽位不再解码
                    info!(car, "emergency button pressed");
                    self.queues[car].lock().replace_with_emergency();
                    for floor in Floor::ALL {
                        if let Err(e) = self.panel.extinguish_code(car, floor.code()) {
                            warn!(car, %floor, error = %e, "failed to clear indicator");
                        }
                    }
                    break;
                }

                if slot < EMERGENCY_SLOT {
                    // 厅外呼叫：点亮对面电梯未亮的指示灯，两条队列都入队
                    if self.snapshots[peer][slot] == 0 {
                        if let Err(e) = self.panel.light(peer, slot) {
                            warn!(peer, slot, error = %e, "failed to mirror hall indicator");
                        }
                    }
                    for queue in &self.queues {
                        queue.lock().insert(code);
                    }
                    debug!(car, slot, %code, "hall call queued for both cars");
                } else {
                    // 轿厢内呼叫：只进本梯队列
                    self.queues[car].lock().insert(code);
                    debug!(car, slot, %code, "cabin call queued");
                }
            }
        }
    }

    /// 逐梯派发
    fn dispatch(&mut self, shutdown: &ShutdownSignal) {
        for idx in 0..CAR_COUNT {
            let head = self.queues[idx].lock().head();

            match head {
                Some(RequestCode::Emergency) => {
                    self.cars[idx].emergency();
                    self.queues[idx].lock().clear();
                },
                Some(code)
                    if self.cars[idx].state().is_idle() && self.slots[idx].is_free() =>
                {
                    self.spawn_move(idx, code, shutdown);
                },
                // 移动中、故障中或空队列：本周期不动作
                _ => {},
            }

            // 两次单梯检查之间的节流
            if shutdown.wait_timeout(self.config.poll_interval()) {
                return;
            }
        }
    }

    /// 在电梯的任务槽上启动一次移动
    fn spawn_move(&mut self, idx: usize, code: RequestCode, shutdown: &ShutdownSignal) {
        let car = Arc::clone(&self.cars[idx]);
        let queue = Arc::clone(&self.queues[idx]);
        let shutdown = shutdown.clone();

        info!(car = idx, %code, "dispatching move");
        let handle = thread::spawn(move || {
            match car.move_to_floor(code, &shutdown) {
                Ok(()) => {},
                Err(CarError::Cancelled) => {},
                Err(CarError::Uncalibrated(floor)) => {
                    // 无法满足的请求原地清除，否则会永远卡在队首
                    warn!(car = car.id(), %floor, "dropping request for uncalibrated floor");
                    queue.lock().drain_code(code);
                },
                Err(e) => {
                    error!(car = car.id(), error = %e, "move failed");
                },
            }
        });
        self.slots[idx].handle = Some(handle);
    }

    /// 停机拆除：join 在途移动与监听线程，电机断电
    fn teardown(&mut self) {
        info!("fleet scheduler shutting down");
        for slot in &mut self.slots {
            slot.join();
        }
        for handle in self.listeners.drain(..) {
            let _ = handle.join();
        }
        for car in &self.cars {
            car.shutdown_motor();
        }
    }

    // ==================== 对外查询（显示/温度垫片消费） ====================

    /// 某部电梯的楼层与状态摘要
    pub fn car_info(&self, idx: usize) -> CarInfo {
        CarInfo {
            floor: self.cars[idx].current_floor(),
            state: self.cars[idx].state(),
        }
    }

    /// 把某部电梯的温度上报给外设板
    pub fn report_temperature(&self, idx: usize, celsius: f32) -> Result<(), BusError> {
        self.bus.send_temperature(idx as u8, celsius)
    }

    /// 操作员动作：解除某部电梯的紧急状态
    pub fn reset_car(&self, idx: usize) -> bool {
        self.cars[idx].clear_emergency()
    }

    /// 某部电梯的队列内容快照（诊断用）
    pub fn queued_requests(&self, idx: usize) -> Vec<RequestCode> {
        self.queues[idx].lock().iter().collect()
    }
}
