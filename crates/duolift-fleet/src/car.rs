//! 单梯运动控制器
//!
//! 一部电梯 = 一个 [`Car`]：校准、闭环移动、紧急制动与故障处理。
//! 所有方法都取 `&self`，内部状态按并发访问方式拆分保护：
//!
//! - 当前楼层与运动状态：原子单元（传感器监听线程与移动线程共享）
//! - 电机与楼层位置表：互斥锁
//! - 传感器事件接收端：校准期间直接消费，之后移交给监听线程

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, select};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use duolift_bus::BusClient;
use duolift_control::PidController;

use crate::config::CarSettings;
use crate::error::CarError;
use crate::floor::{AtomicCarState, CarState, FLOOR_COUNT, Floor, FloorCell, RequestCode};
use crate::motor::MotorDrive;
use crate::panel::ButtonPanel;
use crate::queue::RequestQueue;
use crate::sensors::{Edge, EdgeWaitError, FloorEvent, FloorSensors, wait_for_edge};
use crate::shutdown::ShutdownSignal;

/// 未校准位置的哨兵值
pub const UNCALIBRATED: i64 = -1;

/// 由上升/下降沿两次编码器读数求出楼层位置（均值向上取整）
fn floor_position_from_readings(rising: u32, falling: u32) -> i64 {
    ((f64::from(rising) + f64::from(falling)) / 2.0).ceil() as i64
}

/// 到站回调能力
///
/// 电梯到站后需要调度器做两件事：熄灭本梯上该楼层码的所有指示灯、
/// 把队列里该码的所有出现清除。注入这个窄能力即可，电梯不持有
/// 调度器本身，避免所有权回环。
pub struct ArrivalHooks {
    queue: Arc<Mutex<RequestQueue>>,
    panel: Arc<ButtonPanel>,
}

impl ArrivalHooks {
    /// 创建到站回调
    pub fn new(queue: Arc<Mutex<RequestQueue>>, panel: Arc<ButtonPanel>) -> Self {
        Self { queue, panel }
    }

    /// 到站处理：熄灯 + 清队
    ///
    /// 指示灯写失败只降级为告警：请求本身已经满足，灯多亮一个
    /// 轮询周期没有安全影响。
    fn on_arrival(&self, car: usize, code: RequestCode) {
        if let Err(e) = self.panel.extinguish_code(car, code) {
            warn!(car, %code, error = %e, "failed to extinguish buttons on arrival");
        }
        let drained = self.queue.lock().drain_satisfied();
        debug!(car, %code, drained, "arrival drained satisfied requests");
    }
}

/// 一部电梯的运动控制器
pub struct Car {
    id: usize,
    bus: Arc<BusClient>,
    motor: Mutex<Box<dyn MotorDrive>>,
    sensors: Box<dyn FloorSensors>,
    /// 校准期间直接消费；之后被 [`Car::spawn_floor_listener`] 取走
    events: Mutex<Option<Receiver<FloorEvent>>>,
    current_floor: FloorCell,
    state: AtomicCarState,
    /// 楼层 → 校准位置，哨兵 [`UNCALIBRATED`] 表示未学到
    positions: Mutex<[i64; FLOOR_COUNT]>,
    hooks: ArrivalHooks,
    settings: CarSettings,
}

impl Car {
    /// 创建新电梯
    ///
    /// # 参数
    ///
    /// - `id`: 电梯编号（0 或 1），同时也是电机编号与队列下标
    /// - `motor` / `sensors` / `events`: 外部硬件垫片注入的端点
    /// - `hooks`: 调度器注入的到站能力
    pub fn new(
        id: usize,
        bus: Arc<BusClient>,
        motor: Box<dyn MotorDrive>,
        sensors: Box<dyn FloorSensors>,
        events: Receiver<FloorEvent>,
        hooks: ArrivalHooks,
        settings: CarSettings,
    ) -> Self {
        Self {
            id,
            bus,
            motor: Mutex::new(motor),
            sensors,
            events: Mutex::new(Some(events)),
            current_floor: FloorCell::new(Floor::Ground),
            state: AtomicCarState::new(CarState::Idle),
            positions: Mutex::new([UNCALIBRATED; FLOOR_COUNT]),
            hooks,
            settings,
        }
    }

    /// 电梯编号
    pub fn id(&self) -> usize {
        self.id
    }

    /// 最近一次传感器确认（或到站覆盖）的楼层
    pub fn current_floor(&self) -> Floor {
        self.current_floor.load(Ordering::SeqCst)
    }

    /// 当前运动状态
    pub fn state(&self) -> CarState {
        self.state.load(Ordering::SeqCst)
    }

    /// 某楼层的校准位置；未校准返回 `None`
    pub fn floor_position(&self, floor: Floor) -> Option<i64> {
        let position = self.positions.lock()[floor.index()];
        (position != UNCALIBRATED).then_some(position)
    }

    fn drive_motor(&self, power: f64) {
        self.motor.lock().drive_with_power(power);
    }

    /// 进入终态故障：停车、置 Fault、报警
    fn enter_fault(&self, context: &str, error: &CarError) {
        if self.state() == CarState::Fault {
            return;
        }
        self.drive_motor(0.0);
        self.state.store(CarState::Fault, Ordering::SeqCst);
        error!(
            car = self.id,
            context,
            %error,
            "car entered terminal fault state; no further dispatch"
        );
    }

    // ==================== 校准 ====================

    /// 校准：学习四个楼层的编码器位置，结束后停到底层
    ///
    /// 阻塞调用，只在调度开始前执行一次。单个楼层等待超时不致命：
    /// 该层保持哨兵值并继续下一层；总线故障则令电梯进入 Fault。
    pub fn calibrate(&self, shutdown: &ShutdownSignal) -> Result<(), CarError> {
        info!(car = self.id, "starting calibration");

        let result = self.calibrate_inner(shutdown);
        match &result {
            Ok(()) => info!(car = self.id, "calibration finished"),
            Err(CarError::Cancelled) => {
                self.drive_motor(0.0);
                info!(car = self.id, "calibration cancelled by shutdown");
            },
            Err(e) => self.enter_fault("calibration", e),
        }
        result
    }

    fn calibrate_inner(&self, shutdown: &ShutdownSignal) -> Result<(), CarError> {
        let events_guard = self.events.lock();
        let events = events_guard.as_ref().ok_or(CarError::SensorsUnavailable)?;

        let starting_position = self.bus.read_encoder(self.id as u8)?;
        debug!(car = self.id, starting_position, "calibration start position");

        // 不在底层且位置为正：先下到底
        if !self.sensors.level(Floor::Ground) && starting_position > 0 {
            self.state.store(CarState::Descending, Ordering::SeqCst);
            self.drive_motor(self.settings.descend_power);
            match wait_for_edge(
                events,
                Floor::Ground,
                Edge::Rising,
                self.settings.rising_timeout(),
                shutdown,
            ) {
                Ok(()) => {},
                Err(EdgeWaitError::TimedOut) => {
                    warn!(car = self.id, "descent to ground timed out; stopping anyway");
                },
                Err(EdgeWaitError::Cancelled) => return Err(CarError::Cancelled),
            }
        }
        self.drive_motor(0.0);

        // 慢速上行，依次记录每层传感器窗口
        self.drive_motor(self.settings.ascend_power);
        self.state.store(CarState::Ascending, Ordering::SeqCst);

        for floor in Floor::ALL {
            match wait_for_edge(
                events,
                floor,
                Edge::Rising,
                self.settings.rising_timeout(),
                shutdown,
            ) {
                Ok(()) => {},
                Err(EdgeWaitError::TimedOut) => {
                    // 超时不致命：该层保持哨兵值
                    warn!(car = self.id, %floor, "calibration timed out; floor stays uncalibrated");
                    continue;
                },
                Err(EdgeWaitError::Cancelled) => return Err(CarError::Cancelled),
            }
            let rising_position = self.bus.read_encoder(self.id as u8)?;

            // 下降沿凑不满限时就只用上升沿附近的两次读数
            match wait_for_edge(
                events,
                floor,
                Edge::Falling,
                self.settings.falling_timeout(),
                shutdown,
            ) {
                Ok(()) | Err(EdgeWaitError::TimedOut) => {},
                Err(EdgeWaitError::Cancelled) => return Err(CarError::Cancelled),
            }
            let falling_position = self.bus.read_encoder(self.id as u8)?;

            self.current_floor.store(floor, Ordering::SeqCst);

            let position = floor_position_from_readings(rising_position, falling_position);
            self.positions.lock()[floor.index()] = position;
            info!(car = self.id, %floor, position, "floor calibrated");
        }

        drop(events_guard);

        self.drive_motor(0.0);
        self.state.store(CarState::Idle, Ordering::SeqCst);

        // 停到底层待命
        info!(car = self.id, "parking at ground floor");
        match self.move_to_floor(RequestCode::Ground, shutdown) {
            // 底层自己没校准出来时无处可停，留在原地待命
            Err(CarError::Uncalibrated(floor)) => {
                warn!(car = self.id, %floor, "cannot park: ground floor uncalibrated");
                Ok(())
            },
            other => other,
        }
    }

    // ==================== 移动 ====================

    /// 闭环移动到 `code` 指向的楼层
    ///
    /// 每次移动都构造全新的 PID 控制器。循环条件：位置误差仍在到站
    /// 窗口之外，**且**传感器确认的当前楼层还不是目标层。
    ///
    /// # 错误
    ///
    /// - [`CarError::NotAFloor`] / [`CarError::Uncalibrated`]: 电梯未动，不故障
    /// - [`CarError::Cancelled`]: 停机取消，电梯停车回到 Idle
    /// - [`CarError::Bus`]: 电梯停车并进入终态 Fault
    pub fn move_to_floor(
        &self,
        code: RequestCode,
        shutdown: &ShutdownSignal,
    ) -> Result<(), CarError> {
        let floor = code.floor().ok_or(CarError::NotAFloor(code))?;
        let target = self
            .floor_position(floor)
            .ok_or(CarError::Uncalibrated(floor))?;

        let result = self.move_inner(code, floor, target, shutdown);
        match &result {
            Ok(()) => {},
            Err(CarError::Cancelled) => {
                self.drive_motor(0.0);
                self.state.store(CarState::Idle, Ordering::SeqCst);
                info!(car = self.id, %floor, "move cancelled by shutdown");
            },
            Err(e) => self.enter_fault("move", e),
        }
        result
    }

    fn move_inner(
        &self,
        code: RequestCode,
        floor: Floor,
        target: i64,
        shutdown: &ShutdownSignal,
    ) -> Result<(), CarError> {
        let mut pid = PidController::with_gains(self.settings.pid_gains());
        pid.update_reference(target as f64);

        let mut current = i64::from(self.bus.read_encoder(self.id as u8)?);
        let direction = if target > current {
            CarState::Ascending
        } else {
            CarState::Descending
        };
        self.state.store(direction, Ordering::SeqCst);

        info!(
            car = self.id,
            from = %self.current_floor(),
            to = %floor,
            current,
            target,
            "starting move"
        );

        while (target - current).abs() > self.settings.arrival_window
            && self.current_floor() != floor
        {
            if shutdown.is_shutdown() {
                return Err(CarError::Cancelled);
            }

            current = i64::from(self.bus.read_encoder(self.id as u8)?);
            let power = pid.control(current as f64);

            self.drive_motor(power);
            // 无符号幅值转发给对侧板
            self.bus
                .send_control_signal(self.id as u8, power.abs() as i32)?;
            trace!(car = self.id, current, power, "move tick");

            if shutdown.wait_timeout(self.settings.move_tick()) {
                return Err(CarError::Cancelled);
            }
        }

        // 到站：停车、熄灯、清队、覆盖当前楼层，再驻留开门
        self.drive_motor(0.0);
        self.state.store(CarState::Idle, Ordering::SeqCst);
        self.hooks.on_arrival(self.id, code);
        self.current_floor.store(floor, Ordering::SeqCst);

        info!(car = self.id, %floor, "arrived; holding doors open");
        let _ = shutdown.wait_timeout(self.settings.dwell());
        Ok(())
    }

    // ==================== 紧急与维护 ====================

    /// 紧急制动
    ///
    /// 置 Emergency 并让电机抱闸。进行中的移动循环不会被打断：
    /// 它的下一次功率命令会覆盖抱闸输出，这是当前硬件约定的行为。
    pub fn emergency(&self) {
        warn!(car = self.id, "emergency stop engaged");
        self.state.store(CarState::Emergency, Ordering::SeqCst);
        self.motor.lock().brake();
    }

    /// 显式解除紧急状态（操作员动作）
    ///
    /// 只允许 Emergency → Idle；Fault 是终态，不可由此恢复。
    /// 返回是否成功解除。
    pub fn clear_emergency(&self) -> bool {
        if self.state.compare_exchange(CarState::Emergency, CarState::Idle) {
            info!(car = self.id, "emergency cleared; car back to idle");
            true
        } else {
            warn!(
                car = self.id,
                state = %self.state(),
                "emergency reset ignored: car is not in emergency state"
            );
            false
        }
    }

    /// 彻底断电（停机拆除用）
    pub fn shutdown_motor(&self) {
        self.motor.lock().shutdown();
    }

    /// 启动楼层监听线程
    ///
    /// 把传感器事件接收端移交给后台线程：每一个沿事件都无条件覆盖
    /// 当前楼层（外部已去抖）。校准完成后调用一次；重复调用返回 `None`。
    pub fn spawn_floor_listener(
        self: &Arc<Self>,
        shutdown: &ShutdownSignal,
    ) -> Option<JoinHandle<()>> {
        let events = self.events.lock().take()?;
        let car = Arc::clone(self);
        let shutdown = shutdown.clone();

        Some(thread::spawn(move || {
            loop {
                select! {
                    recv(events) -> event => match event {
                        Ok(ev) => {
                            trace!(car = car.id, floor = %ev.floor, edge = ?ev.edge, "sensor edge");
                            car.current_floor.store(ev.floor, Ordering::SeqCst);
                        },
                        Err(_) => break,
                    },
                    recv(shutdown.receiver()) -> _ => break,
                }
            }
            debug!(car = car.id, "floor listener stopped");
        }))
    }
}
