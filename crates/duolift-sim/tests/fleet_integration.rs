//! 全栈集成测试：仿真被控对象 + 总线 + 车队调度
//!
//! 这里跑的是真实部署同构的线程拓扑：调度器轮询线程、每梯的移动
//! 任务线程与楼层监听线程，全部经由同一个 `BusClient` 访问仿真板卡。

use std::sync::Arc;
use std::time::{Duration, Instant};

use duolift_bus::BusClient;
use duolift_fleet::{
    ArrivalHooks, ButtonPanel, Car, CarSettings, CarState, FleetConfig, FleetScheduler, Floor,
    RequestCode, RequestQueue, shutdown_channel,
};
use duolift_protocol::codec::FrameCodec;
use duolift_sim::{SimConfig, SimHandle};
use parking_lot::Mutex;

const TAG: [u8; 4] = [0x09, 0x06, 0x02, 0x00];

/// 收敛可预测的测试参数：纯比例控制、10ms 闭环、短驻留
fn test_car_settings() -> CarSettings {
    CarSettings {
        kp: 0.01,
        ki: 0.0,
        kd: 0.0,
        move_tick_ms: 10,
        dwell_ms: 20,
        rising_timeout_ms: 5_000,
        falling_timeout_ms: 2_000,
        ..CarSettings::default()
    }
}

fn test_fleet_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.bus.settle_delay_ms = 0;
    config.poll_interval_ms = 5;
    config.car = test_car_settings();
    config
}

fn bus_for(sim: &SimHandle) -> Arc<BusClient> {
    Arc::new(
        BusClient::new(sim.board(), FrameCodec::new(0x01, TAG))
            .with_settle_delay(Duration::ZERO),
    )
}

/// 轮询等待条件成立
fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn near(position: f64, target: f64) -> bool {
    (position - target).abs() <= 60.0
}

/// 单梯校准：四个楼层依次学到单调递增的位置，结束后停回底层
#[test]
fn calibration_learns_monotonic_positions_and_parks() {
    let mut sim = SimHandle::spawn(SimConfig::default());
    let bus = bus_for(&sim);
    let endpoints = sim.endpoints(0);

    let panel = Arc::new(ButtonPanel::new(bus.clone()));
    let queue = Arc::new(Mutex::new(RequestQueue::new()));
    let car = Car::new(
        0,
        bus,
        endpoints.motor,
        endpoints.sensors,
        endpoints.events,
        ArrivalHooks::new(queue, panel),
        test_car_settings(),
    );

    let (_handle, signal) = shutdown_channel();
    car.calibrate(&signal).unwrap();

    let positions: Vec<i64> = Floor::ALL
        .iter()
        .map(|&floor| car.floor_position(floor).expect("floor not calibrated"))
        .collect();
    // 自下而上单调递增
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{positions:?}");
    // 每层学到的位置都落在传感器窗口附近
    for (&floor, &learned) in Floor::ALL.iter().zip(&positions) {
        assert!(
            near(learned as f64, sim.floor_position(floor)),
            "floor {floor}: learned {learned}, true {}",
            sim.floor_position(floor)
        );
    }

    assert_eq!(car.state(), CarState::Idle);
    assert_eq!(car.current_floor(), Floor::Ground);
    assert!(near(sim.position(0), sim.floor_position(Floor::Ground)));
}

/// 单个楼层传感器失效：该层超时跳过、保持哨兵，其余楼层照常校准
#[test]
fn calibration_timeout_skips_only_the_dead_floor() {
    let mut sim = SimHandle::spawn(SimConfig {
        // 顶层传感器放到永远到不了的位置，等价于失效
        floor_positions: [100.0, 600.0, 1100.0, 9_000_000.0],
        ..SimConfig::default()
    });
    let bus = bus_for(&sim);
    let endpoints = sim.endpoints(0);

    let panel = Arc::new(ButtonPanel::new(bus.clone()));
    let queue = Arc::new(Mutex::new(RequestQueue::new()));
    let car = Car::new(
        0,
        bus,
        endpoints.motor,
        endpoints.sensors,
        endpoints.events,
        ArrivalHooks::new(queue, panel),
        CarSettings {
            rising_timeout_ms: 500,
            ..test_car_settings()
        },
    );

    let (_handle, signal) = shutdown_channel();
    car.calibrate(&signal).unwrap();

    assert!(car.floor_position(Floor::Ground).is_some());
    assert!(car.floor_position(Floor::First).is_some());
    assert!(car.floor_position(Floor::Second).is_some());
    assert!(car.floor_position(Floor::Third).is_none());
    assert_eq!(car.state(), CarState::Idle);
}

/// 端到端：校准两部电梯，按下轿厢二层按钮，电梯闭环到站，
/// 指示灯熄灭、状态回到 Idle
#[test]
fn cabin_call_drives_car_to_second_floor() {
    let mut sim = SimHandle::spawn(SimConfig::default());
    let bus = bus_for(&sim);
    let endpoints = [sim.endpoints(0), sim.endpoints(1)];
    let mut scheduler = FleetScheduler::new(bus, endpoints, test_fleet_config());

    let (handle, signal) = shutdown_channel();
    let runner = std::thread::spawn(move || {
        scheduler.run(&signal).unwrap();
        scheduler
    });

    // 两部电梯校准完毕并停回底层
    let ground = sim.floor_position(Floor::Ground);
    assert!(
        wait_until(Duration::from_secs(30), || {
            near(sim.position(0), ground) && near(sim.position(1), ground)
        }),
        "cars never parked at ground"
    );

    // 按下电梯 A 轿厢里的二层按钮（槽位 9，寄存器 0x09）
    sim.press_button(0, 9);

    let second = sim.floor_position(Floor::Second);
    assert!(
        wait_until(Duration::from_secs(30), || {
            near(sim.position(0), second) && sim.register(0x09) == 0
        }),
        "car never arrived at second floor"
    );
    // 电梯 B 不该被轿厢呼叫牵动
    assert!(near(sim.position(1), ground));

    // 留出到站驻留与队列清理的时间
    std::thread::sleep(Duration::from_millis(300));
    handle.shutdown();
    let scheduler = runner.join().unwrap();

    let info = scheduler.car_info(0);
    assert_eq!(info.floor, Floor::Second);
    assert_eq!(info.state, CarState::Idle);
}

/// 紧急按钮：整条队列被紧急码接管，电梯抱闸进入 Emergency，
/// 显式复位后恢复 Idle
#[test]
fn emergency_button_brakes_car_until_reset() {
    let mut sim = SimHandle::spawn(SimConfig::default());
    let bus = bus_for(&sim);
    let endpoints = [sim.endpoints(0), sim.endpoints(1)];
    let mut scheduler = FleetScheduler::new(bus, endpoints, test_fleet_config());

    let (handle, signal) = shutdown_channel();
    let runner = std::thread::spawn(move || {
        scheduler.run(&signal).unwrap();
        scheduler
    });

    let ground = sim.floor_position(Floor::Ground);
    assert!(
        wait_until(Duration::from_secs(30), || {
            near(sim.position(0), ground) && near(sim.position(1), ground)
        }),
        "cars never parked at ground"
    );

    // 电梯 B 的紧急按钮
    sim.press_button(1, 6);
    std::thread::sleep(Duration::from_millis(300));

    handle.shutdown();
    let scheduler = runner.join().unwrap();

    assert_eq!(scheduler.car_info(1).state, CarState::Emergency);
    assert_eq!(scheduler.car_info(0).state, CarState::Idle);
    // 紧急后的队列不含任何楼层请求
    assert!(
        scheduler
            .queued_requests(1)
            .iter()
            .all(|&code| code == RequestCode::Emergency)
    );

    // 操作员复位
    assert!(scheduler.reset_car(1));
    assert_eq!(scheduler.car_info(1).state, CarState::Idle);
}

/// 厅外呼叫镜像：一部电梯的厅外按钮点亮另一部的同槽指示灯
#[test]
fn hall_call_lights_peer_indicator() {
    let mut sim = SimHandle::spawn(SimConfig::default());
    let bus = bus_for(&sim);
    let endpoints = [sim.endpoints(0), sim.endpoints(1)];
    let mut scheduler = FleetScheduler::new(bus, endpoints, test_fleet_config());

    let (handle, signal) = shutdown_channel();
    let runner = std::thread::spawn(move || {
        scheduler.run(&signal).unwrap();
        scheduler
    });

    let ground = sim.floor_position(Floor::Ground);
    assert!(
        wait_until(Duration::from_secs(30), || {
            near(sim.position(0), ground) && near(sim.position(1), ground)
        }),
        "cars never parked at ground"
    );

    // 电梯 A 的厅外三层按钮（槽位 5）→ 对面 0xA5 应被点亮
    sim.press_button(0, 5);
    assert!(
        wait_until(Duration::from_secs(10), || sim.register(0xA5) == 1),
        "peer indicator was never lit"
    );

    // 两部电梯都被派去三层
    let third = sim.floor_position(Floor::Third);
    assert!(
        wait_until(Duration::from_secs(30), || {
            near(sim.position(0), third) && near(sim.position(1), third)
        }),
        "cars never reached third floor"
    );

    std::thread::sleep(Duration::from_millis(300));
    handle.shutdown();
    let scheduler = runner.join().unwrap();

    assert_eq!(scheduler.car_info(0).floor, Floor::Third);
    assert_eq!(scheduler.car_info(1).floor, Floor::Third);
}
