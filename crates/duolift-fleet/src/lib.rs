//! # Duolift Fleet
//!
//! 双梯车队的调度与运动控制层。
//!
//! ## 模块
//!
//! - `floor`: 楼层、请求码与原子状态单元
//! - `queue`: 去重 FIFO 请求队列
//! - `panel`: 按钮/指示灯寄存器映射与读写
//! - `sensors` / `motor`: 外部硬件垫片实现的接口
//! - `shutdown`: 可与超时组合的进程级停机信号
//! - `car`: 单梯运动控制器（校准 + 闭环定位 + 紧急/故障）
//! - `scheduler`: 车队调度器（按钮解码、派发、有界移动任务槽）
//! - `config`: 部署配置（TOML）
//!
//! ## 并发模型
//!
//! 调度器在一个长驻线程上轮询；每次派发的移动在该电梯的有界任务槽
//! 里运行；楼层传感器事件由每梯一个的监听线程写入原子楼层单元。
//! 所有对外设板的交易都经由同一个 [`duolift_bus::BusClient`] 串行化。

pub mod car;
pub mod config;
pub mod error;
pub mod floor;
pub mod motor;
pub mod panel;
pub mod queue;
pub mod scheduler;
pub mod sensors;
pub mod shutdown;

// 重新导出常用类型
pub use car::{ArrivalHooks, Car, UNCALIBRATED};
pub use config::{BusSettings, CarSettings, FleetConfig};
pub use error::{CarError, FleetError};
pub use floor::{AtomicCarState, CarState, FLOOR_COUNT, Floor, FloorCell, RequestCode};
pub use motor::MotorDrive;
pub use panel::{ButtonPanel, ButtonSnapshot, CAR_COUNT, EMERGENCY_SLOT, SLOT_CODES, SLOT_COUNT};
pub use queue::RequestQueue;
pub use scheduler::{CarEndpoints, CarInfo, FleetScheduler};
pub use sensors::{Edge, EdgeWaitError, FloorEvent, FloorSensors, wait_for_edge};
pub use shutdown::{ShutdownHandle, ShutdownSignal, shutdown_channel};
