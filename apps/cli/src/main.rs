//! # Duolift CLI
//!
//! 车队的维护与仿真工具。
//!
//! ## 维护命令（直连外设板，仅 Linux）
//!
//! ```bash
//! duolift-cli encoder --car 0          # 读一次编码器
//! duolift-cli signal --car 0 --power 20  # 发一次控制信号
//! duolift-cli buttons                  # 打印两部电梯的按钮快照
//! duolift-cli reset                    # 把全部按钮寄存器清零
//! ```
//!
//! ## 仿真模式（无硬件）
//!
//! ```bash
//! duolift-cli sim --duration 60 --press 0:9
//! ```
//!
//! 在进程内跑完整的车队栈（校准 → 调度 → 闭环移动），
//! `--press` 在电梯停稳后模拟按下指定按钮，Ctrl-C 随时优雅停机。

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use duolift_bus::BusClient;
use duolift_fleet::{
    ButtonPanel, CAR_COUNT, FleetConfig, FleetScheduler, Floor, SLOT_COUNT, shutdown_channel,
};
use duolift_protocol::codec::FrameCodec;

/// Duolift 车队维护与仿真工具
#[derive(Parser, Debug)]
#[command(name = "duolift-cli")]
#[command(about = "Maintenance and simulation tool for the duolift fleet", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML 配置文件路径（缺省用内置默认值）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 读一次编码器
    Encoder {
        /// 电梯编号（0 或 1）
        #[arg(long)]
        car: u8,
    },

    /// 发一次控制信号
    Signal {
        /// 电梯编号（0 或 1）
        #[arg(long)]
        car: u8,
        /// 带符号占空比（-100..=100）
        #[arg(long)]
        power: i32,
    },

    /// 打印两部电梯的按钮快照
    Buttons,

    /// 把全部按钮寄存器清零
    Reset,

    /// 在进程内仿真整套车队
    Sim {
        /// 运行时长（秒）
        #[arg(long, default_value_t = 60)]
        duration: u64,

        /// 电梯停稳后模拟按下的按钮，格式 car:slot，可重复
        #[arg(long, value_parser = parse_press)]
        press: Vec<(usize, usize)>,
    },
}

/// 解析 `car:slot` 形式的按钮参数
fn parse_press(value: &str) -> Result<(usize, usize), String> {
    let (car, slot) = value
        .split_once(':')
        .ok_or_else(|| format!("expected car:slot, got '{value}'"))?;
    let car: usize = car.parse().map_err(|_| format!("invalid car '{car}'"))?;
    let slot: usize = slot.parse().map_err(|_| format!("invalid slot '{slot}'"))?;
    if car >= CAR_COUNT || slot >= SLOT_COUNT {
        return Err(format!("car must be 0..{CAR_COUNT}, slot 0..{SLOT_COUNT}"));
    }
    Ok((car, slot))
}

fn load_config(path: Option<&PathBuf>) -> Result<FleetConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
        },
        None => Ok(FleetConfig::default()),
    }
}

/// 打开直连外设板的总线客户端
#[cfg(target_os = "linux")]
fn open_bus(config: &FleetConfig) -> Result<Arc<BusClient>> {
    use duolift_link::SerialTransport;

    let transport = SerialTransport::new(&config.bus.device_path);
    let codec = FrameCodec::new(config.bus.device_id, config.bus.identity_tag);
    Ok(Arc::new(
        BusClient::new(transport, codec).with_settle_delay(config.bus.settle_delay()),
    ))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_config: &FleetConfig) -> Result<Arc<BusClient>> {
    bail!("the serial backend is only available on Linux; use `sim` on this platform")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("duolift=info".parse()?)
                .add_directive("duolift_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Encoder { car } => {
            let bus = open_bus(&config)?;
            let position = bus.read_encoder(car)?;
            println!("car {car} encoder: {position}");
        },
        Commands::Signal { car, power } => {
            if !(-100..=100).contains(&power) {
                bail!("power must be within -100..=100");
            }
            let bus = open_bus(&config)?;
            bus.send_control_signal(car, power)?;
            println!("car {car} control signal set to {power}");
        },
        Commands::Buttons => {
            let bus = open_bus(&config)?;
            let panel = ButtonPanel::new(bus);
            for car in 0..CAR_COUNT {
                let snapshot = panel.read_snapshot(car)?;
                println!("car {car}: {snapshot:?}");
            }
        },
        Commands::Reset => {
            let bus = open_bus(&config)?;
            let panel = ButtonPanel::new(bus);
            panel.reset_all()?;
            println!("all button registers cleared");
        },
        Commands::Sim { duration, press } => run_sim(config, duration, press)?,
    }

    Ok(())
}

/// 进程内仿真：仿真板卡 + 完整车队栈
fn run_sim(mut config: FleetConfig, duration: u64, press: Vec<(usize, usize)>) -> Result<()> {
    use duolift_sim::{SimConfig, SimHandle};

    // 仿真不需要等真实板卡整定
    config.bus.settle_delay_ms = 0;

    let mut sim = SimHandle::spawn(SimConfig::default());
    let bus = Arc::new(
        BusClient::new(
            sim.board(),
            FrameCodec::new(config.bus.device_id, config.bus.identity_tag),
        )
        .with_settle_delay(Duration::ZERO),
    );

    let endpoints = [sim.endpoints(0), sim.endpoints(1)];
    let mut scheduler = FleetScheduler::new(bus, endpoints, config);

    let (handle, signal) = shutdown_channel();
    {
        let handle = handle.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received; shutting down");
            handle.shutdown();
        })
        .context("failed to install signal handler")?;
    }

    info!(duration, "starting fleet simulation");
    let runner = {
        let signal = signal.clone();
        std::thread::spawn(move || {
            if let Err(e) = scheduler.run(&signal) {
                warn!(error = %e, "scheduler stopped with error");
            }
            scheduler
        })
    };

    // 电梯停稳后模拟按钮按压
    let ground = sim.floor_position(Floor::Ground);
    let mut pending_press: Vec<(usize, usize)> = press;
    let deadline = Instant::now() + Duration::from_secs(duration);

    while Instant::now() < deadline && !signal.is_shutdown() {
        std::thread::sleep(Duration::from_millis(500));

        let parked = (0..CAR_COUNT).all(|car| (sim.position(car) - ground).abs() <= 60.0);
        if parked && !pending_press.is_empty() {
            for (car, slot) in pending_press.drain(..) {
                info!(car, slot, "simulating button press");
                sim.press_button(car, slot);
            }
        }

        for car in 0..CAR_COUNT {
            info!(car, position = sim.position(car) as i64, "sim status");
        }
    }

    handle.shutdown();
    let scheduler = runner
        .join()
        .map_err(|_| anyhow::anyhow!("scheduler thread panicked"))?;

    for car in 0..CAR_COUNT {
        let info = scheduler.car_info(car);
        println!("car {car}: floor = {}, state = {}", info.floor, info.state);
    }

    Ok(())
}
