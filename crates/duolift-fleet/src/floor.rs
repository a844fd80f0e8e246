//! 楼层、请求码与电梯运动状态
//!
//! 传感器回调与移动循环会并发触碰同一部电梯的当前楼层与运动状态，
//! 因此二者都以 `AtomicU8` 包装共享，杜绝撕裂读写。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 楼层数量（本机型固定四层）
pub const FLOOR_COUNT: usize = 4;

/// 楼层，自下而上有序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Floor {
    Ground = 0,
    First = 1,
    Second = 2,
    Third = 3,
}

impl Floor {
    /// 自下而上的全部楼层
    pub const ALL: [Floor; FLOOR_COUNT] = [Floor::Ground, Floor::First, Floor::Second, Floor::Third];

    /// 位置表下标
    pub fn index(self) -> usize {
        self as usize
    }

    /// 从 u8 转换，无效值回落到 Ground
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Floor::Ground,
            1 => Floor::First,
            2 => Floor::Second,
            3 => Floor::Third,
            _ => Floor::Ground,
        }
    }

    /// 对应的请求码
    pub fn code(self) -> RequestCode {
        match self {
            Floor::Ground => RequestCode::Ground,
            Floor::First => RequestCode::First,
            Floor::Second => RequestCode::Second,
            Floor::Third => RequestCode::Third,
        }
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Floor::Ground => "ground",
            Floor::First => "first",
            Floor::Second => "second",
            Floor::Third => "third",
        };
        f.write_str(label)
    }
}

/// 楼层请求码
///
/// 四个楼层各一个码，外加最高优先级的紧急码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    Ground = 0,
    First = 1,
    Second = 2,
    Third = 3,
    Emergency = 4,
}

impl RequestCode {
    /// 请求码指向的楼层；紧急码不指向任何楼层
    pub fn floor(self) -> Option<Floor> {
        match self {
            RequestCode::Ground => Some(Floor::Ground),
            RequestCode::First => Some(Floor::First),
            RequestCode::Second => Some(Floor::Second),
            RequestCode::Third => Some(Floor::Third),
            RequestCode::Emergency => None,
        }
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            RequestCode::Ground => 'G',
            RequestCode::First => 'F',
            RequestCode::Second => 'S',
            RequestCode::Third => 'T',
            RequestCode::Emergency => 'E',
        };
        write!(f, "{letter}")
    }
}

/// 电梯运动状态
///
/// `Fault` 是终态：运动中或校准中的总线故障会把电梯停在这里，
/// 调度器观察到后拒绝继续派发。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CarState {
    /// 静止（初始与终点状态）
    #[default]
    Idle = 0,
    /// 上行中
    Ascending = 1,
    /// 下行中
    Descending = 2,
    /// 紧急制动，仅显式复位可解除
    Emergency = 3,
    /// 终态故障，重启前不再接受派发
    Fault = 4,
}

impl CarState {
    /// 从 u8 转换，无效值回落到 Fault
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CarState::Idle,
            1 => CarState::Ascending,
            2 => CarState::Descending,
            3 => CarState::Emergency,
            4 => CarState::Fault,
            _ => CarState::Fault,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否可接受新的移动派发
    pub fn is_idle(self) -> bool {
        self == CarState::Idle
    }
}

impl fmt::Display for CarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CarState::Idle => "Idle",
            CarState::Ascending => "Ascending",
            CarState::Descending => "Descending",
            CarState::Emergency => "Emergency",
            CarState::Fault => "Fault",
        };
        f.write_str(label)
    }
}

/// 当前楼层（原子版本，传感器回调与移动循环共享）
#[derive(Debug)]
pub struct FloorCell {
    inner: AtomicU8,
}

impl FloorCell {
    /// 创建新的楼层单元
    pub fn new(floor: Floor) -> Self {
        Self {
            inner: AtomicU8::new(floor as u8),
        }
    }

    /// 读取当前楼层
    pub fn load(&self, ordering: Ordering) -> Floor {
        Floor::from_u8(self.inner.load(ordering))
    }

    /// 覆盖当前楼层（最后写入者胜出）
    pub fn store(&self, floor: Floor, ordering: Ordering) {
        self.inner.store(floor as u8, ordering);
    }
}

/// 运动状态（原子版本）
#[derive(Debug)]
pub struct AtomicCarState {
    inner: AtomicU8,
}

impl AtomicCarState {
    /// 创建新的状态单元
    pub fn new(state: CarState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 读取当前状态
    pub fn load(&self, ordering: Ordering) -> CarState {
        CarState::from_u8(self.inner.load(ordering))
    }

    /// 设置状态
    pub fn store(&self, state: CarState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 仅当当前状态为 `current` 时切换到 `new`
    pub fn compare_exchange(&self, current: CarState, new: CarState) -> bool {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_floor_ordering() {
        assert!(Floor::Ground < Floor::Third);
        assert_eq!(Floor::ALL[0], Floor::Ground);
        assert_eq!(Floor::ALL[3], Floor::Third);
    }

    #[test]
    fn test_request_code_floor_mapping() {
        assert_eq!(RequestCode::Second.floor(), Some(Floor::Second));
        assert_eq!(RequestCode::Emergency.floor(), None);
        assert_eq!(Floor::Third.code(), RequestCode::Third);
    }

    #[test]
    fn test_car_state_from_u8() {
        assert_eq!(CarState::from_u8(0), CarState::Idle);
        assert_eq!(CarState::from_u8(3), CarState::Emergency);
        assert_eq!(CarState::from_u8(200), CarState::Fault); // 无效值
    }

    #[test]
    fn test_atomic_state_compare_exchange() {
        let state = AtomicCarState::new(CarState::Emergency);
        assert!(state.compare_exchange(CarState::Emergency, CarState::Idle));
        assert_eq!(state.load(Ordering::SeqCst), CarState::Idle);

        // 已不是 Emergency，二次复位失败
        assert!(!state.compare_exchange(CarState::Emergency, CarState::Idle));
    }

    /// 并发写入者与读取者压测：读到的永远是某个写入者写下的合法楼层，
    /// 不存在丢失更新之外的任何撕裂现象
    #[test]
    fn test_floor_cell_concurrent_stress() {
        use rand::Rng;

        let cell = Arc::new(FloorCell::new(Floor::Ground));
        let mut writers = Vec::new();

        for _ in 0..4 {
            let cell = cell.clone();
            writers.push(std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..10_000 {
                    let floor = Floor::ALL[rng.gen_range(0..FLOOR_COUNT)];
                    cell.store(floor, Ordering::SeqCst);
                }
            }));
        }

        let reader = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                for _ in 0..40_000 {
                    let floor = cell.load(Ordering::SeqCst);
                    assert!(Floor::ALL.contains(&floor));
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
    }
}
