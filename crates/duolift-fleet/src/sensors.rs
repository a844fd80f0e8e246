//! 楼层传感器接口
//!
//! 外部传感器源（GPIO 垫片）负责去抖，并把每一次沿变化作为
//! [`FloorEvent`] 推入 crossbeam 通道；本模块提供校准用的
//! "限时等待指定沿"原语，它与停机信号组合，随时可被取消。

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use thiserror::Error;
use tracing::trace;

use crate::floor::Floor;
use crate::shutdown::ShutdownSignal;

/// 传感器沿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// 上升沿（进入传感器窗口）
    Rising,
    /// 下降沿（离开传感器窗口）
    Falling,
}

/// 一次去抖后的传感器沿事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorEvent {
    pub floor: Floor,
    pub edge: Edge,
}

/// 楼层传感器电平源
///
/// 校准起步时需要读取底层传感器的当前电平；沿事件另走通道。
/// 实现只需暴露只读电平，因此要求 `Sync`。
pub trait FloorSensors: Send + Sync + 'static {
    /// 某一层传感器当前是否处于触发态
    fn level(&self, floor: Floor) -> bool;
}

/// 等待失败原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWaitError {
    /// 限时内未等到目标沿
    #[error("timed out waiting for sensor edge")]
    TimedOut,

    /// 停机信号触发，或传感器源已消失
    #[error("wait cancelled by shutdown")]
    Cancelled,
}

/// 限时等待某一层的指定沿
///
/// 语义与直连 GPIO 的阻塞等待一致：只认调用之后发生的沿。
/// 调用时先丢弃通道里已积压的事件，等待期间其他楼层或其他方向的
/// 沿被消费并忽略。停机触发时立刻返回 [`EdgeWaitError::Cancelled`]。
pub fn wait_for_edge(
    events: &Receiver<FloorEvent>,
    floor: Floor,
    edge: Edge,
    timeout: Duration,
    shutdown: &ShutdownSignal,
) -> Result<(), EdgeWaitError> {
    // 积压事件先于本次等待发生，不作数
    while let Ok(stale) = events.try_recv() {
        trace!(?stale, "discarding stale sensor edge");
    }

    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EdgeWaitError::TimedOut);
        }

        select! {
            recv(events) -> event => match event {
                Ok(ev) if ev.floor == floor && ev.edge == edge => return Ok(()),
                Ok(ev) => trace!(?ev, "ignoring unrelated sensor edge"),
                // 传感器源消失只发生在停机拆除时
                Err(_) => return Err(EdgeWaitError::Cancelled),
            },
            recv(shutdown.receiver()) -> _ => return Err(EdgeWaitError::Cancelled),
            default(remaining) => return Err(EdgeWaitError::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_matching_edge_returns_ok() {
        let (tx, rx) = unbounded();
        let (_handle, signal) = shutdown_channel();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(FloorEvent {
                floor: Floor::Second,
                edge: Edge::Rising,
            })
            .unwrap();
        });

        let result = wait_for_edge(&rx, Floor::Second, Edge::Rising, Duration::from_secs(2), &signal);
        assert_eq!(result, Ok(()));
        sender.join().unwrap();
    }

    #[test]
    fn test_unrelated_edges_are_skipped() {
        let (tx, rx) = unbounded();
        let (_handle, signal) = shutdown_channel();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            for event in [
                FloorEvent {
                    floor: Floor::First,
                    edge: Edge::Rising,
                },
                FloorEvent {
                    floor: Floor::Second,
                    edge: Edge::Falling,
                },
                FloorEvent {
                    floor: Floor::Second,
                    edge: Edge::Rising,
                },
            ] {
                tx.send(event).unwrap();
            }
        });

        let result = wait_for_edge(&rx, Floor::Second, Edge::Rising, Duration::from_secs(2), &signal);
        assert_eq!(result, Ok(()));
        sender.join().unwrap();
    }

    #[test]
    fn test_stale_events_are_discarded() {
        let (tx, rx) = unbounded();
        let (_handle, signal) = shutdown_channel();

        // 等待开始之前就已经发生的沿不作数
        tx.send(FloorEvent {
            floor: Floor::Second,
            edge: Edge::Rising,
        })
        .unwrap();

        let result =
            wait_for_edge(&rx, Floor::Second, Edge::Rising, Duration::from_millis(20), &signal);
        assert_eq!(result, Err(EdgeWaitError::TimedOut));
    }

    #[test]
    fn test_timeout() {
        let (_tx, rx) = unbounded::<FloorEvent>();
        let (_handle, signal) = shutdown_channel();

        let result = wait_for_edge(&rx, Floor::Ground, Edge::Rising, Duration::from_millis(10), &signal);
        assert_eq!(result, Err(EdgeWaitError::TimedOut));
    }

    #[test]
    fn test_shutdown_cancels_wait() {
        let (_tx, rx) = unbounded::<FloorEvent>();
        let (handle, signal) = shutdown_channel();

        let waiter = std::thread::spawn(move || {
            wait_for_edge(&rx, Floor::Ground, Edge::Rising, Duration::from_secs(30), &signal)
        });

        std::thread::sleep(Duration::from_millis(20));
        handle.shutdown();

        assert_eq!(waiter.join().unwrap(), Err(EdgeWaitError::Cancelled));
    }
}
