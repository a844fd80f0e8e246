//! 进程级停机信号
//!
//! 基于关闭 crossbeam 通道实现：句柄一旦触发（或被丢弃），
//! 所有信号克隆体都能立即观察到，并且可以用 `select!` 与超时组合，
//! 让校准等待与移动循环都成为可取消的阻塞。

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

/// 创建一对停机句柄与信号
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = bounded::<()>(0);
    (
        ShutdownHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        ShutdownSignal { rx },
    )
}

/// 停机句柄
///
/// `shutdown()` 可以安全地重复调用（例如信号处理器触发多次）。
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl ShutdownHandle {
    /// 触发停机
    pub fn shutdown(&self) {
        // 丢弃发送端即关闭通道
        self.tx.lock().take();
    }
}

/// 停机信号（可克隆，分发给每个长驻线程）
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// 是否已触发停机（非阻塞）
    pub fn is_shutdown(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// 睡眠 `timeout`，期间停机则提前醒来
    ///
    /// 返回 `true` 表示停机被触发。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        // 通道上从不发送消息；Disconnected 即停机
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// 供 `select!` 组合使用的底层接收端
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
