//! 无硬件 Mock 后端
//!
//! [`MockTransport`] 由调用方提供的应答闭包驱动：每发送一帧请求，
//! 闭包返回板卡应答的完整字节串，随后的 `receive_exact` 从中取走。
//! 发送过的每一帧都会记入日志句柄，便于测试断言。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use crate::{LinkError, LinkTransport};

/// 应答闭包：输入请求帧，输出完整响应字节
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// 发送日志句柄
pub type SentLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Mock 传输
///
/// # 示例
///
/// ```rust
/// use duolift_link::{LinkTransport, mock::MockTransport};
///
/// let mut link = MockTransport::new(|request| {
///     // 把请求原样回显
///     request.to_vec()
/// });
/// link.connect().unwrap();
/// link.send(&[0xAA, 0xBB]).unwrap();
/// assert_eq!(link.receive_exact(2).unwrap(), vec![0xAA, 0xBB]);
/// ```
pub struct MockTransport {
    responder: Responder,
    pending: VecDeque<u8>,
    connected: bool,
    sent: SentLog,
}

impl MockTransport {
    /// 创建新的 Mock 传输
    pub fn new(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            connected: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 获取发送日志句柄（可在传输被移走后继续观察）
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }
}

impl LinkTransport for MockTransport {
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
        self.sent.lock().unwrap().push(bytes.to_vec());
        self.pending.extend((self.responder)(bytes));
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
    fn test_send_before_connect() {
        let mut link = MockTransport::new(|_| Vec::new());
        assert!(matches!(link.send(&[0x01]), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_underflow_is_timeout() {
        let mut link = MockTransport::new(|_| vec![0x01, 0x02]);
        link.connect().unwrap();
        link.send(&[0xFF]).unwrap();
        assert!(matches!(link.receive_exact(5), Err(LinkError::Timeout)));
    }

    #[test]
    fn test_sent_log_records_frames() {
        let mut link = MockTransport::new(|_| Vec::new());
        let log = link.sent_log();
        link.connect().unwrap();
        link.send(&[0x01, 0x02]).unwrap();
        link.send(&[0x03]).unwrap();

        let frames = log.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![0x01, 0x02]);
    }
}
