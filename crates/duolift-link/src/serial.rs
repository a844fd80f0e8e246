//! Linux 串口后端
//!
//! 通过 termios 将串口设置为原始模式（115200-8N1，无流控），
//! 读取侧用 `VMIN = 0, VTIME = 1` 的轮询读实现带上限的 `receive_exact`。

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};
use tracing::{debug, trace};

use crate::{LinkError, LinkTransport};

/// 默认读超时
///
/// 板卡在固定整定延迟后一次性吐出整帧响应，500ms 已留了很大余量。
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// 串口传输
///
/// # 示例
///
/// ```rust,no_run
/// use duolift_link::{LinkTransport, SerialTransport};
///
/// let mut link = SerialTransport::new("/dev/serial0");
/// link.connect()?;
/// link.send(&[0x01, 0x23, 0xC1])?;
/// # Ok::<(), duolift_link::LinkError>(())
/// ```
pub struct SerialTransport {
    path: PathBuf,
    file: Option<File>,
    read_timeout: Duration,
}

impl SerialTransport {
    /// 创建新的串口传输（尚未打开）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// 设置读超时
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// 打开设备并配置为原始模式
    fn open(&self) -> Result<File, LinkError> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        let mut tio =
            termios::tcgetattr(&file).map_err(|e| LinkError::Device(e.to_string()))?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, BaudRate::B115200)
            .map_err(|e| LinkError::Device(e.to_string()))?;

        // VMIN = 0, VTIME = 1: read() 最多阻塞 100ms，由上层循环凑满字节数
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;

        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)
            .map_err(|e| LinkError::Device(e.to_string()))?;

        debug!(path = %self.path.display(), "serial port opened (115200-8N1 raw)");
        Ok(file)
    }
}

impl LinkTransport for SerialTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.file.take().is_some() {
            trace!(path = %self.path.display(), "serial port closed");
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let file = self.file.as_mut().ok_or(LinkError::NotConnected)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, LinkError> {
        let file = self.file.as_mut().ok_or(LinkError::NotConnected)?;

        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            if Instant::now() >= deadline {
                trace!(wanted = len, got = filled, "serial read timed out");
                return Err(LinkError::Timeout);
            }
            // VTIME 保证单次 read 最多阻塞 100ms
            let n = file.read(&mut buffer[filled..])?;
            filled += n;
        }

        Ok(buffer)
    }
}
