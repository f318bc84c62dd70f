//! Serial console port abstraction

use std::{fmt, io::Read, time::Duration};

use crate::core::error::ConsoleResult;

/// Shortest read timeout handed to the serial driver
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Byte source for the board's serial console
///
/// Reads block for at most `timeout` and return `Ok(0)` when nothing
/// arrived in that time.
pub trait ConsolePort: Send + fmt::Debug + 'static {
    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> ConsoleResult<usize>;

    /// Name/path of the underlying device
    fn name(&self) -> &str;
}

/// Console backed by a real serial device
pub struct SerialPortConsole {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialPortConsole {
    /// Open `port_name` at `baud_rate`, 8N1 without flow control
    pub fn open(port_name: &str, baud_rate: u32) -> ConsoleResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(1))
            .open()?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl ConsolePort for SerialPortConsole {
    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> ConsoleResult<usize> {
        self.port.set_timeout(timeout.max(MIN_READ_TIMEOUT))?;
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SerialPortConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPortConsole")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ConsoleError;

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialPortConsole::open("/dev/nonexistent_console_12345", 115_200);
        assert!(matches!(result, Err(ConsoleError::Serial(_))));
    }
}
