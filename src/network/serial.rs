use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::core::Result;
use super::link::Transceiver;

/// Read timeout used when the UART reports buffered octets
const READ_TIMEOUT: Duration = Duration::from_millis(1);

/// RS-485 line reached through a serial port (8N1, no flow control)
pub struct SerialTransceiver {
    port: Box<dyn SerialPort>,
}

impl SerialTransceiver {
    /// Opens a serial device
    pub fn open(device_path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(device_path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;

        debug!(device = device_path, baud_rate, "serial port opened");
        Ok(Self::from_port(port))
    }

    /// Wraps an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialTransceiver { port }
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transceiver for SerialTransceiver {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }

        let n = available.min(buf.len());
        match self.port.read(&mut buf[..n]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, octets: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, octets)?;
        self.port.flush()
    }
}
