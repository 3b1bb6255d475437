// Byte transport underneath the Roboclaw protocol
//
// The protocol is half-duplex: one request, then the whole response is
// drained byte by byte before the next request goes out. Every read is
// bounded by the configured timeout.

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::roboclaw::{Result, RoboclawError};

/// Blocking, timeout-bounded byte channel to the motor controller
pub trait Transport: Send {
    /// Read a single byte, failing with `RoboclawError::Timeout` if none arrives in time
    fn read_byte(&mut self) -> Result<u8>;

    /// Write all bytes and flush them out
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Change the per-byte read timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Discard every received byte not yet read
    fn clear_input(&mut self) -> Result<()>;
}

/// Serial port transport (8N1, no flow control)
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open the serial port
    ///
    /// Failure here is fatal for the caller: there is no retry loop.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|source| RoboclawError::Unavailable {
                port: port_name.to_string(),
                source,
            })?;

        info!("Opened serial port {} at {} baud", port_name, baud_rate);

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(RoboclawError::Timeout),
            Err(e) => Err(RoboclawError::Io(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| RoboclawError::Io(e.into()))
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| RoboclawError::Io(e.into()))
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        // Port handle closes with the box
        debug!("Closing serial port {}", self.name);
    }
}
