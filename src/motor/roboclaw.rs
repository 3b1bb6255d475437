// Roboclaw packet serial protocol (7-bit additive checksum variant)
//
// Read request:  [Address, Command]
// Read response: [Data..., Checksum]        checksum seeded with Address + Command
// Write request: [Address, Command, Data..., Checksum]
//
// Checksum = (8-bit wrapping sum of every byte) & 0x7F. Write commands get no reply.

use std::time::Duration;
use tracing::{debug, trace};

use super::transport::Transport;

/// Default serial configuration for the controller
pub const DEFAULT_BAUDRATE: u32 = 38_400;
pub const DEFAULT_ADDRESS: u8 = 0x80;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest version string the controller may send, terminator included
pub const VERSION_MAX_LEN: usize = 32;

const CHECKSUM_MASK: u8 = 0x7F;

/// Command numbers from the controller's published packet serial protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadEncoderM1 = 16,
    ReadEncoderM2 = 17,
    ReadSpeedM1 = 18,
    ReadSpeedM2 = 19,
    ResetEncoders = 20,
    ReadVersion = 21,
    ReadMainBatteryVoltage = 24,
    SetM1Pid = 28,
    SetM2Pid = 29,
    MixedSpeed = 37,
    ReadCurrents = 49,
    ReadTemperature = 82,
    ReadErrorState = 90,
    ReadEncoderModes = 91,
}

/// Error types for Roboclaw communication
#[derive(Debug, thiserror::Error)]
pub enum RoboclawError {
    #[error("Cannot open serial port {port}: {source}")]
    Unavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Timeout waiting for response byte")]
    Timeout,

    #[error("Checksum mismatch for {command:?}: computed 0x{expected:02X}, got 0x{received:02X}")]
    ChecksumMismatch {
        command: Command,
        expected: u8,
        received: u8,
    },

    #[error("Malformed response to {command:?}: {reason}")]
    MalformedResponse { command: Command, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RoboclawError>;

/// Running 8-bit sum, compared on its low 7 bits only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u8);

impl Checksum {
    /// Checksum seeded with the request header, as used for responses
    pub fn seeded(address: u8, command: Command) -> Self {
        let mut crc = Self::default();
        crc.add(address);
        crc.add(command as u8);
        crc
    }

    pub fn over(bytes: &[u8]) -> Self {
        let mut crc = Self::default();
        for &b in bytes {
            crc.add(b);
        }
        crc
    }

    pub fn add(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte);
    }

    /// The byte that goes on the wire
    pub fn value(self) -> u8 {
        self.0 & CHECKSUM_MASK
    }

    /// A trailing byte with its top bit set never matches
    pub fn matches(self, trailing: u8) -> bool {
        self.value() == trailing
    }
}

/// Statically typed payload builder, big-endian fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Two's complement, same width as `u32`
    pub fn i32(mut self, value: i32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Build a write frame: address, command, payload, checksum over all of them
pub fn build_frame(address: u8, command: Command, payload: &Payload) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3 + payload.len());
    frame.push(address);
    frame.push(command as u8);
    frame.extend_from_slice(payload.as_bytes());
    frame.push(Checksum::over(&frame).value());
    frame
}

/// A decoded value together with its checksum verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading<T> {
    pub value: T,
    pub valid: bool,
}

impl<T> Reading<T> {
    pub fn new(value: T, valid: bool) -> Self {
        Self { value, valid }
    }

    /// The value, only if it passed the checksum
    pub fn get(self) -> Option<T> {
        self.valid.then_some(self.value)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        Reading {
            value: f(self.value),
            valid: self.valid,
        }
    }
}

impl<T: Default> Reading<T> {
    pub fn invalid() -> Self {
        Self {
            value: T::default(),
            valid: false,
        }
    }
}

/// Roboclaw bus - framing and checksum-validated decoding over a transport.
///
/// Each `read_*` issues the request and drains the full response, trailing
/// checksum included, so the byte stream stays aligned for the next command.
/// After a read fails partway, late bytes of that response are discarded
/// before the next request goes out.
pub struct RoboclawBus<T: Transport> {
    transport: T,
    address: u8,
    desynced: bool,
}

impl<T: Transport> RoboclawBus<T> {
    pub fn new(transport: T, address: u8) -> Self {
        Self {
            transport,
            address,
            desynced: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.transport.set_timeout(timeout)
    }

    /// Send a write command; the checksum covers address, command and payload
    pub fn send_command(&mut self, command: Command, payload: &Payload) -> Result<()> {
        let frame = build_frame(self.address, command, payload);
        debug!("Send {:?}: {:02X?}", command, frame);
        self.transport.write_all(&frame)
    }

    /// Issue a read request and return the response checksum seed
    fn request(&mut self, command: Command) -> Result<Checksum> {
        if self.desynced {
            debug!("Discarding stale input before {:?}", command);
            self.transport.clear_input()?;
            self.desynced = false;
        }
        trace!("Request {:?} from 0x{:02X}", command, self.address);
        self.transport.write_all(&[self.address, command as u8])?;
        Ok(Checksum::seeded(self.address, command))
    }

    /// Request, decode the body, then check the trailing checksum byte
    fn exchange<V>(
        &mut self,
        command: Command,
        decode: impl FnOnce(&mut Self, &mut Checksum) -> Result<V>,
    ) -> Result<Reading<V>> {
        let result = self.request(command).and_then(|mut crc| {
            let value = decode(self, &mut crc)?;
            let valid = self.finish(command, crc)?;
            Ok(Reading::new(value, valid))
        });
        if result.is_err() {
            self.desynced = true;
        }
        result
    }

    fn read_folded(&mut self, crc: &mut Checksum) -> Result<u8> {
        let byte = self.transport.read_byte()?;
        crc.add(byte);
        Ok(byte)
    }

    fn read_be<const N: usize>(&mut self, crc: &mut Checksum) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        for b in &mut bytes {
            *b = self.read_folded(crc)?;
        }
        Ok(bytes)
    }

    /// Read the trailing checksum byte and compare
    fn finish(&mut self, command: Command, crc: Checksum) -> Result<bool> {
        let received = self.transport.read_byte()?;
        let valid = crc.matches(received);
        if !valid {
            let mismatch = RoboclawError::ChecksumMismatch {
                command,
                expected: crc.value(),
                received,
            };
            debug!("{}", mismatch);
        }
        Ok(valid)
    }

    /// 1 value byte + checksum
    pub fn read_byte_with_checksum(&mut self, command: Command) -> Result<Reading<u8>> {
        self.exchange(command, |bus, crc| bus.read_folded(crc))
    }

    /// 16-bit big-endian value + checksum
    pub fn read_word(&mut self, command: Command) -> Result<Reading<u16>> {
        self.exchange(command, |bus, crc| Ok(u16::from_be_bytes(bus.read_be(crc)?)))
    }

    /// 32-bit big-endian value + checksum
    pub fn read_dword(&mut self, command: Command) -> Result<Reading<u32>> {
        self.exchange(command, |bus, crc| Ok(u32::from_be_bytes(bus.read_be(crc)?)))
    }

    /// 32-bit big-endian value + status byte + checksum (status is summed too)
    pub fn read_dword_with_status(&mut self, command: Command) -> Result<Reading<(u32, u8)>> {
        self.exchange(command, |bus, crc| {
            let value = u32::from_be_bytes(bus.read_be(crc)?);
            let status = bus.read_folded(crc)?;
            Ok((value, status))
        })
    }

    /// Zero-terminated string of at most `max_len` bytes + checksum.
    ///
    /// Without a terminator inside the window the response is malformed and
    /// no checksum byte is read.
    pub fn read_null_terminated_string(
        &mut self,
        command: Command,
        max_len: usize,
    ) -> Result<Reading<String>> {
        self.exchange(command, |bus, crc| {
            let mut text = Vec::with_capacity(max_len);
            for _ in 0..max_len {
                let byte = bus.read_folded(crc)?;
                if byte == 0 {
                    return Ok(String::from_utf8_lossy(&text).into_owned());
                }
                text.push(byte);
            }
            Err(RoboclawError::MalformedResponse {
                command,
                reason: format!("no terminator within {} bytes", max_len),
            })
        })
    }
}
