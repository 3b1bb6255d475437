// High-level motor driver for a two-channel Roboclaw
//
// One method per controller capability, each a fixed mapping onto a command
// number and a response shape. Reads never fail: a timeout, I/O error or
// checksum mismatch comes back as an invalid reading.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::kinematics::{to_fixed_16_16, MotorCommand, PidConstants};
use super::roboclaw::{
    Command, Payload, Reading, RoboclawBus, RoboclawError, VERSION_MAX_LEN,
};
use super::transport::{SerialTransport, Transport};

/// Encoder count with its status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderReading {
    pub ticks: i32,
    /// Underflow / direction / overflow flags as reported by the controller
    pub status: u8,
    pub valid: bool,
}

/// Encoder speed with its status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedReading {
    pub ticks_per_second: i32,
    pub status: u8,
    pub valid: bool,
}

/// Motor currents in 10 mA units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MotorCurrents {
    pub m1: i16,
    pub m2: i16,
}

impl MotorCurrents {
    pub fn amps(&self) -> (f32, f32) {
        (self.m1 as f32 / 100.0, self.m2 as f32 / 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncoderModes {
    pub m1: u8,
    pub m2: u8,
}

/// Device health snapshot, `None` where the read was invalid
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceHealth {
    pub battery_volts: Option<f32>,
    pub temperature_celsius: Option<f32>,
    pub error_state: Option<u8>,
    pub currents_amps: Option<(f32, f32)>,
}

/// High-level driver for the controller. Owns the transport exclusively.
pub struct MotorController<T: Transport> {
    bus: RoboclawBus<T>,
    motion_commanded: bool,
}

impl MotorController<SerialTransport> {
    /// Open the serial port and create the driver
    pub fn open(
        port: &str,
        baud_rate: u32,
        address: u8,
        timeout: Duration,
    ) -> Result<Self, RoboclawError> {
        info!("Opening Roboclaw on {} (address 0x{:02X})", port, address);
        let transport = SerialTransport::open(port, baud_rate, timeout)?;
        Ok(Self::new(transport, address))
    }
}

impl<T: Transport> MotorController<T> {
    pub fn new(transport: T, address: u8) -> Self {
        Self {
            bus: RoboclawBus::new(transport, address),
            motion_commanded: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.bus.address()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), RoboclawError> {
        self.bus.set_timeout(timeout)
    }

    /// Fold transport failures into an invalid reading
    fn settle<V: Default>(
        command: Command,
        result: Result<Reading<V>, RoboclawError>,
    ) -> Reading<V> {
        match result {
            Ok(reading) => {
                if !reading.valid {
                    warn!("Checksum mismatch reading {:?}", command);
                }
                reading
            }
            Err(e) => {
                warn!("Failed to read {:?}: {}", command, e);
                Reading::invalid()
            }
        }
    }

    // === Reads ===

    /// Firmware version string, trailing newline stripped
    pub fn read_version(&mut self) -> Reading<String> {
        let result = self
            .bus
            .read_null_terminated_string(Command::ReadVersion, VERSION_MAX_LEN);
        Self::settle(Command::ReadVersion, result).map(|v| v.trim_end().to_string())
    }

    fn read_with_status(&mut self, command: Command) -> Reading<(i32, u8)> {
        let result = self.bus.read_dword_with_status(command);
        Self::settle(command, result).map(|(value, status)| (value as i32, status))
    }

    pub fn read_encoder_m1(&mut self) -> EncoderReading {
        self.read_encoder(Command::ReadEncoderM1)
    }

    pub fn read_encoder_m2(&mut self) -> EncoderReading {
        self.read_encoder(Command::ReadEncoderM2)
    }

    fn read_encoder(&mut self, command: Command) -> EncoderReading {
        let reading = self.read_with_status(command);
        let (ticks, status) = reading.value;
        EncoderReading {
            ticks,
            status,
            valid: reading.valid,
        }
    }

    pub fn read_speed_m1(&mut self) -> SpeedReading {
        self.read_speed(Command::ReadSpeedM1)
    }

    pub fn read_speed_m2(&mut self) -> SpeedReading {
        self.read_speed(Command::ReadSpeedM2)
    }

    fn read_speed(&mut self, command: Command) -> SpeedReading {
        let reading = self.read_with_status(command);
        let (ticks_per_second, status) = reading.value;
        SpeedReading {
            ticks_per_second,
            status,
            valid: reading.valid,
        }
    }

    /// Board temperature in tenths of a degree Celsius
    pub fn read_temperature(&mut self) -> Reading<u16> {
        let result = self.bus.read_word(Command::ReadTemperature);
        Self::settle(Command::ReadTemperature, result)
    }

    /// Error flags. The checksum byte is always drained.
    pub fn read_error_state(&mut self) -> Reading<u8> {
        let result = self.bus.read_byte_with_checksum(Command::ReadErrorState);
        Self::settle(Command::ReadErrorState, result)
    }

    /// Main battery voltage in tenths of a volt
    pub fn read_main_battery_voltage(&mut self) -> Reading<u16> {
        let result = self.bus.read_word(Command::ReadMainBatteryVoltage);
        Self::settle(Command::ReadMainBatteryVoltage, result)
    }

    /// M1 in the high half, M2 in the low half
    pub fn read_currents(&mut self) -> Reading<MotorCurrents> {
        let result = self.bus.read_dword(Command::ReadCurrents);
        Self::settle(Command::ReadCurrents, result).map(|value| MotorCurrents {
            m1: (value >> 16) as i16,
            m2: value as i16,
        })
    }

    pub fn read_encoder_modes(&mut self) -> Reading<EncoderModes> {
        let result = self.bus.read_word(Command::ReadEncoderModes);
        Self::settle(Command::ReadEncoderModes, result).map(|value| EncoderModes {
            m1: (value >> 8) as u8,
            m2: value as u8,
        })
    }

    /// Battery, temperature, error state and currents in one pass
    pub fn read_health(&mut self) -> DeviceHealth {
        DeviceHealth {
            battery_volts: self
                .read_main_battery_voltage()
                .get()
                .map(|v| v as f32 / 10.0),
            temperature_celsius: self.read_temperature().get().map(|t| t as f32 / 10.0),
            error_state: self.read_error_state().get(),
            currents_amps: self.read_currents().get().map(|c| c.amps()),
        }
    }

    // === Writes ===

    pub fn reset_encoders(&mut self) -> Result<(), RoboclawError> {
        info!("Resetting encoders");
        self.bus.send_command(Command::ResetEncoders, &Payload::new())
    }

    /// Raw PID constants: kd, kp, ki already 16.16 fixed point
    pub fn set_m1_constants(
        &mut self,
        kd: u32,
        kp: u32,
        ki: u32,
        qpps: u32,
    ) -> Result<(), RoboclawError> {
        self.set_constants(Command::SetM1Pid, kd, kp, ki, qpps)
    }

    pub fn set_m2_constants(
        &mut self,
        kd: u32,
        kp: u32,
        ki: u32,
        qpps: u32,
    ) -> Result<(), RoboclawError> {
        self.set_constants(Command::SetM2Pid, kd, kp, ki, qpps)
    }

    fn set_constants(
        &mut self,
        command: Command,
        kd: u32,
        kp: u32,
        ki: u32,
        qpps: u32,
    ) -> Result<(), RoboclawError> {
        debug!(
            "{:?}: kd={} kp={} ki={} qpps={}",
            command, kd, kp, ki, qpps
        );
        let payload = Payload::new().u32(kd).u32(kp).u32(ki).u32(qpps);
        self.bus.send_command(command, &payload)
    }

    pub fn set_m1_velocity_pid(
        &mut self,
        kd: f64,
        kp: f64,
        ki: f64,
        qpps: u32,
    ) -> Result<(), RoboclawError> {
        let (kd, kp, ki) = (to_fixed_16_16(kd), to_fixed_16_16(kp), to_fixed_16_16(ki));
        self.set_m1_constants(kd, kp, ki, qpps)
    }

    pub fn set_m2_velocity_pid(
        &mut self,
        kd: f64,
        kp: f64,
        ki: f64,
        qpps: u32,
    ) -> Result<(), RoboclawError> {
        let (kd, kp, ki) = (to_fixed_16_16(kd), to_fixed_16_16(kp), to_fixed_16_16(ki));
        self.set_m2_constants(kd, kp, ki, qpps)
    }

    /// Same velocity PID on both channels
    pub fn configure_pid(&mut self, pid: PidConstants) -> Result<(), RoboclawError> {
        info!(
            "Configuring velocity PID: kp={} ki={} kd={} qpps={}",
            pid.kp, pid.ki, pid.kd, pid.qpps
        );
        let [kd, kp, ki, qpps] = pid.to_fixed();
        self.set_m1_constants(kd, kp, ki, qpps)?;
        self.set_m2_constants(kd, kp, ki, qpps)
    }

    /// Drive both channels at signed tick rates (M1 = left, M2 = right)
    pub fn set_mixed_speed(&mut self, command: MotorCommand) -> Result<(), RoboclawError> {
        debug!(
            "Setting wheel rates: left={}, right={}",
            command.left_rate, command.right_rate
        );
        if !command.is_zero() {
            self.motion_commanded = true;
        }
        let payload = Payload::new().i32(command.left_rate).i32(command.right_rate);
        self.bus.send_command(Command::MixedSpeed, &payload)?;
        if command.is_zero() {
            self.motion_commanded = false;
        }
        Ok(())
    }

    /// Command zero speed on both channels
    pub fn stop(&mut self) -> Result<(), RoboclawError> {
        info!("Stopping both motors");
        self.set_mixed_speed(MotorCommand::zero())
    }
}

impl<T: Transport> Drop for MotorController<T> {
    fn drop(&mut self) {
        // Only a driver that moved the motors has anything to stop
        if self.motion_commanded {
            if let Err(e) = self.stop() {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}
