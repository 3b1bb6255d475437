// Motor control module for a two-wheel differential drive base
//
// Provides:
// - Roboclaw packet serial protocol (framing, checksum, response decoding)
// - High-level motor controller API over a byte transport
// - Differential drive mixing (body velocity -> wheel tick rates)
// - Encoder odometry (wheel ticks -> pose)

mod driver;
pub mod kinematics;
#[cfg(test)]
pub(crate) mod mock;
pub mod odometry;
pub mod roboclaw;
pub mod transport;

pub use driver::{
    DeviceHealth, EncoderModes, EncoderReading, MotorController, MotorCurrents, SpeedReading,
};
pub use kinematics::{mix, MotorCommand, PidConstants, WheelRates};
pub use odometry::{OdometryIntegrator, OdometryUpdate, Pose, Quaternion, VelocityEstimate};
pub use roboclaw::{Command, Reading, RoboclawBus, RoboclawError};
pub use transport::{SerialTransport, Transport};
