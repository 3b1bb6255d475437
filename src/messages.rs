// Message types exchanged with the middleware

use serde::{Deserialize, Serialize};

use crate::motor::{DeviceHealth, Pose, Quaternion, VelocityEstimate};

// Velocity command from teleop/planner -> runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// m/s, positive = forward
    pub linear: f64,
    /// rad/s, positive = counter-clockwise
    pub angular: f64,
}

/// Odometry published once per control period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometryMessage {
    /// Seconds since the UNIX epoch
    pub timestamp: f64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub pose: Pose,
    pub orientation: Quaternion,
    pub velocity: VelocityEstimate,
}

/// Controller diagnostics, published periodically
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub timestamp: f64,
    pub firmware: Option<String>,
    #[serde(flatten)]
    pub health: DeviceHealth,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// Last encoder read was invalid
    SensingGap,
}
