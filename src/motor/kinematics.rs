// Differential drive kinematics
// Converts chassis velocity (linear, angular) to per-wheel encoder tick rates,
// and floating PID gains to the controller's 16.16 fixed point.

/// Scale for 16.16 fixed point
const FIXED_POINT_SCALE: f64 = 65536.0;

/// Real-valued wheel tick rates (ticks/s), signed: negative = reverse
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelRates {
    pub left: f64,
    pub right: f64,
}

/// Mix a chassis velocity into wheel tick rates
///
/// # Arguments
/// * `linear` - Forward velocity in m/s
/// * `angular` - Yaw rate in rad/s (positive = counter-clockwise)
/// * `wheel_base` - Distance between the wheels in meters
/// * `ticks_per_meter` - Encoder ticks per meter of wheel travel
pub fn mix(linear: f64, angular: f64, wheel_base: f64, ticks_per_meter: f64) -> WheelRates {
    let half_turn = angular * wheel_base / 2.0;
    WheelRates {
        left: (linear - half_turn) * ticks_per_meter,
        right: (linear + half_turn) * ticks_per_meter,
    }
}

/// Wheel rate command as sent with MixedSpeed: M1 = left, M2 = right.
///
/// On the wire each rate is a 32-bit two's complement big-endian field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorCommand {
    pub left_rate: i32,
    pub right_rate: i32,
}

impl MotorCommand {
    pub fn new(left_rate: i32, right_rate: i32) -> Self {
        Self {
            left_rate,
            right_rate,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Round real rates to ticks/s
    ///
    /// If `max_rate` is given and either wheel exceeds it, both are scaled down
    /// by the same factor so the turn curvature is kept.
    pub fn from_rates(rates: WheelRates, max_rate: Option<u32>) -> Self {
        let mut left = rates.left;
        let mut right = rates.right;

        if let Some(max_rate) = max_rate {
            let max_rate = max_rate as f64;
            let largest = left.abs().max(right.abs());
            if largest > max_rate {
                let scale = max_rate / largest;
                left *= scale;
                right *= scale;
            }
        }

        Self {
            left_rate: rate_to_wire(left),
            right_rate: rate_to_wire(right),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.left_rate == 0 && self.right_rate == 0
    }
}

/// Round to nearest, saturating at the i32 range (NaN -> 0)
fn rate_to_wire(rate: f64) -> i32 {
    // `as` saturates float -> int and maps NaN to 0
    rate.round() as i32
}

/// Encode a floating gain as 16.16 fixed point, saturating to the u32 range
pub fn to_fixed_16_16(value: f64) -> u32 {
    (value * FIXED_POINT_SCALE).round() as u32
}

/// Velocity PID constants as supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidConstants {
    pub kd: f64,
    pub kp: f64,
    pub ki: f64,
    pub qpps: u32,
}

impl PidConstants {
    pub fn new(kd: f64, kp: f64, ki: f64, qpps: u32) -> Self {
        Self { kd, kp, ki, qpps }
    }

    /// Wire fields in controller order: kd, kp, ki, qpps
    pub fn to_fixed(&self) -> [u32; 4] {
        [
            to_fixed_16_16(self.kd),
            to_fixed_16_16(self.kp),
            to_fixed_16_16(self.ki),
            self.qpps,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_velocity() {
        let rates = mix(0.0, 0.0, 0.5, 100.0);
        assert_eq!(rates, WheelRates::default());
        assert!(MotorCommand::from_rates(rates, None).is_zero());
    }

    #[test]
    fn test_straight_line() {
        let rates = mix(1.0, 0.0, 0.5, 100.0);
        assert_eq!(rates.left, 100.0);
        assert_eq!(rates.right, 100.0);
    }

    #[test]
    fn test_positive_yaw_speeds_up_right_wheel() {
        let rates = mix(0.2, 0.5, 0.5, 100.0);
        assert!(rates.right > rates.left);
        // 0.5 * 0.5 / 2 = 0.125 m/s either side of 0.2
        assert!((rates.left - 7.5).abs() < 1e-9);
        assert!((rates.right - 32.5).abs() < 1e-9);
    }

    #[test]
    fn test_spin_in_place_is_symmetric() {
        let rates = mix(0.0, -1.0, 0.4, 250.0);
        assert_eq!(rates.left, -rates.right);
        assert!(rates.left > 0.0);
    }

    #[test]
    fn test_reverse_encodes_twos_complement() {
        let cmd = MotorCommand::from_rates(mix(-0.5, 0.0, 0.5, 100.0), None);
        assert_eq!(cmd, MotorCommand::new(-50, -50));
        assert_eq!(cmd.left_rate.to_be_bytes(), [0xFF, 0xFF, 0xFF, 0xCE]);
    }

    #[test]
    fn test_rounding_and_saturation() {
        assert_eq!(rate_to_wire(2.5), 3);
        assert_eq!(rate_to_wire(-2.5), -3);
        assert_eq!(rate_to_wire(1e12), i32::MAX);
        assert_eq!(rate_to_wire(-1e12), i32::MIN);
        assert_eq!(rate_to_wire(f64::NAN), 0);
    }

    #[test]
    fn test_max_rate_scaling_keeps_ratio() {
        let rates = WheelRates {
            left: 1000.0,
            right: 2000.0,
        };
        let cmd = MotorCommand::from_rates(rates, Some(1000));
        assert_eq!(cmd, MotorCommand::new(500, 1000));

        // Under the limit nothing changes
        let cmd = MotorCommand::from_rates(rates, Some(5000));
        assert_eq!(cmd, MotorCommand::new(1000, 2000));
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(to_fixed_16_16(1.0), 65536);
        assert_eq!(to_fixed_16_16(0.25), 16384);
        assert_eq!(to_fixed_16_16(0.1), 6554); // 6553.6 rounds up
        assert_eq!(to_fixed_16_16(-1.0), 0);
        assert_eq!(to_fixed_16_16(1e9), u32::MAX);
    }

    #[test]
    fn test_pid_field_order() {
        let pid = PidConstants::new(0.25, 0.1, 0.5, 1000);
        assert_eq!(pid.to_fixed(), [16384, 6554, 32768, 1000]);
    }
}
