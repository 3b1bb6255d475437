// Dead-reckoning odometry for a differential drive base
//
// Integrates successive encoder tick pairs into a planar pose. The arc
// update assumes the heading change per tick is small, which holds when the
// loop runs fast relative to the yaw rate.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, warn};

use super::driver::EncoderReading;

/// Planar pose in the odometry frame. `theta` is not wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    /// Heading normalized into (-pi, pi]
    pub fn heading(&self) -> f64 {
        let wrapped = self.theta.rem_euclid(2.0 * PI);
        if wrapped > PI { wrapped - 2.0 * PI } else { wrapped }
    }

    /// Yaw-only quaternion for this pose
    pub fn orientation(&self) -> Quaternion {
        let half = self.theta / 2.0;
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Body velocity estimated from the same update as the pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityEstimate {
    /// m/s
    pub linear: f64,
    /// rad/s
    pub angular: f64,
}

/// Result of feeding one pair of encoder readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OdometryUpdate {
    Updated {
        pose: Pose,
        velocity: VelocityEstimate,
    },
    /// A reading was invalid; nothing changed
    Skipped,
}

/// Odometry integrator. Owns the pose and the tick/time baseline.
#[derive(Debug, Clone)]
pub struct OdometryIntegrator {
    wheel_base: f64,
    ticks_per_meter: f64,
    pose: Pose,
    velocity: VelocityEstimate,
    last_left_ticks: i32,
    last_right_ticks: i32,
    last_timestamp: Instant,
}

impl OdometryIntegrator {
    /// Start at the origin with a zero tick baseline (encoders freshly reset)
    pub fn new(wheel_base: f64, ticks_per_meter: f64, now: Instant) -> Self {
        debug!(
            "Odometry initialized: wheel_base={:.3}m, ticks_per_meter={}",
            wheel_base, ticks_per_meter
        );
        Self {
            wheel_base,
            ticks_per_meter,
            pose: Pose::default(),
            velocity: VelocityEstimate::default(),
            last_left_ticks: 0,
            last_right_ticks: 0,
            last_timestamp: now,
        }
    }

    /// Back to the origin with a zero baseline
    pub fn reset(&mut self, now: Instant) {
        self.pose = Pose::default();
        self.velocity = VelocityEstimate::default();
        self.last_left_ticks = 0;
        self.last_right_ticks = 0;
        self.last_timestamp = now;
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn last_ticks(&self) -> (i32, i32) {
        (self.last_left_ticks, self.last_right_ticks)
    }

    /// Integrate a new pair of encoder readings taken at `now`
    pub fn update(
        &mut self,
        now: Instant,
        left: EncoderReading,
        right: EncoderReading,
    ) -> OdometryUpdate {
        if !left.valid || !right.valid {
            warn!(
                "Invalid encoder reading (left valid={}, right valid={}), skipping odometry update",
                left.valid, right.valid
            );
            return OdometryUpdate::Skipped;
        }

        // Instants never go backwards, so a non-positive step shows up as zero
        let elapsed = now.saturating_duration_since(self.last_timestamp).as_secs_f64();

        // Wrapping deltas survive counter rollover at the i32 boundary
        let delta_left = left.ticks.wrapping_sub(self.last_left_ticks);
        let delta_right = right.ticks.wrapping_sub(self.last_right_ticks);

        let dist_left = delta_left as f64 / self.ticks_per_meter;
        let dist_right = delta_right as f64 / self.ticks_per_meter;

        let dist = (dist_left + dist_right) / 2.0;
        let dtheta = (dist_right - dist_left) / self.wheel_base;

        self.velocity = if elapsed > 0.0 {
            VelocityEstimate {
                linear: dist / elapsed,
                angular: dtheta / elapsed,
            }
        } else {
            VelocityEstimate::default()
        };

        if dist != 0.0 {
            let dx = dtheta.cos() * dist;
            let dy = -dtheta.sin() * dist;
            let (sin_t, cos_t) = self.pose.theta.sin_cos();
            self.pose.x += cos_t * dx - sin_t * dy;
            self.pose.y += sin_t * dx + cos_t * dy;
        }

        if dtheta != 0.0 {
            self.pose.theta += dtheta;
        }

        self.last_left_ticks = left.ticks;
        self.last_right_ticks = right.ticks;
        self.last_timestamp = now;

        OdometryUpdate::Updated {
            pose: self.pose,
            velocity: self.velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const EPS: f64 = 1e-9;

    fn enc(ticks: i32) -> EncoderReading {
        EncoderReading {
            ticks,
            status: 0,
            valid: true,
        }
    }

    fn updated(update: OdometryUpdate) -> (Pose, VelocityEstimate) {
        match update {
            OdometryUpdate::Updated { pose, velocity } => (pose, velocity),
            OdometryUpdate::Skipped => panic!("update was skipped"),
        }
    }

    #[test]
    fn test_zero_delta_keeps_pose() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        odom.update(t0 + Duration::from_secs(1), enc(30), enc(10));
        let before = odom.pose();

        let (pose, vel) = updated(odom.update(t0 + Duration::from_secs(3), enc(30), enc(10)));
        assert_eq!(pose, before);
        assert_eq!(vel, VelocityEstimate::default());
    }

    #[test]
    fn test_straight_line() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        let (pose, vel) = updated(odom.update(t0 + Duration::from_secs(1), enc(50), enc(50)));

        assert!((pose.x - 0.5).abs() < EPS);
        assert_eq!(pose.y, 0.0);
        assert_eq!(pose.theta, 0.0);
        assert!((vel.linear - 0.5).abs() < EPS);
        assert_eq!(vel.angular, 0.0);
    }

    #[test]
    fn test_pure_rotation() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        let (pose, vel) = updated(odom.update(t0 + Duration::from_secs(2), enc(-10), enc(10)));

        // (0.1 - -0.1) / 0.5
        assert_eq!(pose.x, 0.0);
        assert_eq!(pose.y, 0.0);
        assert!((pose.theta - 0.4).abs() < EPS);
        assert_eq!(vel.linear, 0.0);
        assert!((vel.angular - 0.2).abs() < EPS);
    }

    #[test]
    fn test_heading_rotates_displacement() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        // Quarter turn: arc length diff = pi/2 * 0.5
        let turn = (PI / 2.0 * 0.5 * 100.0 / 2.0).round() as i32;
        odom.update(t0 + Duration::from_secs(1), enc(-turn), enc(turn));
        let theta = odom.pose().theta;

        let (pose, _) = updated(odom.update(
            t0 + Duration::from_secs(2),
            enc(-turn + 100),
            enc(turn + 100),
        ));
        // One meter along the current heading
        assert!((pose.x - theta.cos()).abs() < EPS);
        assert!((pose.y - theta.sin()).abs() < EPS);
    }

    #[test]
    fn test_invalid_reading_changes_nothing() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        odom.update(t0 + Duration::from_secs(1), enc(20), enc(40));
        let pose = odom.pose();
        let ticks = odom.last_ticks();

        let bad = EncoderReading {
            ticks: 9999,
            status: 0,
            valid: false,
        };
        assert_eq!(
            odom.update(t0 + Duration::from_secs(2), bad, enc(80)),
            OdometryUpdate::Skipped
        );
        assert_eq!(
            odom.update(t0 + Duration::from_secs(2), enc(80), bad),
            OdometryUpdate::Skipped
        );
        assert_eq!(odom.pose(), pose);
        assert_eq!(odom.last_ticks(), ticks);

        // Next good update measures from the old baseline and old timestamp
        let (_, vel) = updated(odom.update(t0 + Duration::from_secs(3), enc(40), enc(60)));
        assert!((vel.linear - 0.1).abs() < EPS);
    }

    #[test]
    fn test_zero_elapsed_advances_baseline_without_velocity() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        let (pose, vel) = updated(odom.update(t0, enc(10), enc(10)));
        assert_eq!(vel, VelocityEstimate::default());
        assert!((pose.x - 0.1).abs() < EPS);
        assert_eq!(odom.last_ticks(), (10, 10));
    }

    #[test]
    fn test_counter_rollover() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        odom.update(t0 + Duration::from_secs(1), enc(i32::MAX - 4), enc(i32::MAX - 4));
        let x = odom.pose().x;

        let (pose, _) = updated(odom.update(
            t0 + Duration::from_secs(2),
            enc(i32::MIN + 5),
            enc(i32::MIN + 5),
        ));
        assert!((pose.x - x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_theta_is_unbounded() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        let mut ticks = 0;
        for i in 1..=20 {
            ticks += 50;
            odom.update(t0 + Duration::from_secs(i), enc(-ticks), enc(ticks));
        }
        // 20 steps of 2 rad
        let pose = odom.pose();
        assert!((pose.theta - 40.0).abs() < 1e-6);
        let heading = pose.heading();
        assert!(heading > -PI && heading <= PI);
        assert!((heading - (40.0 - 6.0 * 2.0 * PI)).abs() < 1e-9);
    }

    #[test]
    fn test_orientation_quaternion() {
        let q = Pose {
            x: 0.0,
            y: 0.0,
            theta: PI,
        }
        .orientation();
        assert!((q.z - 1.0).abs() < EPS);
        assert!(q.w.abs() < EPS);
    }

    #[test]
    fn test_reset() {
        let t0 = Instant::now();
        let mut odom = OdometryIntegrator::new(0.5, 100.0, t0);
        odom.update(t0 + Duration::from_secs(1), enc(100), enc(300));
        odom.reset(t0 + Duration::from_secs(2));
        assert_eq!(odom.pose(), Pose::default());
        assert_eq!(odom.last_ticks(), (0, 0));
    }
}
