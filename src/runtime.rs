// Fixed-rate control loop with command watchdog
//
// Each period: drain velocity commands (latest wins), actuate, read both
// encoders, integrate odometry, publish. Serial I/O blocks for at most the
// configured read timeout per byte and runs in `block_in_place`.

use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// local imports
use crate::config::{RuntimeConfig, TOPIC_CMD_VEL, TOPIC_DEVICE, TOPIC_HEALTH, TOPIC_ODOM};
use crate::messages::{DeviceStatus, OdometryMessage, RuntimeHealth, VelocityCommand};
use crate::motor::{
    mix, MotorCommand, MotorController, OdometryIntegrator, OdometryUpdate, RoboclawError,
    Transport,
};

pub struct Runtime<T: Transport> {
    controller: MotorController<T>,
    odometry: OdometryIntegrator,
    config: RuntimeConfig,
    latest_cmd: Option<VelocityCommand>,
    cmd_received_at: Instant,
    last_sent: Option<MotorCommand>,
    cmd_stale: bool,
    sensing_ok: bool,
    firmware: Option<String>,
}

impl<T: Transport> Runtime<T> {
    pub fn new(controller: MotorController<T>, config: RuntimeConfig, now: Instant) -> Self {
        let odometry =
            OdometryIntegrator::new(config.wheel_base_meters, config.ticks_per_meter, now);
        Self {
            controller,
            odometry,
            config,
            latest_cmd: None,
            cmd_received_at: now,
            last_sent: None,
            cmd_stale: true, // Start stale until first cmd
            sensing_ok: true,
            firmware: None,
        }
    }

    /// Configure PID on both channels, zero the encoders, read the firmware version
    pub fn initialize(&mut self, now: Instant) -> Result<(), RoboclawError> {
        self.controller.set_timeout(self.config.timeout())?;
        self.controller.configure_pid(self.config.pid())?;
        self.controller.reset_encoders()?;
        self.odometry.reset(now);

        let version = self.controller.read_version();
        match version.get() {
            Some(version) => {
                info!("Connected to: {} (address 0x{:02X})", version, self.controller.address());
                self.firmware = Some(version);
            }
            None => warn!("Could not read controller firmware version"),
        }
        Ok(())
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: VelocityCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Wheel command based on watchdog state
    fn compute_command(&mut self, now: Instant) -> MotorCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let expired = self
            .config
            .command_timeout()
            .is_some_and(|timeout| cmd_age > timeout);

        match self.latest_cmd {
            Some(ref cmd) if !expired => {
                self.cmd_stale = false;
                let rates = mix(
                    cmd.linear,
                    cmd.angular,
                    self.config.wheel_base_meters,
                    self.config.ticks_per_meter,
                );
                MotorCommand::from_rates(rates, Some(self.config.qpps))
            }
            Some(_) => {
                // Watchdog triggered - stop the robot
                if !self.cmd_stale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.cmd_stale = true;
                MotorCommand::zero()
            }
            None => {
                // No command ever received
                self.cmd_stale = true;
                MotorCommand::zero()
            }
        }
    }

    /// Send the wheel command if it differs from the last one sent
    pub fn actuate(&mut self, now: Instant) -> Result<(), RoboclawError> {
        let command = self.compute_command(now);
        if self.last_sent == Some(command) {
            return Ok(());
        }
        self.controller.set_mixed_speed(command)?;
        self.last_sent = Some(command);
        Ok(())
    }

    /// Read both encoders and integrate; `None` when the cycle is skipped
    pub fn sense(&mut self, now: Instant, timestamp: f64) -> Option<OdometryMessage> {
        let left = self.controller.read_encoder_m1();
        let right = self.controller.read_encoder_m2();

        match self.odometry.update(now, left, right) {
            OdometryUpdate::Updated { pose, velocity } => {
                self.sensing_ok = true;
                Some(OdometryMessage {
                    timestamp,
                    frame_id: self.config.odom_frame_id.clone(),
                    child_frame_id: self.config.base_frame_id.clone(),
                    pose,
                    orientation: pose.orientation(),
                    velocity,
                })
            }
            OdometryUpdate::Skipped => {
                self.sensing_ok = false;
                None
            }
        }
    }

    pub fn device_status(&mut self, timestamp: f64) -> DeviceStatus {
        DeviceStatus {
            timestamp,
            firmware: self.firmware.clone(),
            health: self.controller.read_health(),
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        if self.cmd_stale {
            RuntimeHealth::CmdStale
        } else if !self.sensing_ok {
            RuntimeHealth::SensingGap
        } else {
            RuntimeHealth::Ok
        }
    }

    /// Final zero-velocity command
    pub fn shutdown(&mut self) -> Result<(), RoboclawError> {
        self.latest_cmd = None;
        self.controller.stop()?;
        self.last_sent = Some(MotorCommand::zero());
        Ok(())
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Fatal if the port cannot be opened
    let controller = MotorController::open(
        &config.port,
        config.baud_rate,
        config.address,
        config.timeout(),
    )?;
    let mut runtime = Runtime::new(controller, config.clone(), Instant::now());
    tokio::task::block_in_place(|| runtime.initialize(Instant::now()))?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_device = session.declare_publisher(TOPIC_DEVICE).await?;

    let mut tick = interval(config.loop_period());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_diag: Option<Instant> = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, watchdog {:?}",
        config.update_rate_hz,
        config.command_timeout()
    );
    info!("Subscribed to: {}", TOPIC_CMD_VEL);
    info!("Publishing to: {}, {}, {}", TOPIC_ODOM, TOPIC_HEALTH, TOPIC_DEVICE);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = tick.tick() => {}
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, Instant::now()),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Actuate (includes watchdog logic), then read encoders and integrate
        let now = Instant::now();
        let odom = tokio::task::block_in_place(|| {
            if let Err(e) = runtime.actuate(now) {
                warn!("Failed to send wheel command: {}", e);
            }
            runtime.sense(now, unix_seconds())
        });

        // 3. Publish odometry
        if let Some(odom) = odom {
            pub_odom.put(serde_json::to_string(&odom)?).await?;
        }

        // 4. Publish health
        pub_health.put(serde_json::to_string(&runtime.health())?).await?;

        // 5. Device diagnostics at their own, slower period
        if last_diag.is_none_or(|at| at.elapsed() >= config.diagnostics_period()) {
            let status = tokio::task::block_in_place(|| runtime.device_status(unix_seconds()));
            pub_device.put(serde_json::to_string(&status)?).await?;
            last_diag = Some(Instant::now());
        }
    }

    tokio::task::block_in_place(|| runtime.shutdown())?;
    info!("Motors stopped, releasing serial port");
    Ok(())
}
