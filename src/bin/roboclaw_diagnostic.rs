// Roboclaw diagnostic: READ-ONLY health check of the motor controller
//
// Never sends a motion or configuration command, so it is safe with the
// wheels on the ground.
//
// Usage: cargo run --bin roboclaw_diagnostic -- --port /dev/ttyACM0

use clap::Parser;
use std::time::Duration;

use roboclaw_zenoh_runtime::config::DEFAULT_PORT;
use roboclaw_zenoh_runtime::motor::roboclaw::{DEFAULT_ADDRESS, DEFAULT_BAUDRATE};
use roboclaw_zenoh_runtime::motor::MotorController;

#[derive(Debug, Parser)]
#[command(about = "Read-only Roboclaw health check")]
struct Args {
    #[arg(short, long, default_value = DEFAULT_PORT)]
    port: String,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud_rate: u32,

    #[arg(long, default_value_t = DEFAULT_ADDRESS)]
    address: u8,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
}

fn show<T: std::fmt::Display>(label: &str, value: Option<T>) {
    match value {
        Some(v) => println!("    {:<18} {}", label, v),
        None => println!("    {:<18} ✗ invalid / no response", label),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warn".parse()?),
        )
        .init();

    let args = Args::parse();

    println!("Roboclaw diagnostic (READ-ONLY)");
    println!(
        "Serial port: {} @ {} baud, address 0x{:02X}",
        args.port, args.baud_rate, args.address
    );
    println!();

    println!("Step 1: Opening serial port...");
    let mut claw = match MotorController::open(
        &args.port,
        args.baud_rate,
        args.address,
        Duration::from_millis(args.timeout_ms),
    ) {
        Ok(claw) => {
            println!("  ✓ Serial port opened successfully");
            claw
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected and the controller is powered");
            println!("  - Check the user has permission to open the device");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Reading controller state...");
    show("Firmware:", claw.read_version().get());

    let health = claw.read_health();
    show("Battery:", health.battery_volts.map(|v| format!("{:.1} V", v)));
    show("Temperature:", health.temperature_celsius.map(|t| format!("{:.1} °C", t)));
    show("Error state:", health.error_state.map(|e| format!("0x{:02X}", e)));
    show(
        "Currents:",
        health
            .currents_amps
            .map(|(m1, m2)| format!("M1 {:.2} A, M2 {:.2} A", m1, m2)),
    );
    show(
        "Encoder modes:",
        claw.read_encoder_modes()
            .get()
            .map(|m| format!("M1 0x{:02X}, M2 0x{:02X}", m.m1, m.m2)),
    );
    println!();

    println!("Step 3: Reading encoders...");
    for (name, enc, speed) in [
        ("M1 (left)", claw.read_encoder_m1(), claw.read_speed_m1()),
        ("M2 (right)", claw.read_encoder_m2(), claw.read_speed_m2()),
    ] {
        show(
            name,
            (enc.valid && speed.valid).then(|| {
                format!(
                    "{} ticks (status 0x{:02X}), {} ticks/s",
                    enc.ticks, enc.status, speed.ticks_per_second
                )
            }),
        );
    }
    println!();
    println!("Diagnostic complete. Invalid reads usually mean a wrong baud rate or address.");

    Ok(())
}
