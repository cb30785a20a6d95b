// Motor check: careful, step-by-step spin test on the bench
//
// Usage: cargo run --example motor_check --features socketcan
//        cargo run --example motor_check -- --simulate
//
// Safety features:
// - Explicit confirmation before any motion
// - Slow test speeds
// - Heartbeat runs for the whole test, wheels are stopped before exit

use mecanum_can_runtime::config::VehicleConfig;
use mecanum_can_runtime::messages::MotionIntent;
use mecanum_can_runtime::motor::{Bus, LoopbackTransport, MotionController};
use std::io::{self, Write};
use std::time::Duration;
use tokio::time::sleep;

const SPIN_RPM: i32 = 300;
const SPIN_TIME: Duration = Duration::from_secs(5);
const WHEEL_NAMES: [&str; 4] = ["Front left", "Front right", "Rear right", "Rear left"];

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

fn open_buses(
    config: &VehicleConfig,
    simulate: bool,
) -> Result<[Bus; 2], Box<dyn std::error::Error + Send + Sync>> {
    if simulate {
        return Ok([
            Bus::new(&config.channels[0], LoopbackTransport::new()),
            Bus::new(&config.channels[1], LoopbackTransport::new()),
        ]);
    }

    #[cfg(feature = "socketcan")]
    {
        Ok([
            Bus::open_socketcan(&config.channels[0])?,
            Bus::open_socketcan(&config.channels[1])?,
        ])
    }

    #[cfg(not(feature = "socketcan"))]
    {
        Err("built without the `socketcan` feature, pass --simulate".into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let simulate = std::env::args().any(|arg| arg == "--simulate");
    let config = VehicleConfig::default();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Mecanum Motor Check (WITH MOTION)             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  ⚠  This tool WILL drive the motors!                         ║");
    println!("║  ⚠  Make sure wheels are OFF THE GROUND before proceeding!   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Channels: {} / {}{}",
        config.channels[0],
        config.channels[1],
        if simulate { " (simulated)" } else { "" }
    );
    println!();

    if !confirm("Are the vehicle's wheels OFF THE GROUND?") {
        println!("Please put the vehicle on blocks so wheels can spin freely.");
        return Ok(());
    }

    // ========== STEP 1: Open buses and enable ==========
    println!("Step 1: Opening buses and enabling motors...");
    let buses = open_buses(&config, simulate)?;
    let mut motion = MotionController::start(&config, buses)?;

    let result = run_checks(&mut motion).await;

    // ========== FINAL: Stop and cleanup ==========
    println!();
    println!("Stopping motors...");
    motion.emergency_stop_all();
    motion.shutdown().await?;
    println!("  ✓ Motors stopped, buses released");

    result
}

async fn run_checks(
    motion: &mut MotionController,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    motion.enable_all()?;
    for node in motion.nodes() {
        println!(
            "  ✓ {} (0x{:02X}, station {}) {:?}",
            WHEEL_NAMES[node.wheel.index()],
            node.address,
            node.station_no,
            node.state
        );
    }
    println!();

    // ========== STEP 2: Spin every wheel both ways ==========
    println!("Step 2: All wheels forward {} rpm, then reverse", SPIN_RPM);
    if !confirm("Proceed with spin test?") {
        return Ok(());
    }

    motion.drive([SPIN_RPM; 4])?;
    sleep(SPIN_TIME).await;
    motion.drive([-SPIN_RPM; 4])?;
    sleep(SPIN_TIME).await;
    motion.stop_all()?;
    println!("  ✓ Spin test done");
    println!();

    // ========== STEP 3: Mecanum patterns ==========
    println!("Step 3: Mecanum motion patterns");
    if !confirm("Proceed with motion patterns?") {
        return Ok(());
    }

    let scale = SPIN_RPM as f64;
    let tests = [
        ("Forward", MotionIntent::new(0.0, 1.0, 0.0, scale)),
        ("Backward", MotionIntent::new(0.0, -1.0, 0.0, scale)),
        ("Left", MotionIntent::new(-1.0, 0.0, 0.0, scale)),
        ("Right", MotionIntent::new(1.0, 0.0, 0.0, scale)),
        ("Rotate CCW", MotionIntent::new(0.0, 0.0, 1.0, scale)),
        ("Rotate CW", MotionIntent::new(0.0, 0.0, -1.0, scale)),
    ];

    for (name, intent) in tests {
        println!("  Testing: {}...", name);
        motion.drive_intent(&intent)?;
        let speeds = motion.nodes().map(|n| n.last_commanded_speed);
        println!(
            "    Wheel commands: fl={}, fr={}, rr={}, rl={}",
            speeds[0], speeds[1], speeds[2], speeds[3]
        );
        sleep(Duration::from_secs(1)).await;

        // Stop between tests
        motion.stop_all()?;
        sleep(Duration::from_millis(500)).await;
    }

    println!();
    println!("If the wheels moved as expected, you can now run the full runtime.");
    Ok(())
}
