// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Q quit
//
// Usage: cargo run --example teleop
// Publishes MotionIntent JSON for the runtime in manual mode.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use mecanum_can_runtime::config::TOPIC_CMD_MOTION;
use mecanum_can_runtime::messages::MotionIntent;
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [300.0, 1000.0, 2500.0]; // rpm
const INPUT_TIMEOUT_MS: u64 = 100; // Reset axes after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;

    info!("Controls: W/S=forward/back, A/D=strafe, Z/X=rotate, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent axis state in [-1, 1]
    let mut lateral = 0.0;
    let mut longitudinal = 0.0;
    let mut yaw = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 50ms timeout (20Hz effective rate)
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        longitudinal = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        longitudinal = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        lateral = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        lateral = 1.0;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        yaw = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        yaw = -1.0;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            lateral = 0.0;
            longitudinal = 0.0;
            yaw = 0.0;
        }

        // Always publish, the runtime watchdog stops the vehicle if we go quiet
        let intent = MotionIntent::new(lateral, longitudinal, yaw, SPEEDS[speed_idx]);
        publisher.put(serde_json::to_string(&intent)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {} ({} rpm)", label, SPEEDS[idx]);
}
