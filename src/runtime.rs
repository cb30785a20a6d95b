// Control loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if the teleop or vision process dies, the vehicle stops instead of holding its last speed

use std::time::Duration;

use tokio::time::{Instant, interval};
use tracing::{info, warn};

use crate::alignment::AlignmentController;
use crate::config::{
    TOPIC_ALIGNMENT, TOPIC_CMD_MOTION, TOPIC_HEALTH, TOPIC_VISION_TARGET, VehicleConfig,
};
use crate::messages::{
    AlignmentState, ManualCommand, MotionIntent, RuntimeHealth, TargetOffset, VisionSample,
};
use crate::motor::{Bus, LoopbackTransport, MotionController, MotionError};

/// Where motion intent comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Remote control commands
    Manual,
    /// Vision target alignment
    Align,
}

pub struct Runtime {
    mode: Mode,
    cmd_timeout: Duration,
    latest_cmd: Option<MotionIntent>,
    latest_target: Option<TargetOffset>,
    received_at: Option<Instant>,
    health: RuntimeHealth,
    alignment: AlignmentController,
}

impl Runtime {
    pub fn new(config: &VehicleConfig, mode: Mode) -> Self {
        Self {
            mode,
            cmd_timeout: config.cmd_timeout(),
            latest_cmd: None,
            latest_target: None,
            received_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first sample
            alignment: AlignmentController::new(config.alignment, config.max_speed_rpm),
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming manual command
    pub fn on_command(&mut self, cmd: &ManualCommand) {
        if self.mode != Mode::Manual {
            return;
        }
        self.latest_cmd = Some(MotionIntent::from(cmd));
        self.received_at = Some(Instant::now());
    }

    /// Process incoming vision sample
    pub fn on_vision(&mut self, sample: &VisionSample) {
        if self.mode != Mode::Align {
            return;
        }
        self.latest_target = sample.resolve(self.alignment.config().center());
        self.received_at = Some(Instant::now());
    }

    /// Parse a raw command payload. Malformed payloads are logged and do not feed the watchdog.
    pub fn on_command_payload(&mut self, payload: &[u8]) {
        match serde_json::from_slice::<ManualCommand>(payload) {
            Ok(cmd) => self.on_command(&cmd),
            Err(e) => warn!("Failed to parse command: {}", e),
        }
    }

    /// Parse a raw vision payload. Malformed payloads are logged and do not feed the watchdog.
    pub fn on_vision_payload(&mut self, payload: &[u8]) {
        match serde_json::from_slice::<VisionSample>(payload) {
            Ok(sample) => self.on_vision(&sample),
            Err(e) => warn!("Failed to parse vision sample: {}", e),
        }
    }

    /// Run one control tick; returns the alignment verdict in align mode
    pub fn tick(
        &mut self,
        motion: &mut MotionController,
    ) -> Result<Option<AlignmentState>, MotionError> {
        let age = self.received_at.map(|at| at.elapsed());
        let fresh = age.is_some_and(|age| age <= self.cmd_timeout);

        if fresh {
            self.health = RuntimeHealth::Ok;
        } else {
            // Watchdog triggered - stop the vehicle
            if self.health != RuntimeHealth::CmdStale {
                warn!("Input stale ({:?} old), stopping vehicle", age);
            }
            self.health = RuntimeHealth::CmdStale;
        }

        match self.mode {
            Mode::Manual => {
                let intent = self.latest_cmd.filter(|_| fresh).unwrap_or_default();
                if intent.is_zero() {
                    motion.stop_all()?;
                } else {
                    motion.drive_intent(&intent)?;
                }
                Ok(None)
            }
            Mode::Align => {
                // A stale feed is handled like a lost target
                let target = self.latest_target.filter(|_| fresh);
                let state = self.alignment.step(target, motion)?;
                Ok(Some(state))
            }
        }
    }
}

/// Settings the binary passes to `run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: VehicleConfig,
    pub mode: Mode,
    pub simulate: bool,
}

fn open_buses(
    config: &VehicleConfig,
    simulate: bool,
) -> Result<[Bus; 2], Box<dyn std::error::Error + Send + Sync>> {
    if simulate {
        info!("Simulation: using loopback transports");
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
        Err("built without the `socketcan` feature, run with --simulate".into())
    }
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let RunOptions {
        config,
        mode,
        simulate,
    } = options;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let sub_vision = session.declare_subscriber(TOPIC_VISION_TARGET).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_alignment = session.declare_publisher(TOPIC_ALIGNMENT).await?;

    let buses = open_buses(&config, simulate)?;
    let mut motion = MotionController::start(&config, buses)?;

    let result = async {
        motion.enable_all()?;

        let mut runtime = Runtime::new(&config, mode);
        let mut tick = interval(config.loop_period());
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            "Runtime started in {:?} mode: {}Hz loop, {}ms watchdog timeout",
            mode, config.loop_hz, config.cmd_timeout_ms
        );
        info!("Subscribed to: {}, {}", TOPIC_CMD_MOTION, TOPIC_VISION_TARGET);
        info!("Publishing to: {}, {}", TOPIC_HEALTH, TOPIC_ALIGNMENT);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = &mut ctrl_c => {
                    info!("Interrupted, stopping");
                    break;
                }
            }

            // 1. Drain all pending samples (non-blocking), keep latest
            while let Ok(Some(sample)) = sub_cmd.try_recv() {
                runtime.on_command_payload(&sample.payload().to_bytes());
            }
            while let Ok(Some(sample)) = sub_vision.try_recv() {
                runtime.on_vision_payload(&sample.payload().to_bytes());
            }

            // 2. Drive (includes watchdog logic)
            let alignment = runtime.tick(&mut motion)?;

            // 3. Publish state
            let health_json = serde_json::to_string(&runtime.health())?;
            pub_health.put(health_json).await?;
            if let Some(state) = alignment {
                pub_alignment.put(serde_json::to_string(&state)?).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    }
    .await;

    // Runs on every exit path: stop wheels, join heartbeat, release buses
    let shutdown = motion.shutdown().await;
    result?;
    shutdown?;
    Ok(())
}
