// Periodic keep-alive for enabled motor nodes
//
// The motor controllers disable themselves when heartbeats stop arriving.
// One task runs per bus and heartbeats every enabled node on it each period,
// independent of whatever is driving motion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::node::HeartbeatLink;

/// Running heartbeat tasks. Stop with `stop().await` before releasing the buses.
pub struct HeartbeatScheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Spawn one task per distinct bus among `links`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(links: Vec<HeartbeatLink>, period: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut groups: Vec<Vec<HeartbeatLink>> = Vec::new();
        for link in links {
            match groups
                .iter_mut()
                .find(|group| Arc::ptr_eq(group[0].bus(), link.bus()))
            {
                Some(group) => group.push(link),
                None => groups.push(vec![link]),
            }
        }

        let tasks = groups
            .into_iter()
            .map(|group| tokio::spawn(run_bus(group, period, shutdown_rx.clone())))
            .collect::<Vec<_>>();

        info!(
            "Heartbeat started: {} task(s), {}ms period",
            tasks.len(),
            period.as_millis()
        );

        Self { shutdown, tasks }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Signal and abort every task without waiting, for paths that cannot await.
    ///
    /// A task already inside a tick on another worker still finishes that tick;
    /// only `stop()` guarantees nothing is sent afterwards.
    pub fn abort(self) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
        debug!("Heartbeat aborted");
    }

    /// Signal every task and wait for all of them to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Heartbeat task ended abnormally: {}", e);
            }
        }
        info!("Heartbeat stopped");
    }
}

async fn run_bus(links: Vec<HeartbeatLink>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let bus_name = links[0].bus().name().to_string();
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Per-node failure flags so a dead transport warns once, not every tick
    let mut failing = vec![false; links.len()];

    loop {
        tokio::select! {
            _ = tick.tick() => {
                for (link, failing) in links.iter().zip(failing.iter_mut()) {
                    if !link.is_enabled() {
                        continue;
                    }
                    match link.beat() {
                        Ok(()) => {
                            if *failing {
                                info!("Heartbeat to {:?} recovered", link.wheel());
                                *failing = false;
                            }
                        }
                        Err(e) if *failing => debug!("Heartbeat to {:?} still failing: {}", link.wheel(), e),
                        Err(e) => {
                            warn!("Heartbeat to {:?} failed: {}", link.wheel(), e);
                            *failing = true;
                        }
                    }
                }
            }
            // Either a stop request or the scheduler was dropped
            _ = shutdown.changed() => break,
        }
    }

    debug!("Heartbeat task for {} exiting", bus_name);
}
