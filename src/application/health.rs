//! Connectivity health service
//!
//! Runs the probe cycles on their own task, independent of the signaling
//! transport, and reports health changes to the dispatch loop.

use crate::application::runtime::Input;
use crate::config::ConnectivityConfig;
use crate::domain::connection::{
    ConnectivityProbe, HealthMonitor, HealthSignal, HealthTier, ProbeClass, ProbeCycle,
};
use futures::future::{select_ok, BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

pub struct HealthService {
    probe: Arc<dyn ConnectivityProbe>,
    config: ConnectivityConfig,
    monitor: HealthMonitor,
}

impl HealthService {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: ConnectivityConfig) -> Self {
        let monitor = HealthMonitor::new(config.healthy_interval(), config.degraded_interval());
        Self {
            probe,
            config,
            monitor,
        }
    }

    pub fn tier(&self) -> HealthTier {
        self.monitor.tier()
    }

    /// Probe both classes once. Returns the new signal when it changed.
    pub async fn run_cycle(&mut self) -> Option<HealthSignal> {
        let internet = self.config.internet_probe_urls.clone();
        let signaling = self.config.signaling_probe_urls.clone();

        let (internet_reachable, signaling_reachable) = futures::join!(
            self.probe_class(ProbeClass::Internet, internet),
            self.probe_class(ProbeClass::Signaling, signaling),
        );

        let cycle = ProbeCycle {
            internet_reachable,
            signaling_reachable,
        };
        debug!("Probe cycle {:?}", cycle);
        self.monitor.record_cycle(cycle)
    }

    /// A class is reachable when any of its targets answers in time
    async fn probe_class(&self, class: ProbeClass, mut targets: Vec<String>) -> bool {
        if targets.is_empty() {
            return false;
        }
        targets.shuffle(&mut rand::thread_rng());

        let limit = self.config.probe_timeout();
        let checks: Vec<BoxFuture<'_, Result<(), String>>> = targets
            .into_iter()
            .map(|target| {
                let probe = Arc::clone(&self.probe);
                async move { check_one(probe, class, target, limit).await }.boxed()
            })
            .collect();

        select_ok(checks).await.is_ok()
    }

    /// Run cycles forever on the cadence of the current tier
    pub fn spawn(mut self, inputs: mpsc::Sender<Input>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Connectivity monitor started");
            loop {
                if let Some(signal) = self.run_cycle().await {
                    if inputs.send(Input::Health(signal)).await.is_err() {
                        debug!("Dispatch loop gone, stopping connectivity monitor");
                        break;
                    }
                }
                sleep(self.monitor.next_delay()).await;
            }
        })
    }
}

async fn check_one(
    probe: Arc<dyn ConnectivityProbe>,
    class: ProbeClass,
    target: String,
    limit: Duration,
) -> Result<(), String> {
    match timeout(limit, probe.check(class, &target)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("{:?} probe {} failed: {}", class, target, e);
            Err(e.to_string())
        }
        Err(_) => {
            debug!("{:?} probe {} timed out", class, target);
            Err(format!("{} timed out", target))
        }
    }
}
