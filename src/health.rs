//! Batch health checks over the registry.
//!
//! Every probe runs as its own task and owns nothing but its address. The
//! outcome is handed back and applied through [`Device::record`], so each
//! device has exactly one writer at any time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::probe::{ProbeOutcome, Prober};
use crate::registry::Device;

/// A spawned probe. Dropping it aborts the task, so cancelling whoever owns
/// it also cancels the probe and kills its child process.
struct ProbeTask {
    address: String,
    handle: JoinHandle<ProbeOutcome>,
}

impl ProbeTask {
    fn spawn<P: Prober>(prober: &Arc<P>, address: String) -> Self {
        let prober = Arc::clone(prober);
        let target = address.clone();
        let handle = tokio::spawn(async move { prober.probe(&target).await });
        Self { address, handle }
    }

    /// A probe task that panicked or was cancelled counts as unreachable.
    async fn settle(mut self) -> ProbeOutcome {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(address = %self.address, error = %e, "probe task failed, marking offline");
                ProbeOutcome::Unreachable
            }
        }
    }
}

impl Drop for ProbeTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Probe devices one after another in registry order, calling `progress`
/// once each device has been updated.
pub async fn check_sequential<P, F>(devices: &mut [Device], prober: &Arc<P>, mut progress: F)
where
    P: Prober,
    F: FnMut(usize, &Device),
{
    for (index, device) in devices.iter_mut().enumerate() {
        let outcome = ProbeTask::spawn(prober, device.address.clone()).settle().await;
        device.record(outcome);
        progress(index, device);
    }
}

/// Probe every address at once; outcomes come back in input order.
pub async fn probe_all<P: Prober>(targets: Vec<String>, prober: &Arc<P>) -> Vec<ProbeOutcome> {
    let tasks: Vec<_> = targets
        .into_iter()
        .map(|address| ProbeTask::spawn(prober, address))
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        outcomes.push(task.settle().await);
    }
    outcomes
}

/// Probe all devices concurrently and wait for every probe to settle.
pub async fn check_concurrent<P: Prober>(devices: &mut [Device], prober: &Arc<P>) {
    let targets = devices.iter().map(|d| d.address.clone()).collect();
    let outcomes = probe_all(targets, prober).await;
    apply(devices, outcomes);
}

pub fn apply(devices: &mut [Device], outcomes: Vec<ProbeOutcome>) {
    for (device, outcome) in devices.iter_mut().zip(outcomes) {
        device.record(outcome);
    }
}

/// A silent concurrent refresh running alongside the menu.
#[derive(Debug)]
pub struct BackgroundRefresh {
    handle: JoinHandle<Vec<ProbeOutcome>>,
    started_at: DateTime<Utc>,
    expected: usize,
}

impl BackgroundRefresh {
    pub fn spawn<P: Prober>(targets: Vec<String>, prober: Arc<P>) -> Self {
        let expected = targets.len();
        debug!(devices = expected, "starting background refresh");
        let handle = tokio::spawn(async move { probe_all(targets, &prober).await });

        Self {
            handle,
            started_at: Utc::now(),
            expected,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the outcomes. If the refresh task itself failed every device
    /// is reported unreachable.
    pub async fn finish(self) -> Vec<ProbeOutcome> {
        match self.handle.await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(error = %e, "background refresh failed, marking all devices offline");
                vec![ProbeOutcome::Unreachable; self.expected]
            }
        }
    }

    /// Cancel the refresh. Its probe tasks are aborted with it, which kills
    /// their child processes.
    pub fn abort(self) -> DateTime<Utc> {
        self.handle.abort();
        self.started_at
    }
}
