//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::error::LaunchError;
use crate::launcher::{Launcher, SshCommand};
use crate::probe::{ProbeOutcome, Prober};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Online(f64),
    Offline,
    Panic,
}

/// Answers probes from a table keyed by address. Unknown addresses are
/// unreachable.
#[derive(Debug, Default)]
pub struct FakeProber {
    behavior: HashMap<String, Behavior>,
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online(mut self, address: &str, latency_ms: f64) -> Self {
        self.behavior
            .insert(address.to_string(), Behavior::Online(latency_ms));
        self
    }

    pub fn offline(mut self, address: &str) -> Self {
        self.behavior.insert(address.to_string(), Behavior::Offline);
        self
    }

    pub fn panics(mut self, address: &str) -> Self {
        self.behavior.insert(address.to_string(), Behavior::Panic);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Probes that got past their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Prober for FakeProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        match self.behavior.get(address) {
            Some(Behavior::Online(latency_ms)) => ProbeOutcome::Reachable {
                latency_ms: *latency_ms,
            },
            Some(Behavior::Panic) => panic!("probe of {address} blew up"),
            Some(Behavior::Offline) | None => ProbeOutcome::Unreachable,
        }
    }
}

/// Records every launch instead of replacing the process.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<SshCommand>>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch fails as if `ssh` were missing.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<SshCommand> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, command: &SshCommand) -> Result<i32, LaunchError> {
        self.launched.lock().unwrap().push(command.clone());
        if self.fail {
            Err(LaunchError::NotFound {
                program: command.program.clone(),
            })
        } else {
            Ok(0)
        }
    }
}
