use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Hangup => write!(f, "SIGHUP"),
        }
    }
}

#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let received = tokio::select! {
        _ = sigint.recv() => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sighup.recv() => ShutdownSignal::Hangup,
    };
    Ok(received)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

/// One-shot latch guarding the cleanup sequence. The signal path and the
/// normal exit path both pull it; only the first caller runs cleanup.
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    fired: Arc<AtomicBool>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` for the first caller only.
    pub fn trigger(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_fires_once() {
        let latch = ShutdownLatch::new();
        assert!(latch.trigger());
        assert!(!latch.trigger());

        let clone = latch.clone();
        assert!(!clone.trigger());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
