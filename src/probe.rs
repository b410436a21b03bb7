use std::{
    future::Future,
    process::Stdio,
    sync::OnceLock,
    time::{Duration, Instant},
};

use regex::Regex;
use tokio::{io::AsyncReadExt, process::Command, time::timeout};
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Reachable { latency_ms: f64 },
    Unreachable,
}

/// A single reachability check. Implementations never fail: every error
/// path resolves to [`ProbeOutcome::Unreachable`].
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, address: &str) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Runs one ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
    args: Vec<String>,
    ceiling: Duration,
}

impl PingProber {
    pub fn new(ceiling: Duration) -> Self {
        Self::with_command("ping", ping_args(ceiling), ceiling)
    }

    /// `program args... <address>` is run for every probe.
    pub fn with_command(program: impl Into<String>, args: Vec<String>, ceiling: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            ceiling,
        }
    }
}

impl Prober for PingProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let started = Instant::now();

        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(address, error = %e, "failed to spawn {}", self.program);
                return ProbeOutcome::Unreachable;
            }
        };

        let mut stdout = child.stdout.take();
        let finished = timeout(self.ceiling, async {
            let mut output = Vec::new();
            if let Some(pipe) = stdout.as_mut() {
                pipe.read_to_end(&mut output).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, output))
        })
        .await;
        let elapsed = started.elapsed();

        match finished {
            Ok(Ok((status, output))) if status.success() => {
                let output = String::from_utf8_lossy(&output);
                let latency_ms =
                    parse_rtt_ms(&output).unwrap_or_else(|| elapsed.as_secs_f64() * 1000.0);
                debug!(address, latency_ms, "reachable");
                ProbeOutcome::Reachable { latency_ms }
            }
            Ok(Ok((status, _))) => {
                debug!(address, %status, "unreachable");
                ProbeOutcome::Unreachable
            }
            Ok(Err(e)) => {
                debug!(address, error = %e, "probe i/o failed");
                ProbeOutcome::Unreachable
            }
            Err(_) => {
                // The child may have exited between the deadline and the kill.
                if let Err(e) = child.start_kill() {
                    debug!(address, error = %e, "probe already gone");
                }
                debug!(address, ceiling = ?self.ceiling, "probe timed out");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn ping_args(ceiling: Duration) -> Vec<String> {
    let wait = ceiling.as_secs().max(1).to_string();
    vec!["-c".into(), "1".into(), "-W".into(), wait]
}

#[cfg(target_os = "macos")]
fn ping_args(ceiling: Duration) -> Vec<String> {
    let wait = ceiling.as_secs().max(1).to_string();
    vec!["-c".into(), "1".into(), "-t".into(), wait]
}

#[cfg(windows)]
fn ping_args(ceiling: Duration) -> Vec<String> {
    let wait = ceiling.as_millis().to_string();
    vec!["-n".into(), "1".into(), "-w".into(), wait]
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn ping_args(_ceiling: Duration) -> Vec<String> {
    vec!["-c".into(), "1".into()]
}

/// Round-trip time as reported by ping itself (`time=12.3 ms`, `time<1ms`).
pub fn parse_rtt_ms(output: &str) -> Option<f64> {
    static RTT: OnceLock<Regex> = OnceLock::new();
    let re = RTT.get_or_init(|| {
        Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("static regex is valid")
    });
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtt() {
        let linux = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=12.3 ms";
        assert_eq!(parse_rtt_ms(linux), Some(12.3));

        let windows = "Reply from 10.0.0.1: bytes=32 time<1ms TTL=128";
        assert_eq!(parse_rtt_ms(windows), Some(1.0));

        assert_eq!(parse_rtt_ms("Request timed out."), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_default_args_use_whole_seconds() {
        let args = ping_args(Duration::from_millis(800));
        assert_eq!(args, ["-c", "1", "-W", "1"]);
    }

    #[cfg(unix)]
    fn shell(script: &str, ceiling: Duration) -> PingProber {
        PingProber::with_command(
            "sh",
            vec!["-c".into(), script.into(), "probe".into()],
            ceiling,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_uses_reported_rtt() {
        let prober = shell(
            "echo '64 bytes from x: icmp_seq=1 ttl=64 time=12.3 ms'",
            Duration::from_secs(5),
        );
        let outcome = prober.probe("127.0.0.1").await;
        assert_eq!(outcome, ProbeOutcome::Reachable { latency_ms: 12.3 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_rtt_falls_back_to_elapsed() {
        let prober = shell("true", Duration::from_secs(5));
        match prober.probe("127.0.0.1").await {
            ProbeOutcome::Reachable { latency_ms } => assert!(latency_ms >= 0.0),
            other => panic!("expected reachable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_unreachable() {
        let prober = shell("exit 1", Duration::from_secs(5));
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Unreachable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_resolves_unreachable() {
        let prober = shell("sleep 5", Duration::from_millis(200));
        let started = Instant::now();
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Unreachable);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unreachable() {
        let prober = PingProber::with_command(
            "definitely-not-a-ping-binary",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Unreachable);
    }
}
