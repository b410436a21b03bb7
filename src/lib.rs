mod app;
mod device_table;
mod error;
mod health;
mod input;
mod launcher;
pub mod logging;
mod probe;
mod registry;
mod settings;
mod shutdown;
mod terminal;

#[cfg(test)]
mod test_utils;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

pub use app::{App, Exit, State};
pub use error::{LaunchError, RegistryError, SettingsError};
pub use health::{check_concurrent, check_sequential, BackgroundRefresh};
pub use input::InputReader;
pub use launcher::{ExecLauncher, Launcher, SshCommand};
pub use probe::{PingProber, ProbeOutcome, Prober};
pub use registry::{Device, DeviceClass, Reachability, Registry, Selection};
pub use settings::{Settings, SettingsStore, SshOption};
pub use shutdown::{wait_for_signal, ShutdownLatch, ShutdownSignal};
pub use terminal::Terminal;
