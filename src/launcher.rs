use std::{collections::BTreeMap, fmt, process::Command};

use tracing::info;

use crate::error::LaunchError;
use crate::registry::{Device, DEFAULT_SSH_PORT};
use crate::settings::SshOption;

const SSH_PROGRAM: &str = "ssh";

/// A fully built `ssh` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SshCommand {
    pub fn build(device: &Device, username: &str, options: &BTreeMap<String, SshOption>) -> Self {
        let mut args = Vec::with_capacity(options.len() * 2 + 3);
        for (name, option) in options {
            args.push("-o".to_string());
            args.push(format!("{}={}", name, option.value()));
        }
        if device.port != DEFAULT_SSH_PORT {
            args.push("-p".to_string());
            args.push(device.port.to_string());
        }
        args.push(format!("{}@{}", username, device.address));

        Self {
            program: SSH_PROGRAM.to_string(),
            args,
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for SshCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Hands the terminal over to an ssh session.
pub trait Launcher {
    /// Returns only when the session could not be started, or, where the
    /// process image cannot be replaced, with the session's exit code.
    fn launch(&self, command: &SshCommand) -> Result<i32, LaunchError>;
}

/// Replaces the current process with `ssh` where the platform allows it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    #[cfg(unix)]
    fn launch(&self, command: &SshCommand) -> Result<i32, LaunchError> {
        use std::os::unix::process::CommandExt;

        info!(%command, "handing off to ssh");
        // exec only comes back on failure
        let err = command.to_command().exec();
        Err(LaunchError::from_io(&command.program, err))
    }

    #[cfg(not(unix))]
    fn launch(&self, command: &SshCommand) -> Result<i32, LaunchError> {
        info!(%command, "starting supervised ssh session");
        let status = command
            .to_command()
            .status()
            .map_err(|e| LaunchError::from_io(&command.program, e))?;
        Ok(status.code().unwrap_or(1))
    }
}
