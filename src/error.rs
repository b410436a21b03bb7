use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no user config directory available on this platform")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("`{program}` was not found on PATH")]
    NotFound { program: String },

    #[error("failed to start `{program}`: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    pub(crate) fn from_io(program: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            LaunchError::NotFound {
                program: program.to_string(),
            }
        } else {
            LaunchError::Exec {
                program: program.to_string(),
                source,
            }
        }
    }

    /// Things worth checking before trying again.
    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            LaunchError::NotFound { .. } => &[
                "install an OpenSSH client and make sure `ssh` is on PATH",
                "verify the device is reachable (press `r` to refresh)",
                "verify the SSH daemon is running on the remote host",
                "check your key configuration in ~/.ssh",
                "retry with `ssh -v` for verbose diagnostics",
            ],
            LaunchError::Exec { .. } => &[
                "verify the device is reachable (press `r` to refresh)",
                "verify the SSH daemon is running on the remote host",
                "check your key configuration in ~/.ssh",
                "retry with `ssh -v` for verbose diagnostics",
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device name `{0}` is registered more than once")]
    DuplicateName(String),
}
