//! Lifecycle of the temporary, unnetworked server instance.
//!
//! The server binary is an external collaborator. This module only relies
//! on its documented command line contracts: the verbose help mode that
//! reports the configured data directory, the insecure initialization mode
//! and the socket-only startup mode.

use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::init_controller::EngineOptions;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to run {binary:?} to query its configuration"))]
    RunConfigProbe {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("{binary:?} exited with {status} while reporting its configuration"))]
    ConfigProbeFailed { binary: PathBuf, status: ExitStatus },

    #[snafu(display("no data directory in the configuration report of {binary:?}"))]
    DataDirNotReported { binary: PathBuf },

    #[snafu(display("failed to run the storage initialization"))]
    RunStorageInitialization { source: std::io::Error },

    #[snafu(display("storage initialization exited with {status}"))]
    StorageInitializationFailed { status: ExitStatus },

    #[snafu(display("failed to spawn the temporary server process"))]
    SpawnServer { source: std::io::Error },

    #[snafu(display("temporary server process has no pid"))]
    MissingPid,

    #[snafu(display("failed to signal the temporary server"))]
    SignalServer { source: nix::Error },

    #[snafu(display("failed to await the temporary server"))]
    AwaitServer { source: std::io::Error },

    #[snafu(display("temporary server exited with {status}"))]
    UncleanShutdown { status: ExitStatus },
}

/// Asks the server binary for the data directory it was built/configured
/// to use. The path is never hardcoded here, images relocate it freely.
pub async fn probe_data_dir(engine: &EngineOptions) -> Result<PathBuf> {
    let output = Command::new(&engine.server_binary)
        .args(["--verbose", "--help"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .context(RunConfigProbeSnafu {
            binary: &engine.server_binary,
        })?;
    ensure!(
        output.status.success(),
        ConfigProbeFailedSnafu {
            binary: &engine.server_binary,
            status: output.status,
        }
    );

    parse_data_dir(&String::from_utf8_lossy(&output.stdout)).context(DataDirNotReportedSnafu {
        binary: &engine.server_binary,
    })
}

/// The verbose help output ends in a two-column table of effective
/// variables; `datadir` is one of them.
fn parse_data_dir(help_output: &str) -> Option<PathBuf> {
    help_output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("datadir"), Some(path)) => Some(PathBuf::from(path)),
            _ => None,
        }
    })
}

/// Lays down the system tables without any authentication set up. Only ever
/// called for the first-run bootstrap window, before accounts exist.
pub async fn initialize_storage(engine: &EngineOptions, datadir: &Path) -> Result<()> {
    let status = Command::new(&engine.server_binary)
        .arg("--initialize-insecure")
        .arg(format!("--datadir={}", datadir.display()))
        .status()
        .await
        .context(RunStorageInitializationSnafu)?;
    ensure!(
        status.success(),
        StorageInitializationFailedSnafu { status }
    );

    Ok(())
}

/// A server process bound to a local socket only, without TCP networking.
pub struct TemporaryServer {
    child: Child,
}

impl TemporaryServer {
    pub fn spawn(engine: &EngineOptions, datadir: &Path) -> Result<Self> {
        debug!(socket = %engine.socket.display(), "starting the temporary server");
        let child = Command::new(&engine.server_binary)
            .arg("--skip-networking")
            .arg(format!("--datadir={}", datadir.display()))
            .arg(format!("--socket={}", engine.socket.display()))
            // An aborted run must not leave the instance behind.
            .kill_on_drop(true)
            .spawn()
            .context(SpawnServerSnafu)?;

        Ok(Self { child })
    }

    /// Graceful termination: SIGTERM, then wait for the exit status.
    pub async fn stop(mut self) -> Result<()> {
        let pid = self.child.id().context(MissingPidSnafu)?;
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context(SignalServerSnafu)?;

        let status = self.child.wait().await.context(AwaitServerSnafu)?;
        ensure!(status.success(), UncleanShutdownSnafu { status });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_dir() {
        let help_output = "\
mysqld  Ver 8.0.39 for Linux on x86_64 (MySQL Community Server - GPL)
...

Variables (--variable-name=value)
and boolean options {FALSE|TRUE}                  Value (after reading options)
--------------------------------------------------- ------------------------
activate-all-roles-on-login                       FALSE
datadir                                           /var/lib/mysql/
daemonize                                         FALSE
";
        assert_eq!(
            parse_data_dir(help_output),
            Some(PathBuf::from("/var/lib/mysql/"))
        );
    }

    #[test]
    fn test_parse_data_dir_ignores_similar_variables() {
        let help_output = "\
character-sets-dir                                /usr/share/mysql-8.0/charsets/
innodb-data-home-dir                              (No default value)
";
        assert_eq!(parse_data_dir(help_output), None);
    }

    #[test]
    fn test_parse_data_dir_needs_a_value() {
        assert_eq!(parse_data_dir("datadir\n"), None);
    }
}
