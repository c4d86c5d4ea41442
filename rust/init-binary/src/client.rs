//! Thin wrapper around the engine's interactive client binary.
//!
//! Statement batches are streamed over stdin. The password travels to the
//! child through the `MYSQL_PWD` environment variable so it never shows up
//! in an argument list.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use flate2::read::GzDecoder;
use mysql_init_config::AdminCredentials;
use snafu::{ensure, ResultExt, Snafu};
use tokio::{io::AsyncWriteExt, process::Command};

use crate::init_controller::EngineOptions;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to spawn the administrative client"))]
    SpawnClient { source: std::io::Error },

    #[snafu(display("failed to stream statements to the administrative client"))]
    StreamStatements { source: std::io::Error },

    #[snafu(display("failed to await the administrative client"))]
    AwaitClient { source: std::io::Error },

    #[snafu(display("administrative client exited with {status}"))]
    ClientFailed { status: ExitStatus },

    #[snafu(display("failed to read seed file {path:?}"))]
    ReadSeedFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to decompress seed archive {path:?}"))]
    DecompressSeedArchive {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub struct AdminClient {
    binary: PathBuf,
    socket: PathBuf,
}

impl AdminClient {
    pub fn new(engine: &EngineOptions) -> Self {
        Self {
            binary: engine.client_binary.clone(),
            socket: engine.socket.clone(),
        }
    }

    fn command(&self, credentials: Option<&AdminCredentials>, database: Option<&str>) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--protocol=socket")
            .arg("-hlocalhost")
            .arg(format!("--socket={}", self.socket.display()))
            .arg("--comments");

        // Without a provisioned credential the client authenticates as the
        // unauthenticated bootstrap root left by the insecure
        // initialization.
        match credentials {
            Some(credentials) => {
                command.arg(format!("-u{}", credentials.user));
                command.env("MYSQL_PWD", &credentials.password);
            }
            None => {
                command.arg("-uroot");
                command.env("MYSQL_PWD", "");
            }
        }
        if let Some(database) = database {
            command.arg(format!("--database={database}"));
        }

        command
    }

    /// Submits a trivial query, reporting only whether the server answered.
    /// Used by the readiness poll, all diagnostics are suppressed.
    pub async fn ping(&self, credentials: Option<&AdminCredentials>) -> bool {
        let mut command = self.command(credentials, None);
        command
            .arg("--execute=SELECT 1;")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        matches!(command.status().await, Ok(status) if status.success())
    }

    /// Executes a batch of statements.
    pub async fn execute(
        &self,
        statements: &str,
        credentials: Option<&AdminCredentials>,
    ) -> Result<()> {
        self.stream(statements.as_bytes(), credentials, None).await
    }

    /// Executes a batch of statements against a specific database.
    pub async fn execute_in_database(
        &self,
        statements: &[u8],
        credentials: Option<&AdminCredentials>,
        database: &str,
    ) -> Result<()> {
        self.stream(statements, credentials, Some(database)).await
    }

    /// Pipes a plain SQL file into the client.
    pub async fn execute_file(
        &self,
        path: &Path,
        credentials: Option<&AdminCredentials>,
    ) -> Result<()> {
        let statements = tokio::fs::read(path)
            .await
            .context(ReadSeedFileSnafu { path })?;
        self.stream(&statements, credentials, None).await
    }

    /// Decompresses a gzipped SQL file and pipes it into the client.
    pub async fn execute_compressed_file(
        &self,
        path: &Path,
        credentials: Option<&AdminCredentials>,
    ) -> Result<()> {
        let compressed = tokio::fs::read(path)
            .await
            .context(ReadSeedFileSnafu { path })?;

        let mut statements = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut statements)
            .context(DecompressSeedArchiveSnafu { path })?;

        self.stream(&statements, credentials, None).await
    }

    async fn stream(
        &self,
        input: &[u8],
        credentials: Option<&AdminCredentials>,
        database: Option<&str>,
    ) -> Result<()> {
        let mut command = self.command(credentials, database);
        command.stdin(Stdio::piped());

        let mut child = command.spawn().context(SpawnClientSnafu)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await.context(StreamStatementsSnafu)?;
            stdin.shutdown().await.context(StreamStatementsSnafu)?;
        }

        let status = child.wait().await.context(AwaitClientSnafu)?;
        ensure!(status.success(), ClientFailedSnafu { status });

        Ok(())
    }
}
