//! Discovery and execution of operator-supplied seed scripts.
//!
//! Entries run in lexical file name order, each one only after the
//! previous finished successfully.

use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};

use mysql_init_config::{AdminCredentials, SeedScriptKind};
use snafu::{ensure, ResultExt, Snafu};
use tokio::process::Command;
use tracing::{debug, info};

use crate::client::{self, AdminClient};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to read seed script directory {path:?}"))]
    ReadSeedDir {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to run shell seed script {path:?}"))]
    RunShellScript {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("shell seed script {path:?} exited with {status}"))]
    ShellScriptFailed { path: PathBuf, status: ExitStatus },

    #[snafu(display("failed to apply SQL seed script {path:?}"))]
    ApplySqlScript {
        source: client::Error,
        path: PathBuf,
    },
}

pub async fn run_seed_scripts(
    dir: &Path,
    admin_client: &AdminClient,
    credentials: Option<&AdminCredentials>,
) -> Result<()> {
    let Some(paths) = collect_seed_files(dir).await? else {
        debug!(dir = %dir.display(), "no seed script directory");
        return Ok(());
    };

    for path in paths {
        let kind = SeedScriptKind::of(&path);
        match kind {
            SeedScriptKind::Shell => {
                info!(path = %path.display(), %kind, "running seed script");
                let status = Command::new("sh")
                    .arg(&path)
                    .status()
                    .await
                    .context(RunShellScriptSnafu { path: &path })?;
                ensure!(status.success(), ShellScriptFailedSnafu { path, status });
            }
            SeedScriptKind::Sql => {
                info!(path = %path.display(), %kind, "running seed script");
                admin_client
                    .execute_file(&path, credentials)
                    .await
                    .context(ApplySqlScriptSnafu { path })?;
            }
            SeedScriptKind::CompressedSql => {
                info!(path = %path.display(), %kind, "running seed script");
                admin_client
                    .execute_compressed_file(&path, credentials)
                    .await
                    .context(ApplySqlScriptSnafu { path })?;
            }
            SeedScriptKind::Unrecognized => {
                info!(path = %path.display(), "ignoring seed file");
            }
        }
    }

    Ok(())
}

/// All entries of the seed directory in lexical order, or `None` when the
/// directory does not exist (a perfectly normal deployment).
async fn collect_seed_files(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(source).context(ReadSeedDirSnafu { path: dir }),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context(ReadSeedDirSnafu { path: dir })?
    {
        paths.push(entry.path());
    }
    paths.sort();

    Ok(Some(paths))
}
