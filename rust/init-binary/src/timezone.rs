//! Import of the system timezone database into the engine.

use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use mysql_init_config::SYSTEM_SCHEMA;
use snafu::{ensure, ResultExt, Snafu};
use tokio::process::Command;
use tracing::info;

use crate::{
    client::{self, AdminClient},
    init_controller::EngineOptions,
};

/// One zoneinfo entry makes the conversion utility emit an advisory that
/// the target table schema rejects; it is patched to a plain abbreviation
/// before the import.
const ZIC_ADVISORY: &str = "Local time zone must be set--see zic manual page";
const ZIC_ADVISORY_REPLACEMENT: &str = "FCTY";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to run the timezone conversion utility {binary:?}"))]
    RunConversion {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("timezone conversion utility exited with {status}"))]
    ConversionFailed { status: ExitStatus },

    #[snafu(display("failed to load the converted timezone tables"))]
    LoadTables { source: client::Error },
}

/// Converts the system timezone database and loads it into the system
/// schema. Runs before any account is touched, so the bootstrap credential
/// is used.
pub async fn load_timezone_tables(
    engine: &EngineOptions,
    admin_client: &AdminClient,
) -> Result<()> {
    info!(zoneinfo = %engine.zoneinfo_dir.display(), "loading timezone tables");
    let output = Command::new(&engine.tzinfo_binary)
        .arg(&engine.zoneinfo_dir)
        .stdin(Stdio::null())
        // Keep the utility's skip warnings visible on the error stream.
        .stderr(Stdio::inherit())
        .output()
        .await
        .context(RunConversionSnafu {
            binary: &engine.tzinfo_binary,
        })?;
    ensure!(
        output.status.success(),
        ConversionFailedSnafu {
            status: output.status,
        }
    );

    let statements = patch_zic_advisory(&String::from_utf8_lossy(&output.stdout));
    admin_client
        .execute_in_database(statements.as_bytes(), None, SYSTEM_SCHEMA)
        .await
        .context(LoadTablesSnafu)
}

fn patch_zic_advisory(statements: &str) -> String {
    statements.replace(ZIC_ADVISORY, ZIC_ADVISORY_REPLACEMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_zic_advisory() {
        let raw = "INSERT INTO time_zone_name (Name, Time_zone_id) VALUES\n\
            ('Factory', @time_zone_id);\n\
            -- Local time zone must be set--see zic manual page\n";
        let patched = patch_zic_advisory(raw);
        assert!(!patched.contains("zic manual page"));
        assert!(patched.contains("FCTY"));
    }

    #[test]
    fn test_patch_leaves_regular_statements_alone() {
        let raw = "INSERT INTO time_zone VALUES (1, 'N');\n";
        assert_eq!(patch_zic_advisory(raw), raw);
    }
}
