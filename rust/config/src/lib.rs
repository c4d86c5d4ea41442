//! Configuration and domain types for the data directory initialization tool.
//!
//! All initialization behavior is driven by environment variables; none of
//! them are required. A variable that is absent or set to an empty string is
//! treated as unset throughout.

use std::{fmt, path::Path, time::Duration};

use strum::Display;

pub mod sql;

pub const ROOT_PASSWORD_ENV: &str = "MYSQL_ROOT_PASSWORD";
pub const RANDOM_ROOT_PASSWORD_ENV: &str = "MYSQL_RANDOM_ROOT_PASSWORD";
pub const ALLOW_EMPTY_PASSWORD_ENV: &str = "MYSQL_ALLOW_EMPTY_PASSWORD";
pub const ADMIN_USER_ENV: &str = "MYSQL_ADMIN_USER";
pub const ADMIN_PASSWORD_ENV: &str = "MYSQL_ADMIN_PASSWORD";
pub const RANDOM_ADMIN_PASSWORD_ENV: &str = "MYSQL_RANDOM_ADMIN_PASSWORD";
pub const USER_ENV: &str = "MYSQL_USER";
pub const PASSWORD_ENV: &str = "MYSQL_PASSWORD";
pub const DATABASE_ENV: &str = "MYSQL_DATABASE";
pub const SKIP_TZINFO_ENV: &str = "MYSQL_INITDB_SKIP_TZINFO";
pub const ONETIME_PASSWORD_ENV: &str = "MYSQL_ONETIME_PASSWORD";

/// Controls the log level filter of the tool itself, not the server.
pub const LOG_FILTER_ENV: &str = "MYSQL_INIT_LOG";

/// Name of the system schema, which doubles as the name of its directory
/// inside the data directory. Its presence is the sole "already initialized"
/// signal.
pub const SYSTEM_SCHEMA: &str = "mysql";

/// Sentinel inside the data directory. Created before the first
/// initialization step, removed after the last one. Present on a later run,
/// it marks a crashed attempt that an operator has to clean up.
pub const INCOMPLETE_MARKER_FILE: &str = ".init_script_is_incomplete";

pub const DEFAULT_SERVER_BINARY: &str = "mysqld";
pub const DEFAULT_CLIENT_BINARY: &str = "mysql";
pub const DEFAULT_TZINFO_BINARY: &str = "mysql_tzinfo_to_sql";
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/mysqld/mysqld.sock";
pub const DEFAULT_SEED_SCRIPT_DIR: &str = "/docker-entrypoint-initdb.d";
pub const DEFAULT_ZONEINFO_DIR: &str = "/usr/share/zoneinfo";

/// Readiness poll budget for the temporary server.
pub const READINESS_ATTEMPTS: u32 = 30;
pub const READINESS_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of all recognized environment variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitConfig {
    pub root_password: Option<String>,
    pub random_root_password: bool,
    pub allow_empty_password: bool,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub random_admin_password: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub skip_tzinfo: bool,
    pub onetime_password: bool,
}

impl InitConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the snapshot from an arbitrary lookup function, so parsing
    /// stays testable without mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let flag = |name: &str| value(name).is_some();

        Self {
            root_password: value(ROOT_PASSWORD_ENV),
            random_root_password: flag(RANDOM_ROOT_PASSWORD_ENV),
            allow_empty_password: flag(ALLOW_EMPTY_PASSWORD_ENV),
            admin_user: value(ADMIN_USER_ENV),
            admin_password: value(ADMIN_PASSWORD_ENV),
            random_admin_password: flag(RANDOM_ADMIN_PASSWORD_ENV),
            user: value(USER_ENV),
            password: value(PASSWORD_ENV),
            database: value(DATABASE_ENV),
            skip_tzinfo: flag(SKIP_TZINFO_ENV),
            onetime_password: flag(ONETIME_PASSWORD_ENV),
        }
    }

    /// Whether a `root` account has to be provisioned.
    pub fn root_account_requested(&self) -> bool {
        self.root_password.is_some() || self.random_root_password || self.allow_empty_password
    }

    /// Whether a secondary unrestricted account has to be provisioned.
    pub fn admin_account_requested(&self) -> bool {
        self.admin_user.is_some()
    }

    /// Whether a database-scoped account has to be provisioned. Requires
    /// both the name and the password to be set.
    pub fn standard_account_requested(&self) -> bool {
        self.user.is_some() && self.password.is_some()
    }
}

/// The first administrative account created during a run. Used to
/// authenticate every administrative command issued afterwards. Lives only
/// for the duration of one run.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub user: String,
    pub host: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The closed set of seed script variants, dispatched on by file name.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum SeedScriptKind {
    Shell,
    Sql,
    CompressedSql,
    Unrecognized,
}

impl SeedScriptKind {
    pub fn of(path: &Path) -> Self {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return Self::Unrecognized;
        };

        // `.sql.gz` has to be checked before `.sql`.
        if name.ends_with(".sh") {
            Self::Shell
        } else if name.ends_with(".sql.gz") {
            Self::CompressedSql
        } else if name.ends_with(".sql") {
            Self::Sql
        } else {
            Self::Unrecognized
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> InitConfig {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        InitConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = config_from(&[
            (ROOT_PASSWORD_ENV, ""),
            (RANDOM_ROOT_PASSWORD_ENV, ""),
            (DATABASE_ENV, ""),
        ]);
        assert_eq!(config, InitConfig::default());
        assert!(!config.root_account_requested());
    }

    #[test]
    fn test_any_nonempty_value_sets_a_flag() {
        for value in ["1", "yes", "false", " "] {
            let config = config_from(&[(RANDOM_ROOT_PASSWORD_ENV, value)]);
            assert!(config.random_root_password, "value {value:?} must count as set");
            assert!(config.root_account_requested());
        }
    }

    #[test]
    fn test_root_account_triggers() {
        assert!(config_from(&[(ROOT_PASSWORD_ENV, "secret")]).root_account_requested());
        assert!(config_from(&[(ALLOW_EMPTY_PASSWORD_ENV, "1")]).root_account_requested());
        assert!(config_from(&[(RANDOM_ROOT_PASSWORD_ENV, "1")]).root_account_requested());
        assert!(!config_from(&[(DATABASE_ENV, "app")]).root_account_requested());
    }

    #[test]
    fn test_standard_account_requires_both_name_and_password() {
        assert!(config_from(&[(USER_ENV, "app"), (PASSWORD_ENV, "secret")])
            .standard_account_requested());
        assert!(!config_from(&[(USER_ENV, "app")]).standard_account_requested());
        assert!(!config_from(&[(PASSWORD_ENV, "secret")]).standard_account_requested());
    }

    #[test]
    fn test_no_account_triggers_at_all() {
        let config = config_from(&[(DATABASE_ENV, "app"), (SKIP_TZINFO_ENV, "1")]);
        assert!(!config.root_account_requested());
        assert!(!config.admin_account_requested());
        assert!(!config.standard_account_requested());
    }

    #[test]
    fn test_seed_script_classification() {
        let kind = |name: &str| SeedScriptKind::of(&PathBuf::from(name));

        assert_eq!(kind("/seed/01_init.sql"), SeedScriptKind::Sql);
        assert_eq!(kind("/seed/02_seed.sh"), SeedScriptKind::Shell);
        assert_eq!(kind("/seed/03_data.sql.gz"), SeedScriptKind::CompressedSql);
        assert_eq!(kind("/seed/readme.txt"), SeedScriptKind::Unrecognized);
        assert_eq!(kind("/seed/dump.gz"), SeedScriptKind::Unrecognized);
    }

    #[test]
    fn test_credentials_debug_never_prints_the_password() {
        let credentials = AdminCredentials {
            user: "root".to_string(),
            host: "%".to_string(),
            password: "super-secret".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("root"));
    }
}
