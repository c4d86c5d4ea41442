//! Drives the one-time initialization of a fresh data directory.
//!
//! The run is a strict sequence of phases. Every phase failure is fatal and
//! immediate; the only retry loop is the fixed readiness poll against the
//! temporary server. Partial state is never rolled back; the marker file
//! left inside the data directory is the signal for operators to inspect
//! and remediate by hand.

use std::path::{Path, PathBuf};

use mysql_init_config::{
    AdminCredentials, InitConfig, DEFAULT_CLIENT_BINARY, DEFAULT_SEED_SCRIPT_DIR,
    DEFAULT_SERVER_BINARY, DEFAULT_SOCKET_PATH, DEFAULT_TZINFO_BINARY, DEFAULT_ZONEINFO_DIR,
    INCOMPLETE_MARKER_FILE, READINESS_ATTEMPTS, READINESS_INTERVAL, SYSTEM_SCHEMA,
};
use snafu::{ensure, ResultExt, Snafu};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    client::{self, AdminClient},
    command, password, seed,
    server::{self, TemporaryServer},
    timezone,
};

/// External collaborator locations. The defaults match a stock server
/// image; tests and non-standard layouts can redirect each one.
#[derive(clap::Args, Clone, Debug)]
pub struct EngineOptions {
    /// Server binary used for initialization and the temporary instance.
    #[clap(long, default_value = DEFAULT_SERVER_BINARY)]
    pub server_binary: PathBuf,

    /// Interactive client binary used for all administrative commands.
    #[clap(long, default_value = DEFAULT_CLIENT_BINARY)]
    pub client_binary: PathBuf,

    /// Timezone conversion utility.
    #[clap(long, default_value = DEFAULT_TZINFO_BINARY)]
    pub tzinfo_binary: PathBuf,

    /// Unix socket the temporary, unnetworked instance listens on.
    #[clap(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Directory holding operator-supplied seed scripts.
    #[clap(long, default_value = DEFAULT_SEED_SCRIPT_DIR)]
    pub seed_script_dir: PathBuf,

    /// System timezone database fed to the conversion utility.
    #[clap(long, default_value = DEFAULT_ZONEINFO_DIR)]
    pub zoneinfo_dir: PathBuf,
}

pub struct Ctx {
    pub config: InitConfig,
    pub engine: EngineOptions,
}

/// Mutable per-run state, threaded through the phases explicitly.
#[derive(Default)]
struct SessionState {
    /// First administrative account created during this run.
    credentials: Option<AdminCredentials>,
    /// Whether any login account was provisioned at all.
    account_created: bool,
    /// Whether administrative passwords have to be expired before handing
    /// over. Set from the environment, or forced by the fallback account.
    expire_passwords: bool,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to determine the configured data directory"))]
    ProbeDataDir { source: server::Error },

    #[snafu(display("failed to create data directory {path:?}"))]
    CreateDataDir {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write marker file {path:?}"))]
    WriteMarker {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to lay down system tables in {path:?}"))]
    InitializeStorage {
        source: server::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to start the temporary server"))]
    StartServer { source: server::Error },

    #[snafu(display("temporary server did not become ready within {attempts} attempts"))]
    ServerNeverReady { attempts: u32 },

    #[snafu(display("failed to load the timezone tables"))]
    LoadTimezones { source: timezone::Error },

    #[snafu(display("failed to purge the default accounts"))]
    PurgeDefaultAccounts { source: client::Error },

    #[snafu(display("failed to provision the root account"))]
    ProvisionRoot { source: client::Error },

    #[snafu(display("failed to provision the admin account {user:?}"))]
    ProvisionAdmin {
        source: client::Error,
        user: String,
    },

    #[snafu(display("failed to create database {database:?}"))]
    ProvisionDatabase {
        source: client::Error,
        database: String,
    },

    #[snafu(display("failed to provision the user account {user:?}"))]
    ProvisionUser {
        source: client::Error,
        user: String,
    },

    #[snafu(display("failed to create the fallback root account"))]
    ProvisionFallbackRoot { source: client::Error },

    #[snafu(display("seed script execution failed"))]
    RunSeedScripts { source: seed::Error },

    #[snafu(display("failed to expire the password of {user:?}"))]
    ExpirePassword {
        source: client::Error,
        user: String,
    },

    #[snafu(display("failed to stop the temporary server"))]
    StopServer { source: server::Error },

    #[snafu(display("failed to remove marker file {path:?}"))]
    ClearMarker {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display(
        "marker file {path:?} is present, a previous initialization attempt was interrupted; \
         inspect the data directory and remove the marker before retrying"
    ))]
    IncompleteInitialization { path: PathBuf },
}

pub async fn run_initialization(ctx: &Ctx) -> Result<()> {
    let datadir = server::probe_data_dir(&ctx.engine)
        .await
        .context(ProbeDataDirSnafu)?;
    let marker = datadir.join(INCOMPLETE_MARKER_FILE);

    if datadir.join(SYSTEM_SCHEMA).is_dir() {
        info!(
            datadir = %datadir.display(),
            "data directory already contains a {SYSTEM_SCHEMA} schema, nothing to do"
        );
    } else {
        provision(ctx, &datadir, &marker).await?;
    }

    // Re-entry guard, on every run. A marker that survived until here means
    // an earlier attempt crashed between writing it and clearing it.
    ensure_completed(&marker)
}

fn ensure_completed(marker: &Path) -> Result<()> {
    ensure!(
        !marker.exists(),
        IncompleteInitializationSnafu { path: marker }
    );
    Ok(())
}

async fn provision(ctx: &Ctx, datadir: &Path, marker: &Path) -> Result<()> {
    info!(datadir = %datadir.display(), "initializing fresh data directory");
    tokio::fs::create_dir_all(datadir)
        .await
        .context(CreateDataDirSnafu { path: datadir })?;
    tokio::fs::write(marker, b"")
        .await
        .context(WriteMarkerSnafu { path: marker })?;

    server::initialize_storage(&ctx.engine, datadir)
        .await
        .context(InitializeStorageSnafu { path: datadir })?;

    let server = TemporaryServer::spawn(&ctx.engine, datadir).context(StartServerSnafu)?;
    let admin_client = AdminClient::new(&ctx.engine);
    wait_until_ready(&admin_client).await?;

    let mut state = SessionState {
        expire_passwords: ctx.config.onetime_password,
        ..SessionState::default()
    };

    if ctx.config.skip_tzinfo {
        info!("timezone import disabled, skipping");
    } else {
        timezone::load_timezone_tables(&ctx.engine, &admin_client)
            .await
            .context(LoadTimezonesSnafu)?;
    }

    // The insecure initialization leaves an unauthenticated root-equivalent
    // account behind; none of the defaults may survive. No flush here: the
    // cached grants keep the bootstrap connection usable until an
    // administrative account exists.
    info!("purging default accounts");
    admin_client
        .execute(&command::purge_default_accounts(), None)
        .await
        .context(PurgeDefaultAccountsSnafu)?;

    setup_root_account(&ctx.config, &admin_client, &mut state).await?;
    setup_admin_account(&ctx.config, &admin_client, &mut state).await?;
    setup_database(&ctx.config, &admin_client, &state).await?;
    setup_standard_account(&ctx.config, &admin_client, &mut state).await?;
    setup_fallback_account(&admin_client, &mut state).await?;

    seed::run_seed_scripts(
        &ctx.engine.seed_script_dir,
        &admin_client,
        state.credentials.as_ref(),
    )
    .await
    .context(RunSeedScriptsSnafu)?;

    expire_passwords(&ctx.config, &admin_client, &state).await?;

    info!("stopping the temporary server");
    server.stop().await.context(StopServerSnafu)?;

    tokio::fs::remove_file(marker)
        .await
        .context(ClearMarkerSnafu { path: marker })?;
    info!("initialization complete, ready for start up");

    Ok(())
}

async fn wait_until_ready(admin_client: &AdminClient) -> Result<()> {
    for attempt in 1..=READINESS_ATTEMPTS {
        if admin_client.ping(None).await {
            info!("temporary server is ready");
            return Ok(());
        }
        info!(attempt, "waiting for the temporary server");
        sleep(READINESS_INTERVAL).await;
    }

    ServerNeverReadySnafu {
        attempts: READINESS_ATTEMPTS,
    }
    .fail()
}

async fn setup_root_account(
    config: &InitConfig,
    admin_client: &AdminClient,
    state: &mut SessionState,
) -> Result<()> {
    if !config.root_account_requested() {
        return Ok(());
    }

    let password = if config.random_root_password {
        let password = password::generate();
        // Displayed exactly once, never logged or stored.
        println!("GENERATED ROOT PASSWORD: {password}");
        password
    } else {
        config.root_password.clone().unwrap_or_default()
    };

    info!("provisioning the root account");
    admin_client
        .execute(&command::create_root_account(&password), None)
        .await
        .context(ProvisionRootSnafu)?;

    state.account_created = true;
    state.credentials.get_or_insert(AdminCredentials {
        user: "root".to_string(),
        host: "%".to_string(),
        password,
    });

    Ok(())
}

async fn setup_admin_account(
    config: &InitConfig,
    admin_client: &AdminClient,
    state: &mut SessionState,
) -> Result<()> {
    let Some(user) = &config.admin_user else {
        return Ok(());
    };

    let password = if config.random_admin_password {
        let password = password::generate();
        println!("GENERATED ADMIN PASSWORD: {password}");
        password
    } else {
        config.admin_password.clone().unwrap_or_default()
    };

    info!(%user, "provisioning the admin account");
    admin_client
        .execute(
            &command::create_admin_account(user, &password),
            state.credentials.as_ref(),
        )
        .await
        .context(ProvisionAdminSnafu { user })?;

    state.account_created = true;
    state.credentials.get_or_insert(AdminCredentials {
        user: user.clone(),
        host: "%".to_string(),
        password,
    });

    Ok(())
}

async fn setup_database(
    config: &InitConfig,
    admin_client: &AdminClient,
    state: &SessionState,
) -> Result<()> {
    let Some(database) = &config.database else {
        return Ok(());
    };

    info!(%database, "creating database");
    admin_client
        .execute(
            &command::create_database(database),
            state.credentials.as_ref(),
        )
        .await
        .context(ProvisionDatabaseSnafu { database })
}

async fn setup_standard_account(
    config: &InitConfig,
    admin_client: &AdminClient,
    state: &mut SessionState,
) -> Result<()> {
    let (user, password) = match (&config.user, &config.password) {
        (Some(user), Some(password)) => (user, password),
        (Some(user), None) => {
            warn!(%user, "MYSQL_USER is set without MYSQL_PASSWORD, not creating the account");
            return Ok(());
        }
        (None, Some(_)) => {
            warn!("MYSQL_PASSWORD is set without MYSQL_USER, ignoring it");
            return Ok(());
        }
        (None, None) => return Ok(()),
    };

    info!(%user, database = ?config.database, "provisioning the user account");
    admin_client
        .execute(
            &command::create_standard_account(user, password, config.database.as_deref()),
            state.credentials.as_ref(),
        )
        .await
        .context(ProvisionUserSnafu { user })?;

    state.account_created = true;
    Ok(())
}

async fn setup_fallback_account(
    admin_client: &AdminClient,
    state: &mut SessionState,
) -> Result<()> {
    if state.account_created {
        return Ok(());
    }

    warn!(
        "no account was provisioned; creating an insecure root@localhost account with a \
         mandatory password change on first login"
    );
    admin_client
        .execute(&command::create_fallback_root_account(), None)
        .await
        .context(ProvisionFallbackRootSnafu)?;

    state.account_created = true;
    state.expire_passwords = true;
    state.credentials.get_or_insert(AdminCredentials {
        user: "root".to_string(),
        host: "localhost".to_string(),
        password: String::new(),
    });

    Ok(())
}

async fn expire_passwords(
    config: &InitConfig,
    admin_client: &AdminClient,
    state: &SessionState,
) -> Result<()> {
    if !state.expire_passwords {
        return Ok(());
    }

    if let Some(user) = &config.admin_user {
        info!(%user, "expiring the admin account password");
        admin_client
            .execute(
                &command::expire_password(user, "%"),
                state.credentials.as_ref(),
            )
            .await
            .context(ExpirePasswordSnafu { user })?;
    }

    // Expiring our own credential has to come last, nothing can
    // authenticate with it afterwards.
    if let Some(credentials) = &state.credentials {
        if config.admin_user.as_ref() != Some(&credentials.user) {
            info!(user = %credentials.user, "expiring the administrative account password");
            admin_client
                .execute(
                    &command::expire_password(&credentials.user, &credentials.host),
                    Some(credentials),
                )
                .await
                .context(ExpirePasswordSnafu {
                    user: &credentials.user,
                })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mysql-init-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn test_leftover_marker_is_fatal() {
        let dir = scratch_dir("marker-present");
        let marker = dir.join(INCOMPLETE_MARKER_FILE);
        std::fs::write(&marker, b"").expect("marker fixture");

        let result = ensure_completed(&marker);
        assert!(matches!(
            result,
            Err(Error::IncompleteInitialization { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cleared_marker_passes_the_final_check() {
        let dir = scratch_dir("marker-absent");
        let marker = dir.join(INCOMPLETE_MARKER_FILE);

        assert!(ensure_completed(&marker).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
