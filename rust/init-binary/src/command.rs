//! SQL statement batches issued while provisioning accounts and databases.
//!
//! Session binlogging is disabled at the top of every mutating batch so the
//! provisioning never ends up in a replication stream.

use indoc::formatdoc;
use mysql_init_config::sql::{quote_identifier, quote_literal};

/// Removes every account the insecure initialization created. Deliberately
/// no flush: the cached grants keep the current bootstrap connection alive
/// until a replacement account has been provisioned.
pub fn purge_default_accounts() -> String {
    formatdoc! {"
        SET @@SESSION.SQL_LOG_BIN=0;
        DELETE FROM mysql.user;
    "}
}

/// Root reachable from any host, full privileges, grant option. The flush
/// drops the purged defaults from the grant cache; the conventional `test`
/// database is removed in the same pass.
pub fn create_root_account(password: &str) -> String {
    formatdoc! {"
        SET @@SESSION.SQL_LOG_BIN=0;
        CREATE USER 'root'@'%' IDENTIFIED BY {password};
        GRANT ALL ON *.* TO 'root'@'%' WITH GRANT OPTION;
        FLUSH PRIVILEGES;
        DROP DATABASE IF EXISTS test;
    ", password = quote_literal(password)}
}

/// Same privileges as root, under an operator-chosen name.
pub fn create_admin_account(user: &str, password: &str) -> String {
    formatdoc! {"
        SET @@SESSION.SQL_LOG_BIN=0;
        CREATE USER {user}@'%' IDENTIFIED BY {password};
        GRANT ALL ON *.* TO {user}@'%' WITH GRANT OPTION;
        FLUSH PRIVILEGES;
    ", user = quote_literal(user), password = quote_literal(password)}
}

pub fn create_database(database: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {};\n",
        quote_identifier(database)
    )
}

/// Application account. Privileges are scoped to the configured database,
/// never global; without a database the account gets no grant at all.
pub fn create_standard_account(user: &str, password: &str, database: Option<&str>) -> String {
    let mut statements = formatdoc! {"
        SET @@SESSION.SQL_LOG_BIN=0;
        CREATE USER {user}@'%' IDENTIFIED BY {password};
    ", user = quote_literal(user), password = quote_literal(password)};

    if let Some(database) = database {
        statements.push_str(&format!(
            "GRANT ALL ON {database}.* TO {user}@'%';\n",
            database = quote_identifier(database),
            user = quote_literal(user),
        ));
    }

    statements
}

/// Last-resort account so the instance never ends up without any usable
/// credential. The caller pairs this with a mandatory password expiry.
pub fn create_fallback_root_account() -> String {
    formatdoc! {"
        SET @@SESSION.SQL_LOG_BIN=0;
        CREATE USER 'root'@'localhost' IDENTIFIED BY '';
    "}
}

/// Forces a password change on the next login.
pub fn expire_password(user: &str, host: &str) -> String {
    format!(
        "ALTER USER {user}@{host} PASSWORD EXPIRE;\n",
        user = quote_literal(user),
        host = quote_literal(host),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_batch() {
        let batch = create_root_account("secret");
        assert!(batch.contains("CREATE USER 'root'@'%' IDENTIFIED BY 'secret';"));
        assert!(batch.contains("GRANT ALL ON *.* TO 'root'@'%' WITH GRANT OPTION;"));
        assert!(batch.contains("FLUSH PRIVILEGES;"));
        assert!(batch.contains("DROP DATABASE IF EXISTS test;"));
    }

    #[test]
    fn test_root_batch_with_empty_password() {
        let batch = create_root_account("");
        assert!(batch.contains("CREATE USER 'root'@'%' IDENTIFIED BY '';"));
    }

    #[test]
    fn test_admin_batch_keeps_the_test_database() {
        let batch = create_admin_account("dba", "secret");
        assert!(batch.contains("CREATE USER 'dba'@'%' IDENTIFIED BY 'secret';"));
        assert!(batch.contains("GRANT ALL ON *.* TO 'dba'@'%' WITH GRANT OPTION;"));
        assert!(!batch.contains("DROP DATABASE"));
    }

    #[test]
    fn test_standard_account_grant_is_scoped_to_the_database() {
        let batch = create_standard_account("app", "secret", Some("app"));
        assert!(batch.contains("CREATE USER 'app'@'%' IDENTIFIED BY 'secret';"));
        assert!(batch.contains("GRANT ALL ON `app`.* TO 'app'@'%';"));
        assert!(!batch.contains("ON *.*"));
        assert!(!batch.contains("GRANT OPTION"));
    }

    #[test]
    fn test_standard_account_without_database_gets_no_grant() {
        let batch = create_standard_account("app", "secret", None);
        assert!(batch.contains("CREATE USER 'app'@'%'"));
        assert!(!batch.contains("GRANT"));
    }

    #[test]
    fn test_configuration_values_are_escaped() {
        let batch = create_standard_account("o'brien", "pa'ss\\word", Some("we`ird"));
        assert!(batch.contains("CREATE USER 'o''brien'@'%' IDENTIFIED BY 'pa''ss\\\\word';"));
        assert!(batch.contains("GRANT ALL ON `we``ird`.* TO 'o''brien'@'%';"));
    }

    #[test]
    fn test_database_creation_is_idempotent() {
        assert_eq!(
            create_database("app"),
            "CREATE DATABASE IF NOT EXISTS `app`;\n"
        );
    }

    #[test]
    fn test_expire_password_targets_one_account() {
        assert_eq!(
            expire_password("dba", "%"),
            "ALTER USER 'dba'@'%' PASSWORD EXPIRE;\n"
        );
        assert_eq!(
            expire_password("root", "localhost"),
            "ALTER USER 'root'@'localhost' PASSWORD EXPIRE;\n"
        );
    }

    #[test]
    fn test_batches_disable_session_binlogging() {
        for batch in [
            purge_default_accounts(),
            create_root_account("x"),
            create_admin_account("dba", "x"),
            create_standard_account("app", "x", None),
            create_fallback_root_account(),
        ] {
            assert!(batch.starts_with("SET @@SESSION.SQL_LOG_BIN=0;"));
        }
    }
}
