use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::info;

use crate::db::{column_exists, ensure_db_parent, open_connection, table_exists, unix_timestamp};
use crate::runtime::ResolvedPaths;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "pages",
        sql: include_str!("migrations/v001_pages.sql"),
    },
    Migration {
        version: 2,
        name: "redirects",
        sql: include_str!("migrations/v002_redirects.sql"),
    },
];

pub const LEGACY_PATHSEGMENT_COLUMN: &str = "tx_realurl_pathsegment";
pub const PATHSEGMENT_COLUMN: &str = "tx_cronsluggy_pathsegment";

/// Report returned after running migrations.
#[derive(Debug, Clone)]
pub struct MigrateReport {
    pub applied: Vec<AppliedMigration>,
    pub current_version: u32,
}

#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
}

/// Run all pending migrations against the database at `paths.db_path`.
/// Creates the database and parent directories if they do not exist.
pub fn run_migrations(paths: &ResolvedPaths) -> Result<MigrateReport> {
    ensure_db_parent(paths)?;
    let connection = open_connection(&paths.db_path)?;
    run_migrations_on(&connection)
}

pub fn run_migrations_on(connection: &Connection) -> Result<MigrateReport> {
    ensure_schema_migrations_table(connection)?;

    let current = current_version(connection)?;
    let mut applied = Vec::new();

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        apply_migration(connection, migration).with_context(|| {
            format!(
                "failed to apply migration v{:03}_{}",
                migration.version, migration.name
            )
        })?;
        info!(version = migration.version, name = migration.name, "applied migration");
        applied.push(AppliedMigration {
            version: migration.version,
            name: migration.name.to_string(),
        });
    }

    let final_version = current_version(connection)?;
    Ok(MigrateReport {
        applied,
        current_version: final_version,
    })
}

/// Returns the number of migrations that have not yet been applied.
pub fn pending_migration_count(paths: &ResolvedPaths) -> Result<usize> {
    if !paths.db_path.exists() {
        return Ok(MIGRATIONS.len());
    }
    let connection = open_connection(&paths.db_path)?;
    ensure_schema_migrations_table(&connection)?;
    let current = current_version(&connection)?;
    Ok(MIGRATIONS.iter().filter(|m| m.version > current).count())
}

/// Returns the highest applied migration version, or 0 if none applied.
pub fn current_version(connection: &Connection) -> Result<u32> {
    let version: i64 = connection
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .context("failed to read current migration version")?;
    u32::try_from(version).context("migration version does not fit into u32")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealUrlMigrationReport {
    pub necessary: bool,
    pub updated_rows: usize,
}

/// Copy RealURL's legacy path segment column into `tx_cronsluggy_pathsegment`.
/// A no-op when the legacy column is absent.
pub fn migrate_realurl_pathsegment(connection: &Connection) -> Result<RealUrlMigrationReport> {
    if !table_exists(connection, "pages")?
        || !column_exists(connection, "pages", LEGACY_PATHSEGMENT_COLUMN)?
    {
        return Ok(RealUrlMigrationReport {
            necessary: false,
            updated_rows: 0,
        });
    }

    let updated_rows = connection
        .execute(
            &format!(
                "UPDATE pages SET {PATHSEGMENT_COLUMN} = COALESCE({LEGACY_PATHSEGMENT_COLUMN}, '')"
            ),
            [],
        )
        .context("failed to copy legacy RealURL path segments")?;
    info!(updated_rows, "migrated RealURL path segments");
    Ok(RealUrlMigrationReport {
        necessary: true,
        updated_rows,
    })
}

fn ensure_schema_migrations_table(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at_unix INTEGER NOT NULL
            );",
        )
        .context("failed to create schema_migrations table")
}

fn apply_migration(connection: &Connection, migration: &Migration) -> Result<()> {
    connection
        .execute_batch("SAVEPOINT migration_apply")
        .context("failed to create savepoint")?;

    let result = (|| -> Result<()> {
        connection
            .execute_batch(migration.sql)
            .with_context(|| format!("SQL execution failed for v{:03}", migration.version))?;

        let now_unix = unix_timestamp()?;
        connection
            .execute(
                "INSERT INTO schema_migrations (version, name, applied_at_unix) VALUES (?1, ?2, ?3)",
                params![
                    i64::from(migration.version),
                    migration.name,
                    i64::try_from(now_unix).context("timestamp does not fit into i64")?,
                ],
            )
            .context("failed to record migration")?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            connection
                .execute_batch("RELEASE SAVEPOINT migration_apply")
                .context("failed to release savepoint")?;
            Ok(())
        }
        Err(err) => {
            let _ = connection.execute_batch("ROLLBACK TO SAVEPOINT migration_apply");
            let _ = connection.execute_batch("RELEASE SAVEPOINT migration_apply");
            Err(err)
        }
    }
}
