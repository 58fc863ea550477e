use std::fs;
use std::path::Path;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::runtime::ResolvedPaths;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

pub fn ensure_db_parent(paths: &ResolvedPaths) -> Result<()> {
    let parent = paths
        .db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", paths.db_path.display()))?;
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}

pub fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
    Ok(exists == 1)
}

pub fn column_exists(connection: &Connection, table_name: &str, column_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE lower(name) = lower(?2))",
            [table_name, column_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to inspect columns of {table_name}"))?;
    Ok(exists == 1)
}

pub fn count_query(connection: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed query: {sql}"))?;
    usize::try_from(count).context("count does not fit into usize")
}

pub fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| duration.as_secs())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStats {
    pub pages: usize,
    pub deleted_pages: usize,
    pub translated_pages: usize,
    pub redirects: usize,
}

pub fn load_stored_stats(paths: &ResolvedPaths) -> Result<Option<StoredStats>> {
    if !paths.db_path.exists() {
        return Ok(None);
    }
    let connection = open_connection(&paths.db_path)?;
    stored_stats_for_connection(&connection)
}

pub fn stored_stats_for_connection(connection: &Connection) -> Result<Option<StoredStats>> {
    if !table_exists(connection, "pages")? {
        return Ok(None);
    }
    let redirects = if table_exists(connection, "sys_redirect")? {
        count_query(connection, "SELECT COUNT(*) FROM sys_redirect")?
    } else {
        0
    };
    Ok(Some(StoredStats {
        pages: count_query(
            connection,
            "SELECT COUNT(*) FROM pages WHERE deleted = 0 AND sys_language_uid = 0",
        )?,
        deleted_pages: count_query(connection, "SELECT COUNT(*) FROM pages WHERE deleted = 1")?,
        translated_pages: count_query(
            connection,
            "SELECT COUNT(*) FROM pages WHERE sys_language_uid <> 0",
        )?,
        redirects,
    }))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::tempdir;

    use super::{column_exists, load_stored_stats, stored_stats_for_connection, table_exists};
    use crate::migrate::{run_migrations, run_migrations_on};
    use crate::runtime::ResolvedPaths;

    #[test]
    fn stats_are_none_without_database() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        assert!(load_stored_stats(&paths).expect("stats").is_none());
    }

    #[test]
    fn stats_count_live_default_language_pages() {
        let connection = Connection::open_in_memory().expect("open");
        run_migrations_on(&connection).expect("migrate");
        connection
            .execute_batch(
                "INSERT INTO pages (uid, pid, title) VALUES (1, 0, 'Home');
                 INSERT INTO pages (uid, pid, title, deleted) VALUES (2, 1, 'Gone', 1);
                 INSERT INTO pages (uid, pid, title, sys_language_uid) VALUES (3, 1, 'Heim', 1);
                 INSERT INTO sys_redirect (createdon, updatedon, source_host, source_path, target)
                     VALUES (0, 0, 'example.org', '/a', 't3://page?uid=1');",
            )
            .expect("seed");

        let stats = stored_stats_for_connection(&connection)
            .expect("stats")
            .expect("tables exist");
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.deleted_pages, 1);
        assert_eq!(stats.translated_pages, 1);
        assert_eq!(stats.redirects, 1);
    }

    #[test]
    fn schema_helpers_see_migrated_tables() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        run_migrations(&paths).expect("migrate");
        let connection = super::open_connection(&paths.db_path).expect("open");
        assert!(table_exists(&connection, "pages").expect("pages"));
        assert!(table_exists(&connection, "sys_redirect").expect("sys_redirect"));
        assert!(!table_exists(&connection, "tt_content").expect("tt_content"));
        assert!(column_exists(&connection, "pages", "SLUG").expect("slug column"));
        assert!(!column_exists(&connection, "pages", "tx_realurl_pathsegment").expect("legacy"));
    }
}
