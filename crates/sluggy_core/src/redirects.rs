use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::db::unix_timestamp;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Link target pointing at a page by uid.
pub fn page_target(uid: i64) -> String {
    format!("t3://page?uid={uid}")
}

pub trait RedirectStore {
    fn create_redirect(
        &self,
        source_host: &str,
        source_path: &str,
        target_page_id: i64,
        ttl_days: u32,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRedirect {
    pub uid: i64,
    pub createdon: i64,
    pub source_host: String,
    pub source_path: String,
    pub target: String,
    pub endtime: i64,
}

/// Writes to the `sys_redirect` table of the page database.
pub struct SqliteRedirectStore<'a> {
    connection: &'a Connection,
}

impl<'a> SqliteRedirectStore<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    pub fn list(&self) -> Result<Vec<StoredRedirect>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT uid, createdon, source_host, source_path, target, endtime
                 FROM sys_redirect
                 ORDER BY uid ASC",
            )
            .context("failed to prepare redirect query")?;
        let rows = statement
            .query_map([], |row| {
                Ok(StoredRedirect {
                    uid: row.get(0)?,
                    createdon: row.get(1)?,
                    source_host: row.get(2)?,
                    source_path: row.get(3)?,
                    target: row.get(4)?,
                    endtime: row.get(5)?,
                })
            })
            .context("failed to run redirect query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read redirect row")?);
        }
        Ok(out)
    }
}

impl RedirectStore for SqliteRedirectStore<'_> {
    fn create_redirect(
        &self,
        source_host: &str,
        source_path: &str,
        target_page_id: i64,
        ttl_days: u32,
    ) -> Result<()> {
        let now = unix_timestamp()?;
        let endtime = now + u64::from(ttl_days) * SECONDS_PER_DAY;
        let now = i64::try_from(now).context("timestamp does not fit into i64")?;
        let endtime = i64::try_from(endtime).context("redirect endtime does not fit into i64")?;
        let target = page_target(target_page_id);

        self.connection
            .execute(
                "INSERT INTO sys_redirect (createdon, updatedon, source_host, source_path, target, endtime)
                 VALUES (?1, ?1, ?2, ?3, ?4, ?5)",
                params![now, source_host, source_path, target, endtime],
            )
            .with_context(|| format!("failed to create redirect from {source_path} to {target}"))?;
        debug!(source_host, source_path, target = %target, endtime, "created redirect");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{RedirectStore, SECONDS_PER_DAY, SqliteRedirectStore, page_target};
    use crate::migrate::run_migrations_on;

    #[test]
    fn page_target_uses_page_link_scheme() {
        assert_eq!(page_target(42), "t3://page?uid=42");
    }

    #[test]
    fn create_redirect_stores_expiry() {
        let connection = Connection::open_in_memory().expect("open");
        run_migrations_on(&connection).expect("migrate");
        let store = SqliteRedirectStore::new(&connection);

        store
            .create_redirect("example.org:8080", "/about/old-name", 7, 30)
            .expect("create");

        let redirects = store.list().expect("list");
        assert_eq!(redirects.len(), 1);
        let redirect = &redirects[0];
        assert_eq!(redirect.source_host, "example.org:8080");
        assert_eq!(redirect.source_path, "/about/old-name");
        assert_eq!(redirect.target, "t3://page?uid=7");
        let ttl = u64::try_from(redirect.endtime - redirect.createdon).expect("positive ttl");
        assert_eq!(ttl, 30 * SECONDS_PER_DAY);
    }

    #[test]
    fn create_redirect_fails_without_schema() {
        let connection = Connection::open_in_memory().expect("open");
        let store = SqliteRedirectStore::new(&connection);
        let err = store
            .create_redirect("example.org", "/a", 1, 1)
            .expect_err("no table");
        assert!(err.to_string().contains("failed to create redirect"));
    }
}
