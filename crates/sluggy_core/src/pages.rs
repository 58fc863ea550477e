use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;
use tracing::debug;

use crate::db::open_connection;
use crate::runtime::ResolvedPaths;

/// Page kind, stored as the integer `doktype` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "i64")]
pub enum Doktype {
    #[default]
    Default,
    Link,
    Shortcut,
    BackendUserSection,
    MountPoint,
    Spacer,
    SysFolder,
    Recycler,
    Other(i64),
}

impl Doktype {
    pub fn code(self) -> i64 {
        match self {
            Self::Default => 1,
            Self::Link => 3,
            Self::Shortcut => 4,
            Self::BackendUserSection => 6,
            Self::MountPoint => 7,
            Self::Spacer => 199,
            Self::SysFolder => 254,
            Self::Recycler => 255,
            Self::Other(code) => code,
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::Default => String::new(),
            Self::Link => "External link".to_string(),
            Self::Shortcut => "Shortcut".to_string(),
            Self::BackendUserSection => "BE user section".to_string(),
            Self::MountPoint => "Mountpoint".to_string(),
            Self::Spacer => "Spacer".to_string(),
            Self::SysFolder => "Folder".to_string(),
            Self::Recycler => "Recycler".to_string(),
            Self::Other(code) => format!("doktype {code}"),
        }
    }

    /// Kinds that never contribute a path segment to their subpages.
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Spacer | Self::SysFolder | Self::Recycler)
    }
}

impl From<i64> for Doktype {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Default,
            3 => Self::Link,
            4 => Self::Shortcut,
            6 => Self::BackendUserSection,
            7 => Self::MountPoint,
            199 => Self::Spacer,
            254 => Self::SysFolder,
            255 => Self::Recycler,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub uid: i64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub sorting: i64,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub doktype: Doktype,
    #[serde(default)]
    pub is_siteroot: bool,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nav_title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default, rename = "tx_cronsluggy_pathsegment")]
    pub path_segment: String,
    /// `None` when the column carries no value; the doktype decides then.
    #[serde(default)]
    pub exclude_slug_for_subpages: Option<bool>,
}

impl Page {
    pub fn new(uid: i64, pid: i64, title: &str) -> Self {
        Self {
            uid,
            pid,
            sorting: 0,
            hidden: false,
            doktype: Doktype::Default,
            is_siteroot: false,
            slug: String::new(),
            title: title.to_string(),
            nav_title: String::new(),
            subtitle: String::new(),
            path_segment: String::new(),
            exclude_slug_for_subpages: None,
        }
    }

    /// Look up a slug source field by its column name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(&self.title),
            "nav_title" => Some(&self.nav_title),
            "subtitle" => Some(&self.subtitle),
            "tx_cronsluggy_pathsegment" | "path_segment" => Some(&self.path_segment),
            "slug" => Some(&self.slug),
            _ => None,
        }
    }

    /// Whether subpages skip this page's segment when inheriting a prefix.
    pub fn excludes_own_segment(&self) -> bool {
        match self.exclude_slug_for_subpages {
            Some(flag) => flag,
            None => self.doktype.is_transparent(),
        }
    }
}

/// Read/write access to the page table. Implementations only ever return
/// non-deleted rows of the default language.
pub trait PageStore {
    fn fetch_by_uid(&self, uid: i64) -> Result<Option<Page>>;

    /// Children of `pid` ordered by their sorting key.
    fn fetch_children(&self, pid: i64) -> Result<Vec<Page>>;

    fn update_slug(&self, uid: i64, slug: &str) -> Result<()>;

    fn find_by_slug(&self, slug: &str) -> Result<Vec<Page>>;

    /// The page followed by its ancestors, nearest first.
    fn rootline(&self, uid: i64) -> Result<Vec<Page>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = uid;
        while cursor > 0 && seen.insert(cursor) {
            let Some(page) = self.fetch_by_uid(cursor)? else {
                break;
            };
            cursor = page.pid;
            out.push(page);
        }
        Ok(out)
    }
}

const PAGE_COLUMNS: &str = "uid, pid, sorting, hidden, doktype, is_siteroot, slug, title, nav_title, subtitle, tx_cronsluggy_pathsegment, exclude_slug_for_subpages";

pub struct SqlitePageStore {
    connection: Connection,
}

impl SqlitePageStore {
    pub fn open(paths: &ResolvedPaths) -> Result<Self> {
        Ok(Self {
            connection: open_connection(&paths.db_path)?,
        })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Insert or replace rows from an import file.
    pub fn import_rows(&self, rows: &[ImportRow]) -> Result<usize> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .context("failed to start page import transaction")?;
        let mut statement = transaction
            .prepare(
                "INSERT OR REPLACE INTO pages (
                    uid, pid, sorting, deleted, hidden, sys_language_uid, doktype, is_siteroot,
                    slug, title, nav_title, subtitle, tx_cronsluggy_pathsegment, exclude_slug_for_subpages
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )
            .context("failed to prepare pages insert")?;

        let mut inserted = 0usize;
        for row in rows {
            let page = &row.page;
            statement
                .execute(params![
                    page.uid,
                    page.pid,
                    page.sorting,
                    row.deleted,
                    page.hidden,
                    row.sys_language_uid,
                    page.doktype.code(),
                    page.is_siteroot,
                    page.slug,
                    page.title,
                    page.nav_title,
                    page.subtitle,
                    page.path_segment,
                    page.exclude_slug_for_subpages,
                ])
                .with_context(|| format!("failed to import page {}", page.uid))?;
            inserted += 1;
        }
        drop(statement);

        transaction
            .commit()
            .context("failed to commit page import transaction")?;
        Ok(inserted)
    }

    fn query_pages(&self, sql: &str, value: &dyn rusqlite::ToSql) -> Result<Vec<Page>> {
        let mut statement = self
            .connection
            .prepare(sql)
            .with_context(|| format!("failed to prepare page query: {sql}"))?;
        let rows = statement
            .query_map([value], page_from_row)
            .context("failed to run page query")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read page row")?);
        }
        Ok(out)
    }
}

impl PageStore for SqlitePageStore {
    fn fetch_by_uid(&self, uid: i64) -> Result<Option<Page>> {
        self.connection
            .query_row(
                &format!(
                    "SELECT {PAGE_COLUMNS} FROM pages
                     WHERE uid = ?1 AND deleted = 0 AND sys_language_uid = 0"
                ),
                [uid],
                page_from_row,
            )
            .optional()
            .with_context(|| format!("failed to load page {uid}"))
    }

    fn fetch_children(&self, pid: i64) -> Result<Vec<Page>> {
        self.query_pages(
            &format!(
                "SELECT {PAGE_COLUMNS} FROM pages
                 WHERE pid = ?1 AND deleted = 0 AND sys_language_uid = 0
                 ORDER BY sorting ASC, uid ASC"
            ),
            &pid,
        )
        .with_context(|| format!("failed to load children of page {pid}"))
    }

    fn update_slug(&self, uid: i64, slug: &str) -> Result<()> {
        let updated = self
            .connection
            .execute("UPDATE pages SET slug = ?1 WHERE uid = ?2", params![slug, uid])
            .with_context(|| format!("failed to update slug of page {uid}"))?;
        debug!(uid, slug, updated, "stored slug");
        Ok(())
    }

    fn find_by_slug(&self, slug: &str) -> Result<Vec<Page>> {
        self.query_pages(
            &format!(
                "SELECT {PAGE_COLUMNS} FROM pages
                 WHERE slug = ?1 AND deleted = 0 AND sys_language_uid = 0
                 ORDER BY uid ASC"
            ),
            &slug,
        )
        .with_context(|| format!("failed to look up slug {slug}"))
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    let doktype: i64 = row.get(4)?;
    Ok(Page {
        uid: row.get(0)?,
        pid: row.get(1)?,
        sorting: row.get(2)?,
        hidden: row.get(3)?,
        doktype: Doktype::from(doktype),
        is_siteroot: row.get(5)?,
        slug: row.get(6)?,
        title: row.get(7)?,
        nav_title: row.get(8)?,
        subtitle: row.get(9)?,
        path_segment: row.get(10)?,
        exclude_slug_for_subpages: row.get(11)?,
    })
}

/// One row of a page import file: a page plus the columns the engine filters on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportRow {
    #[serde(flatten)]
    pub page: Page,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub sys_language_uid: i64,
}

pub fn load_import_file(path: &Path) -> Result<Vec<ImportRow>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse page rows from {}", path.display()))
}
