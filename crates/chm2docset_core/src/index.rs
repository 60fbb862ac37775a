use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::bytes::Regex;
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

pub const GUIDE_ENTRY_TYPE: &str = "Guide";

const SEARCH_INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS searchIndex (
    id INTEGER PRIMARY KEY,
    name TEXT,
    type TEXT,
    path TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS anchor ON searchIndex (name, type, path);
"#;

const UPSERT_SQL: &str = "INSERT OR IGNORE INTO searchIndex (name, type, path) VALUES (?1, ?2, ?3)";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct IndexRecord {
    pub name: String,
    pub entry_type: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub html_files: usize,
    pub inserted_records: usize,
    pub duplicate_records: usize,
    pub untitled_files: usize,
}

/// Storage that accepts one batch of records per transaction.
pub trait IndexStore {
    type Writer<'a>: IndexWriter
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Writer<'_>>;
}

/// An open write transaction. Dropping it without `commit` discards every upsert.
pub trait IndexWriter {
    /// Returns `false` when an identical (name, type, path) row already exists.
    fn upsert(&mut self, record: &IndexRecord) -> Result<bool>;

    fn commit(self) -> Result<()>;
}

pub struct SqliteIndexStore {
    connection: Connection,
}

impl SqliteIndexStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        ensure_db_parent(db_path)?;
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy timeout")?;
        connection
            .execute_batch(SEARCH_INDEX_SCHEMA_SQL)
            .context("failed to initialize searchIndex schema")?;
        Ok(Self { connection })
    }

    pub fn count_records(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM searchIndex", [], |row| row.get(0))
            .context("failed to count searchIndex rows")?;
        usize::try_from(count).context("row count does not fit into usize")
    }

    pub fn load_records(&self) -> Result<Vec<IndexRecord>> {
        let mut statement = self
            .connection
            .prepare("SELECT name, type, path FROM searchIndex ORDER BY path ASC, name ASC")
            .context("failed to prepare searchIndex query")?;
        let rows = statement
            .query_map([], |row| {
                Ok(IndexRecord {
                    name: row.get(0)?,
                    entry_type: row.get(1)?,
                    path: row.get(2)?,
                })
            })
            .context("failed to run searchIndex query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode searchIndex row")?);
        }
        Ok(out)
    }
}

impl IndexStore for SqliteIndexStore {
    type Writer<'a> = SqliteIndexWriter<'a>;

    fn begin(&mut self) -> Result<SqliteIndexWriter<'_>> {
        let transaction = self
            .connection
            .transaction()
            .context("failed to start searchIndex transaction")?;
        Ok(SqliteIndexWriter { transaction })
    }
}

pub struct SqliteIndexWriter<'a> {
    transaction: Transaction<'a>,
}

impl IndexWriter for SqliteIndexWriter<'_> {
    fn upsert(&mut self, record: &IndexRecord) -> Result<bool> {
        let mut statement = self
            .transaction
            .prepare_cached(UPSERT_SQL)
            .context("failed to prepare searchIndex insert")?;
        let affected = statement
            .execute(params![record.name, record.entry_type, record.path])
            .with_context(|| format!("failed to insert {}", record.path))?;
        Ok(affected > 0)
    }

    fn commit(self) -> Result<()> {
        self.transaction
            .commit()
            .context("failed to commit searchIndex transaction")
    }
}

/// Index the `<title>` of every HTML page under `content_root` in a single transaction.
///
/// Any read or store failure aborts the pass before commit.
pub fn index_titles<S: IndexStore>(content_root: &Path, store: &mut S) -> Result<IndexStats> {
    let mut writer = store.begin()?;
    let mut stats = IndexStats::default();

    for entry in WalkDir::new(content_root).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk {}", content_root.display()))?;
        if !entry.file_type().is_file() || !is_html_file(entry.path()) {
            continue;
        }
        stats.html_files += 1;

        let bytes = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        let Some(name) = extract_title(&bytes) else {
            debug!(path = %entry.path().display(), "skipping page without title");
            stats.untitled_files += 1;
            continue;
        };

        let record = IndexRecord {
            name,
            entry_type: GUIDE_ENTRY_TYPE.to_string(),
            path: web_path(content_root, entry.path())?,
        };
        if writer.upsert(&record)? {
            debug!(name = %record.name, path = %record.path, "indexed page");
            stats.inserted_records += 1;
        } else {
            stats.duplicate_records += 1;
        }
    }

    writer.commit()?;
    Ok(stats)
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<title>((?-u:[^<])+)</title>").expect("invalid title regex")
    })
}

/// First `<title>` text in the page, if any.
///
/// The page is matched as raw bytes. A title that is not valid UTF-8 is read as
/// Latin-1, the usual encoding of Western CHM archives.
pub fn extract_title(content: &[u8]) -> Option<String> {
    let title = title_pattern()
        .captures(content)
        .and_then(|captures| captures.get(1))?
        .as_bytes();
    Some(match std::str::from_utf8(title) {
        Ok(text) => text.to_string(),
        Err(_) => title.iter().copied().map(char::from).collect(),
    })
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("htm") || extension.eq_ignore_ascii_case("html")
        })
}

/// `/`-rooted, `/`-separated location of `path` inside `content_root`.
fn web_path(content_root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(content_root).with_context(|| {
        format!(
            "{} is not inside {}",
            path.display(),
            content_root.display()
        )
    })?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(out)
}

fn ensure_db_parent(db_path: &Path) -> Result<()> {
    let parent = db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("db path has no parent: {}", db_path.display()))?;
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}
