//! Cache of located reports
//!
//! A record maps a [`ReportKey`] to the document URL and company name found
//! by scraping. The store keeps at most one record per key: inserting a key
//! that already exists leaves the stored row untouched and returns it.

use crate::error::{ReportError, Result};
use crate::key::{ExchangeCode, ReportKey};
use crate::scraper::ScrapeResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One located report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReportRecord {
    pub key: ReportKey,
    pub file_url: String,
    pub company_name: String,
    pub created_at: DateTime<Utc>,
}

impl CachedReportRecord {
    pub fn new(key: ReportKey, result: &ScrapeResult) -> Self {
        Self {
            key,
            file_url: result.file_url().to_string(),
            company_name: result.company_name().to_string(),
            created_at: Utc::now(),
        }
    }

    /// The stored location as a scrape result
    pub fn to_result(&self) -> Result<ScrapeResult> {
        ScrapeResult::new(self.company_name.clone(), self.file_url.clone())
    }
}

/// Datastore for located reports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportCache: Send + Sync {
    /// First record matching all four key fields
    async fn find(&self, key: &ReportKey) -> Result<Option<CachedReportRecord>>;

    /// Store `record` unless its key exists; returns the row now stored
    async fn insert(&self, record: CachedReportRecord) -> Result<CachedReportRecord>;
}

/// SQLite-backed report cache
pub struct SqliteReportCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportCache {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "Opening report cache");
        Self::with_connection(Connection::open(path)?)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS financial_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange_code TEXT NOT NULL,
                stock_code TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                period_type INTEGER NOT NULL,
                file_url TEXT NOT NULL,
                company_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (exchange_code, stock_code, fiscal_year, period_type)
            )",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| ReportError::Cache(format!("connection lock poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| ReportError::Cache(format!("task join error: {e}")))?
    }
}

const SELECT_BY_KEY: &str = "SELECT exchange_code, stock_code, fiscal_year, period_type,
        file_url, company_name, created_at
 FROM financial_reports
 WHERE exchange_code = ?1 AND stock_code = ?2 AND fiscal_year = ?3 AND period_type = ?4
 ORDER BY id
 LIMIT 1";

struct RawRow {
    exchange_code: String,
    stock_code: String,
    fiscal_year: i32,
    period_type: u8,
    file_url: String,
    company_name: String,
    created_at: String,
}

fn parse_row(raw: RawRow) -> Result<CachedReportRecord> {
    let exchange: ExchangeCode = raw.exchange_code.parse()?;
    let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
        .map_err(|e| ReportError::Cache(format!("bad created_at {:?}: {e}", raw.created_at)))?
        .with_timezone(&Utc);

    Ok(CachedReportRecord {
        key: ReportKey::new(exchange, raw.stock_code, raw.fiscal_year, raw.period_type)?,
        file_url: raw.file_url,
        company_name: raw.company_name,
        created_at,
    })
}

fn select(conn: &Connection, key: &ReportKey) -> Result<Option<CachedReportRecord>> {
    let raw = conn
        .query_row(
            SELECT_BY_KEY,
            params![
                key.exchange_code().as_str(),
                key.stock_code(),
                key.fiscal_year(),
                key.period_type()
            ],
            |row| {
                Ok(RawRow {
                    exchange_code: row.get(0)?,
                    stock_code: row.get(1)?,
                    fiscal_year: row.get(2)?,
                    period_type: row.get(3)?,
                    file_url: row.get(4)?,
                    company_name: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;

    raw.map(parse_row).transpose()
}

#[async_trait]
impl ReportCache for SqliteReportCache {
    async fn find(&self, key: &ReportKey) -> Result<Option<CachedReportRecord>> {
        let key = key.clone();
        self.with_conn(move |conn| select(conn, &key)).await
    }

    async fn insert(&self, record: CachedReportRecord) -> Result<CachedReportRecord> {
        self.with_conn(move |conn| {
            let key = &record.key;
            let inserted = conn.execute(
                "INSERT INTO financial_reports
                 (exchange_code, stock_code, fiscal_year, period_type, file_url, company_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (exchange_code, stock_code, fiscal_year, period_type) DO NOTHING",
                params![
                    key.exchange_code().as_str(),
                    key.stock_code(),
                    key.fiscal_year(),
                    key.period_type(),
                    record.file_url,
                    record.company_name,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                debug!(key = %key, "Report already cached, keeping existing row");
            }

            select(conn, key)?.ok_or_else(|| {
                ReportError::Cache(format!("row for {key} missing after insert"))
            })
        })
        .await
    }
}

/// Process-local report cache
#[derive(Default)]
pub struct MemoryReportCache {
    records: Mutex<HashMap<ReportKey, CachedReportRecord>>,
}

impl MemoryReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportCache for MemoryReportCache {
    async fn find(&self, key: &ReportKey) -> Result<Option<CachedReportRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| ReportError::Cache(e.to_string()))?;
        Ok(records.get(key).cloned())
    }

    async fn insert(&self, record: CachedReportRecord) -> Result<CachedReportRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| ReportError::Cache(e.to_string()))?;
        Ok(records.entry(record.key.clone()).or_insert(record).clone())
    }
}
