use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::error::{CrawlError, CrawlResult};
use crate::record::Record;

pub fn connect(path: impl AsRef<Path>) -> CrawlResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> CrawlResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS company_reports (
            id          INTEGER PRIMARY KEY,
            name        TEXT,
            code        TEXT,
            report      TEXT,
            year        INTEGER,
            market_type TEXT,
            created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )?;
    Ok(())
}

// ── Writing ──

/// Append one completed record and commit. Returns the generated row id.
pub fn insert_report(conn: &Connection, record: &Record) -> CrawlResult<i64> {
    let report = record.report.as_deref().ok_or_else(|| CrawlError::MissingReport {
        code: record.code.clone(),
    })?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO company_reports (name, code, report, year, market_type)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![record.name, record.code, report, record.year, record.market_type],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

// ── Reading ──

pub struct ReportRow {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub report: String,
    pub year: i64,
    pub market_type: String,
    pub created_at: NaiveDateTime,
}

/// Stored rows, newest first.
pub fn fetch_reports(conn: &Connection, limit: Option<usize>) -> CrawlResult<Vec<ReportRow>> {
    let sql = format!(
        "SELECT id, name, code, report, year, market_type, created_at
         FROM company_reports
         ORDER BY id DESC{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReportRow {
                id: row.get(0)?,
                name: row.get(1)?,
                code: row.get(2)?,
                report: row.get(3)?,
                year: row.get(4)?,
                market_type: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_reports(conn: &Connection) -> CrawlResult<usize> {
    let n: usize = conn.query_row("SELECT COUNT(*) FROM company_reports", [], |r| r.get(0))?;
    Ok(n)
}

// ── Stats ──

pub struct StatsRow {
    pub year: i64,
    pub market_type: String,
    pub rows: usize,
    pub distinct_codes: usize,
    pub last_insert: Option<NaiveDateTime>,
}

pub fn get_stats(conn: &Connection) -> CrawlResult<Vec<StatsRow>> {
    let mut stmt = conn.prepare(
        "SELECT year, market_type, COUNT(*), COUNT(DISTINCT code), MAX(created_at)
         FROM company_reports
         GROUP BY year, market_type
         ORDER BY year DESC, market_type",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StatsRow {
                year: row.get(0)?,
                market_type: row.get(1)?,
                rows: row.get(2)?,
                distinct_codes: row.get(3)?,
                last_insert: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
