//! Single writer for the report table.
//!
//! One blocking task owns the SQLite connection. Workers hand it records over
//! a channel and get an acknowledgement once the row is committed, so every
//! commit on the connection is serialized without sharing it.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::db;
use crate::error::{CrawlError, CrawlResult};
use crate::record::Record;

const QUEUE_DEPTH: usize = 64;

struct AppendRequest {
    record: Record,
    ack: oneshot::Sender<CrawlResult<i64>>,
}

#[derive(Clone)]
pub struct ReportSink {
    tx: mpsc::Sender<AppendRequest>,
}

impl ReportSink {
    /// Start the writer. The handle yields the connection back once every
    /// `ReportSink` clone has been dropped.
    pub fn spawn(conn: Connection) -> (Self, JoinHandle<Connection>) {
        let (tx, mut rx) = mpsc::channel::<AppendRequest>(QUEUE_DEPTH);
        let handle = tokio::task::spawn_blocking(move || {
            while let Some(req) = rx.blocking_recv() {
                let result = db::insert_report(&conn, &req.record);
                if result.is_ok() {
                    info!(
                        "insert {}, {}, {}...",
                        req.record.name,
                        req.record.code,
                        preview(req.record.report.as_deref().unwrap_or_default(), 15)
                    );
                }
                let _ = req.ack.send(result);
            }
            conn
        });
        (Self { tx }, handle)
    }

    /// Persist one completed record. Returns after the row is committed.
    pub async fn append(&self, record: &Record) -> CrawlResult<i64> {
        if !record.is_complete() {
            return Err(CrawlError::MissingReport {
                code: record.code.clone(),
            });
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendRequest {
                record: record.clone(),
                ack,
            })
            .await
            .map_err(|_| CrawlError::SinkClosed)?;
        done.await.map_err(|_| CrawlError::SinkClosed)?
    }
}

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// First `max` characters with runs of whitespace collapsed, for log lines.
fn preview(text: &str, max: usize) -> String {
    let flat = match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(text.trim(), " ").into_owned(),
        None => text.to_string(),
    };
    flat.chars().take(max).collect()
}
