use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::CrawlConfig;
use crate::detail;
use crate::error::CrawlResult;
use crate::listing;
use crate::navigator;
use crate::partition::split_even;
use crate::record::Record;
use crate::session::{Browser, PageSession};
use crate::sink::ReportSink;

/// What one chunk-worker managed before finishing or failing.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub assigned: usize,
    pub records: Vec<Record>,
    pub failure: Option<String>,
}

impl WorkerOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub discovered: usize,
    pub workers: Vec<WorkerOutcome>,
}

impl RunReport {
    pub fn stored(&self) -> usize {
        self.workers.iter().map(|w| w.records.len()).sum()
    }

    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.succeeded()).count()
    }

    /// Every stored record, worker by worker.
    pub fn into_records(self) -> Vec<Record> {
        self.workers.into_iter().flat_map(|w| w.records).collect()
    }
}

/// Discover the listing once, then extract and store every record across
/// `num_tabs` concurrent sessions.
///
/// A worker that fails stops its own chunk only; the others run to the end.
pub async fn run(
    browser: &dyn Browser,
    config: &CrawlConfig,
    sink: &ReportSink,
) -> CrawlResult<RunReport> {
    let records = discover(browser, config).await?;
    let discovered = records.len();

    let sessions = open_sessions(browser, config.num_tabs.get()).await?;

    let pb = ProgressBar::new(discovered as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .map_err(anyhow::Error::from)?
            .progress_chars("=> "),
    );

    let chunks = split_even(records, config.num_tabs);
    let workers = sessions
        .into_iter()
        .zip(chunks)
        .enumerate()
        .map(|(i, (session, chunk))| run_worker(i, session, chunk, config, sink, &pb));
    let workers = join_all(workers).await;
    pb.finish_and_clear();

    Ok(RunReport {
        discovered,
        workers,
    })
}

/// Shut the browser down after a run. A failed shutdown is logged and never
/// replaces the run's own result.
pub async fn close_browser(
    browser: &dyn Browser,
    run: CrawlResult<RunReport>,
) -> CrawlResult<RunReport> {
    if let Err(e) = browser.shutdown().await {
        warn!("browser shutdown failed: {}", e);
    }
    run
}

async fn discover(browser: &dyn Browser, config: &CrawlConfig) -> CrawlResult<Vec<Record>> {
    let mut session = browser.new_session().await?;
    let result = scan(session.as_mut(), config).await;
    if let Err(e) = session.close().await {
        warn!("discovery: closing session failed: {}", e);
    }
    result
}

async fn scan(session: &mut dyn PageSession, config: &CrawlConfig) -> CrawlResult<Vec<Record>> {
    let market = config.market_type;
    navigator::open_listing(session, &config.layout, &config.year, market).await?;
    listing::scan_listing(session, &config.layout, &config.year, market.label()).await
}

/// Open `n` sessions, or none: if one fails, the ones already open are closed.
async fn open_sessions(browser: &dyn Browser, n: usize) -> CrawlResult<Vec<Box<dyn PageSession>>> {
    let mut sessions = Vec::with_capacity(n);
    for _ in 0..n {
        match browser.new_session().await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                for (i, session) in sessions.into_iter().enumerate() {
                    if let Err(e) = session.close().await {
                        warn!("worker {}: closing session failed: {}", i, e);
                    }
                }
                return Err(e.into());
            }
        }
    }
    Ok(sessions)
}

async fn run_worker(
    worker: usize,
    mut session: Box<dyn PageSession>,
    chunk: Vec<Record>,
    config: &CrawlConfig,
    sink: &ReportSink,
    pb: &ProgressBar,
) -> WorkerOutcome {
    let assigned = chunk.len();
    let mut records = Vec::with_capacity(assigned);

    let result = if chunk.is_empty() {
        Ok(())
    } else {
        process_chunk(session.as_mut(), chunk, config, sink, pb, &mut records).await
    };
    if let Err(e) = session.close().await {
        warn!("worker {}: closing session failed: {}", worker, e);
    }

    let failure = result.err().map(|e| {
        warn!(
            "worker {} stopped after {}/{} records: {}",
            worker,
            records.len(),
            assigned,
            e
        );
        e.to_string()
    });
    WorkerOutcome {
        worker,
        assigned,
        records,
        failure,
    }
}

async fn process_chunk(
    session: &mut dyn PageSession,
    chunk: Vec<Record>,
    config: &CrawlConfig,
    sink: &ReportSink,
    pb: &ProgressBar,
    done: &mut Vec<Record>,
) -> CrawlResult<()> {
    navigator::open_listing(session, &config.layout, &config.year, config.market_type).await?;
    for mut record in chunk {
        let report = detail::extract_report(session, &config.layout, config.match_by, &record).await?;
        record.report = Some(report);
        sink.append(&record).await?;
        done.push(record);
        pb.inc(1);
    }
    Ok(())
}

/// One line per worker plus totals.
pub fn log_summary(report: &RunReport) {
    for w in &report.workers {
        match &w.failure {
            None => info!("worker {}: {}/{} stored", w.worker, w.records.len(), w.assigned),
            Some(e) => warn!(
                "worker {}: {}/{} stored, failed: {}",
                w.worker,
                w.records.len(),
                w.assigned,
                e
            ),
        }
    }
    info!(
        "{} discovered, {} stored, {} worker(s) failed",
        report.discovered,
        report.stored(),
        report.failed_workers()
    );
}
