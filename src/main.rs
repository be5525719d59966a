mod config;
mod crawler;
mod db;
mod detail;
mod error;
mod listing;
mod navigator;
mod partition;
mod record;
mod session;
mod sink;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::info;

use config::{BrowserOptions, CrawlConfig, MarketType, MatchBy, SiteLayout};
use session::chromium::ChromiumBrowser;
use sink::ReportSink;

#[derive(Parser)]
#[command(name = "esg_crawler", about = "TWSE ESG GHG-reduction disclosure crawler")]
struct Cli {
    /// SQLite file holding the report table
    #[arg(long, global = true, default_value = config::DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover every company for a year/market and store its report
    Crawl {
        /// Report year
        #[arg(long, default_value = config::DEFAULT_YEAR, value_parser = config::parse_year)]
        year: String,
        /// Market segment
        #[arg(long, value_enum, default_value_t = MarketType::Listed)]
        market_type: MarketType,
        /// Number of browser tabs working in parallel
        #[arg(long, default_value_t = NonZeroUsize::new(config::DEFAULT_NUM_TABS).unwrap_or(NonZeroUsize::MIN))]
        num_tabs: NonZeroUsize,
        /// Which listing column identifies a company's row
        #[arg(long, value_enum, default_value_t = MatchBy::Code)]
        match_by: MatchBy,
        /// Inquiry page URL
        #[arg(long, default_value = config::DEFAULT_URL)]
        url: String,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Chromium executable (default: auto-detect)
        #[arg(long)]
        chrome: Option<PathBuf>,
        /// How long a click or read waits for its element
        #[arg(long, default_value = "30")]
        action_timeout_secs: u64,
        /// Also write the collected records as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Row counts per year and market
    Stats {
        /// Also list the most recent rows
        #[arg(short = 'n', long, default_value = "0")]
        recent: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl {
            year,
            market_type,
            num_tabs,
            match_by,
            url,
            headful,
            chrome,
            action_timeout_secs,
            output,
        } => {
            info!("Collecting data...");
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;

            let mut config = CrawlConfig::new(year, market_type, num_tabs);
            config.match_by = match_by;
            config.layout = SiteLayout {
                url,
                ..SiteLayout::default()
            };
            let opts = BrowserOptions {
                headful,
                chrome,
                action_timeout: Duration::from_secs(action_timeout_secs),
            };

            let browser = ChromiumBrowser::launch(&opts).await?;
            let (sink, writer) = ReportSink::spawn(conn);
            let run = crawler::run(&browser, &config, &sink).await;
            drop(sink);
            let writer = writer.await;
            let report = crawler::close_browser(&browser, run).await?;
            writer?;

            crawler::log_summary(&report);
            let failed = report.failed_workers();
            if let Some(path) = output {
                let records = report.into_records();
                std::fs::write(&path, serde_json::to_string_pretty(&records)?)?;
                info!("Wrote {} records to {}", records.len(), path.display());
            }
            info!("Time: {}", format_duration(t0.elapsed()));
            info!("Finished collecting data.");
            if failed > 0 {
                anyhow::bail!("{} worker(s) did not finish their chunk", failed);
            }
            Ok(())
        }
        Commands::Stats { recent } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let rows = db::get_stats(&conn)?;
            if rows.is_empty() {
                println!("No reports stored. Run 'crawl' first.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<6} | {:>6} | {:>9} | {:<19}",
                "Year", "Market", "Rows", "Companies", "Last insert"
            );
            println!("{}", "-".repeat(56));
            for r in &rows {
                let last = r
                    .last_insert
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:>4} | {:<6} | {:>6} | {:>9} | {:<19}",
                    r.year, r.market_type, r.rows, r.distinct_codes, last
                );
            }
            println!("\nTotal: {}", db::count_reports(&conn)?);

            if recent > 0 {
                println!("\n--- Recent ---");
                for r in db::fetch_reports(&conn, Some(recent))? {
                    println!(
                        "{:>6} | {} | {} {} | {:<6} | {:<20} | {}",
                        r.id,
                        r.created_at.format("%Y-%m-%d %H:%M:%S"),
                        r.year,
                        r.market_type,
                        r.code,
                        truncate(&r.name, 20),
                        truncate(&r.report.replace('\n', " "), 40)
                    );
                }
            }
            Ok(())
        }
    };

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

/// `m:ss`, growing an hour field for long runs.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 3600 {
        format!("{}:{:02} minutes", secs / 60, secs % 60)
    } else {
        format!("{}:{:02}:{:02} hours", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05 minutes");
        assert_eq!(format_duration(Duration::from_secs(754)), "12:34 minutes");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05 hours");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("台灣水泥股份有限公司", 4), "台灣水泥...");
        assert_eq!(truncate("短", 4), "短");
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["esg_crawler", "crawl"]).unwrap();
        assert_eq!(cli.db, PathBuf::from("storage.sqlite3"));
        match cli.command {
            Commands::Crawl {
                year,
                market_type,
                num_tabs,
                match_by,
                ..
            } => {
                assert_eq!(year, "2023");
                assert_eq!(market_type, MarketType::Listed);
                assert_eq!(num_tabs.get(), 10);
                assert_eq!(match_by, MatchBy::Code);
            }
            Commands::Stats { .. } => panic!("expected crawl"),
        }
    }

    #[test]
    fn cli_rejects_zero_tabs_and_bad_year() {
        assert!(Cli::try_parse_from(["esg_crawler", "crawl", "--num-tabs", "0"]).is_err());
        assert!(Cli::try_parse_from(["esg_crawler", "crawl", "--year", "23"]).is_err());
    }

    #[test]
    fn cli_accepts_chinese_market_label() {
        let cli = Cli::try_parse_from(["esg_crawler", "crawl", "--market-type", "興櫃"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Crawl { market_type: MarketType::Emerging, .. }
        ));
    }
}
