use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;

pub const DEFAULT_DB_PATH: &str = "storage.sqlite3";
pub const DEFAULT_URL: &str = "https://esggenplus.twse.com.tw/inquiry/ghg-reduction";
pub const DEFAULT_YEAR: &str = "2023";
pub const DEFAULT_NUM_TABS: usize = 10;

/// Market segment filter offered by the inquiry form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MarketType {
    /// 上市
    #[value(alias = "上市")]
    Listed,
    /// 上櫃
    #[value(alias = "上櫃")]
    Otc,
    /// 公發
    #[value(alias = "公發")]
    Public,
    /// 興櫃
    #[value(alias = "興櫃")]
    Emerging,
}

impl MarketType {
    /// Label rendered in the segment dropdown. Also the value persisted.
    pub fn label(&self) -> &'static str {
        match self {
            MarketType::Listed => "上市",
            MarketType::Otc => "上櫃",
            MarketType::Public => "公發",
            MarketType::Emerging => "興櫃",
        }
    }
}

/// Which listing cell identifies a record's row when opening its detail panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchBy {
    Code,
    Name,
}

/// Selectors and labels of the upstream inquiry page.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub url: String,
    pub market_placeholder: String,
    pub year_placeholder: String,
    pub query_button: String,
    pub table_body: String,
    pub rows: String,
    pub cells: String,
    pub code_column: usize,
    pub name_column: usize,
    /// Opening control inside a row: the `detail_control_index`-th match of `detail_control`.
    pub detail_control: String,
    pub detail_control_index: usize,
    pub overlay_body: String,
    pub close_label: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            market_placeholder: "市場別*".to_string(),
            year_placeholder: "報告年度*".to_string(),
            query_button: "查詢".to_string(),
            table_body: "tbody".to_string(),
            rows: "tbody tr".to_string(),
            cells: "td".to_string(),
            code_column: 0,
            name_column: 1,
            detail_control: "div".to_string(),
            detail_control_index: 1,
            overlay_body: ".modal-body".to_string(),
            close_label: "Close".to_string(),
        }
    }
}

/// Everything a crawl run needs besides the browser and the store.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub year: String,
    pub market_type: MarketType,
    pub num_tabs: NonZeroUsize,
    pub match_by: MatchBy,
    pub layout: SiteLayout,
}

impl CrawlConfig {
    pub fn new(year: impl Into<String>, market_type: MarketType, num_tabs: NonZeroUsize) -> Self {
        Self {
            year: year.into(),
            market_type,
            num_tabs,
            match_by: MatchBy::Code,
            layout: SiteLayout::default(),
        }
    }
}

/// Launch options for the browser engine.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headful: bool,
    pub chrome: Option<PathBuf>,
    pub action_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headful: false,
            chrome: None,
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// clap value parser: report years are four digits.
pub fn parse_year(s: &str) -> Result<String, String> {
    let re = Regex::new(r"^\d{4}$").map_err(|e| e.to_string())?;
    if re.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(format!("expected a four-digit year, got '{}'", s))
    }
}
