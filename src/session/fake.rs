//! In-memory stand-in for the inquiry site, for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{Browser, Locator, PageSession};
use crate::config::{MarketType, SiteLayout};

#[derive(Debug, Clone)]
pub struct FakeRow {
    pub code: String,
    pub name: String,
    pub report: String,
}

impl FakeRow {
    pub fn new(code: &str, name: &str, report: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            report: report.to_string(),
        }
    }
}

#[derive(Default)]
pub struct FakeSite {
    pub layout: SiteLayout,
    pub rows: Vec<FakeRow>,
    /// Form controls are not rendered at all.
    pub controls_missing: bool,
    /// Opening the detail panel of the row with this code errors.
    pub fail_open_on: Mutex<Option<String>>,
    /// `new_session` errors once this many sessions exist.
    pub session_limit: Option<usize>,
    /// `Browser::shutdown` errors.
    pub shutdown_fails: bool,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub navigations: AtomicUsize,
    pub detail_opens: AtomicUsize,
}

impl FakeSite {
    pub fn with_rows(rows: Vec<FakeRow>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            ..Default::default()
        })
    }

    pub fn fail_opening(&self, code: &str) {
        *self.fail_open_on.lock().unwrap() = Some(code.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropdown {
    Market,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Blank,
    Form {
        market: Option<String>,
        year: Option<String>,
        open: Option<Dropdown>,
    },
    Listing { year: String, market: String },
    Overlay { year: String, market: String, row: usize },
}

pub struct FakeBrowser {
    pub site: Arc<FakeSite>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_session(&self) -> Result<Box<dyn PageSession>> {
        if let Some(limit) = self.site.session_limit {
            if self.site.sessions_opened.load(Ordering::SeqCst) >= limit {
                bail!("tab limit of {} reached", limit);
            }
        }
        Ok(Box::new(FakeSession::new(Arc::clone(&self.site))))
    }

    async fn shutdown(&self) -> Result<()> {
        self.site.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.site.shutdown_fails {
            bail!("browser process already gone");
        }
        Ok(())
    }
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    view: View,
}

impl FakeSession {
    pub fn new(site: Arc<FakeSite>) -> Self {
        site.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Self {
            site,
            view: View::Blank,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    fn layout(&self) -> &SiteLayout {
        &self.site.layout
    }

    fn table_visible(&self) -> bool {
        matches!(self.view, View::Listing { .. } | View::Overlay { .. })
    }

    fn matching_rows(&self, column: usize, text: &str) -> Vec<usize> {
        self.site
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| cell(r, column) == Some(text))
            .map(|(i, _)| i)
            .collect()
    }

    /// `rows >> nth=i >> cells >> nth=j`
    fn listing_cell(&self, target: &Locator) -> Option<String> {
        let Locator::Nth(inner, col) = target else { return None };
        let Locator::Descendant(row, cells) = inner.as_ref() else { return None };
        let Locator::Nth(rows, idx) = row.as_ref() else { return None };
        if *rows.as_ref() != Locator::css(self.layout().rows.clone()) || *cells != self.layout().cells {
            return None;
        }
        if !self.table_visible() {
            return None;
        }
        self.site
            .rows
            .get(*idx)
            .and_then(|r| cell(r, *col))
            .map(str::to_string)
    }

    /// `row >> detail_control >> nth=k`, resolved to the first matching row index.
    fn detail_target(&self, target: &Locator) -> Option<usize> {
        let Locator::Nth(inner, idx) = target else { return None };
        let Locator::Descendant(row, ctrl) = inner.as_ref() else { return None };
        let Locator::Row { column, text, .. } = row.as_ref() else { return None };
        if *ctrl != self.layout().detail_control || *idx != self.layout().detail_control_index {
            return None;
        }
        self.matching_rows(*column, text).first().copied()
    }
}

fn cell(row: &FakeRow, column: usize) -> Option<&str> {
    match column {
        0 => Some(row.code.as_str()),
        1 => Some(row.name.as_str()),
        _ => None,
    }
}

fn is_market_label(t: &str) -> bool {
    [
        MarketType::Listed,
        MarketType::Otc,
        MarketType::Public,
        MarketType::Emerging,
    ]
    .iter()
    .any(|m| m.label() == t)
}

#[async_trait]
impl PageSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.site.navigations.fetch_add(1, Ordering::SeqCst);
        self.view = if url == self.layout().url {
            View::Form {
                market: None,
                year: None,
                open: None,
            }
        } else {
            View::Blank
        };
        Ok(())
    }

    async fn wait_for_network_idle(&mut self) -> Result<()> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn wait_for(&mut self, target: &Locator) -> Result<bool> {
        Ok(self.count(target).await? > 0)
    }

    async fn click(&mut self, target: &Locator) -> Result<bool> {
        tokio::task::yield_now().await;
        if let Some(row) = self.detail_target(target) {
            let View::Listing { year, market } = &self.view else { return Ok(false) };
            if self.site.fail_open_on.lock().unwrap().as_deref() == Some(self.site.rows[row].code.as_str()) {
                bail!("detail panel for {} did not open", self.site.rows[row].code);
            }
            self.site.detail_opens.fetch_add(1, Ordering::SeqCst);
            self.view = View::Overlay {
                year: year.clone(),
                market: market.clone(),
                row,
            };
            return Ok(true);
        }

        let layout = self.site.layout.clone();
        let controls = !self.site.controls_missing;
        match (target, &mut self.view) {
            (Locator::Css(sel), view) if sel == "body" => Ok(*view != View::Blank),
            (Locator::Placeholder(p), View::Form { open, .. }) if controls => {
                if *p == layout.market_placeholder {
                    *open = Some(Dropdown::Market);
                } else if *p == layout.year_placeholder {
                    *open = Some(Dropdown::Year);
                } else {
                    return Ok(false);
                }
                Ok(true)
            }
            (Locator::Text(t), View::Form { market, year, open }) => match *open {
                Some(Dropdown::Market) if is_market_label(t) => {
                    *market = Some(t.clone());
                    *open = None;
                    Ok(true)
                }
                Some(Dropdown::Year) if t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()) => {
                    *year = Some(t.clone());
                    *open = None;
                    Ok(true)
                }
                _ => Ok(false),
            },
            (Locator::Button(b), View::Form { market: Some(m), year: Some(y), .. })
                if controls && *b == layout.query_button =>
            {
                self.view = View::Listing {
                    year: y.clone(),
                    market: m.clone(),
                };
                Ok(true)
            }
            (Locator::Label(l), View::Overlay { year, market, .. }) if *l == layout.close_label => {
                self.view = View::Listing {
                    year: year.clone(),
                    market: market.clone(),
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count(&mut self, target: &Locator) -> Result<usize> {
        if !self.table_visible() {
            return Ok(0);
        }
        Ok(match target {
            Locator::Css(sel) if *sel == self.layout().table_body => 1,
            Locator::Css(sel) if *sel == self.layout().rows => self.site.rows.len(),
            Locator::Row { column, text, .. } => self.matching_rows(*column, text).len(),
            _ => 0,
        })
    }

    async fn inner_text(&mut self, target: &Locator) -> Result<Option<String>> {
        tokio::task::yield_now().await;
        if let Locator::Css(sel) = target {
            if *sel == self.layout().overlay_body {
                return Ok(match &self.view {
                    View::Overlay { row, .. } => Some(self.site.rows[*row].report.clone()),
                    _ => None,
                });
            }
        }
        Ok(self.listing_cell(target))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.site.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
