//! Chromium-backed sessions using chromiumoxide.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::js::EvaluationResult;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Browser, Locator, PageSession};
use crate::config::BrowserOptions;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// No request in flight for this long counts as network idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

pub struct ChromiumBrowser {
    browser: Mutex<CdpBrowser>,
    action_timeout: Duration,
}

impl ChromiumBrowser {
    /// Launch a Chromium instance and drive its CDP event loop in the background.
    pub async fn launch(opts: &BrowserOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if opts.headful {
            builder = builder.with_head();
        }
        if let Some(path) = &opts.chrome {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            action_timeout: opts.action_timeout,
        })
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_session(&self) -> Result<Box<dyn PageSession>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open a new tab")?;
        let network = track_network(&page).await?;
        Ok(Box::new(ChromiumSession {
            page,
            network,
            action_timeout: self.action_timeout,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        Ok(())
    }
}

/// Requests the tab has started but not yet finished, fed from CDP network
/// events.
#[derive(Debug)]
struct NetworkActivity {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_change: now,
        }
    }

    fn started(&mut self, request_id: String, at: Instant) {
        self.in_flight.insert(request_id);
        self.last_change = at;
    }

    fn settled(&mut self, request_id: &str, at: Instant) {
        if self.in_flight.remove(request_id) {
            self.last_change = at;
        }
    }

    /// Nothing in flight, and nothing started or finished for `quiet`,
    /// counting from `since` at the earliest.
    fn is_quiet(&self, since: Instant, now: Instant, quiet: Duration) -> bool {
        self.in_flight.is_empty()
            && now.saturating_duration_since(self.last_change.max(since)) >= quiet
    }
}

type SharedActivity = Arc<std::sync::Mutex<NetworkActivity>>;

/// Enable the Network domain on `page` and keep a live count of its requests.
async fn track_network(page: &Page) -> Result<SharedActivity> {
    page.execute(EnableParams::default())
        .await
        .context("failed to enable network events")?;
    let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;

    let activity = Arc::new(std::sync::Mutex::new(NetworkActivity::new(Instant::now())));
    let tracker = Arc::clone(&activity);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(ev) = sent.next() => match tracker.lock() {
                    Ok(mut n) => n.started(ev.request_id.inner().clone(), Instant::now()),
                    Err(_) => break,
                },
                Some(ev) = finished.next() => match tracker.lock() {
                    Ok(mut n) => n.settled(ev.request_id.inner(), Instant::now()),
                    Err(_) => break,
                },
                Some(ev) = failed.next() => match tracker.lock() {
                    Ok(mut n) => n.settled(ev.request_id.inner(), Instant::now()),
                    Err(_) => break,
                },
                else => break,
            }
        }
    });
    Ok(activity)
}

/// The evaluated value, with JS `null` and `undefined` as `None`.
fn optional_value<T: DeserializeOwned>(result: &EvaluationResult) -> Result<Option<T>> {
    match result.value() {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => Ok(Some(
            serde_json::from_value(v.clone()).context("failed to convert JS result")?,
        )),
    }
}

pub struct ChromiumSession {
    page: Page,
    network: SharedActivity,
    action_timeout: Duration,
}

impl ChromiumSession {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<Option<T>> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        optional_value(&result)
    }

    /// Re-run `script` until it yields `Some`, or give up after the action timeout.
    async fn poll<T: DeserializeOwned>(&self, script: String) -> Result<Option<T>> {
        let deadline = Instant::now() + self.action_timeout;
        loop {
            let value: Option<T> = self.eval(script.clone()).await?;
            if value.is_some() {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn wait_for_network_idle(&mut self) -> Result<()> {
        let since = Instant::now();
        loop {
            let ready: Option<String> = self.eval("document.readyState".to_string()).await?;
            let quiet = self
                .network
                .lock()
                .map_err(|_| anyhow::anyhow!("network tracker poisoned"))?
                .is_quiet(since, Instant::now(), NETWORK_QUIET);
            if quiet && ready.as_deref() == Some("complete") {
                debug!("network idle after {:?}", since.elapsed());
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for(&mut self, target: &Locator) -> Result<bool> {
        let script = format!("(({}).length > 0) || null", target.to_js());
        Ok(self.poll::<bool>(script).await?.is_some())
    }

    async fn click(&mut self, target: &Locator) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = ({})[0]; if (!el) return null; el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
            target.to_js()
        );
        Ok(self.poll::<bool>(script).await?.is_some())
    }

    async fn count(&mut self, target: &Locator) -> Result<usize> {
        self.eval(format!("({}).length", target.to_js()))
            .await?
            .with_context(|| format!("no element count for {target}"))
    }

    async fn inner_text(&mut self, target: &Locator) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = ({})[0]; return el ? el.innerText : null; }})()",
            target.to_js()
        );
        self.poll(script).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close tab")?;
        Ok(())
    }
}
