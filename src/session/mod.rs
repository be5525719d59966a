//! Browser capability used by the pipeline.
//!
//! `Browser` hands out independent `PageSession`s (tabs). Everything the
//! crawler does to the site goes through the small set of primitives on
//! `PageSession`, addressed by `Locator`s.

pub mod chromium;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;

/// How to find elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector, all matches in document order.
    Css(String),
    /// Inputs carrying this placeholder.
    Placeholder(String),
    /// Leaf elements whose trimmed text equals this string.
    Text(String),
    /// Buttons whose trimmed text equals this string.
    Button(String),
    /// Elements with this `aria-label`.
    Label(String),
    /// Listing rows (`rows` selector) whose `column`-th `cells` match renders
    /// exactly `text`.
    Row {
        rows: String,
        cells: String,
        column: usize,
        text: String,
    },
    /// Matches of a CSS selector inside each match of the parent.
    Descendant(Box<Locator>, String),
    /// The n-th match of the inner locator.
    Nth(Box<Locator>, usize),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn find(self, selector: impl Into<String>) -> Self {
        Locator::Descendant(Box::new(self), selector.into())
    }

    pub fn nth(self, index: usize) -> Self {
        Locator::Nth(Box::new(self), index)
    }

    /// Compile to a JavaScript expression evaluating to an array of elements.
    pub fn to_js(&self) -> String {
        match self {
            Locator::Css(sel) => {
                format!("Array.from(document.querySelectorAll({}))", js_str(sel))
            }
            Locator::Placeholder(p) => Locator::Css(format!("[placeholder={}]", js_str(p))).to_js(),
            Locator::Label(l) => Locator::Css(format!("[aria-label={}]", js_str(l))).to_js(),
            Locator::Text(t) => format!(
                "Array.from(document.querySelectorAll('body *')).filter(e => e.children.length === 0 && e.textContent.trim() === {})",
                js_str(t)
            ),
            Locator::Button(name) => format!(
                "Array.from(document.querySelectorAll('button, [role=button]')).filter(e => e.innerText.trim() === {})",
                js_str(name)
            ),
            Locator::Row {
                rows,
                cells,
                column,
                text,
            } => format!(
                "Array.from(document.querySelectorAll({})).filter(r => {{ const c = r.querySelectorAll({})[{}]; return !!c && c.innerText === {}; }})",
                js_str(rows),
                js_str(cells),
                column,
                js_str(text)
            ),
            Locator::Descendant(parent, sel) => format!(
                "({}).flatMap(p => Array.from(p.querySelectorAll({})))",
                parent.to_js(),
                js_str(sel)
            ),
            Locator::Nth(inner, n) => format!("[({})[{}]].filter(Boolean)", inner.to_js(), n),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css={}", sel),
            Locator::Placeholder(p) => write!(f, "placeholder={}", p),
            Locator::Text(t) => write!(f, "text={}", t),
            Locator::Button(b) => write!(f, "button={}", b),
            Locator::Label(l) => write!(f, "label={}", l),
            Locator::Row { column, text, .. } => write!(f, "row[{}]={}", column, text),
            Locator::Descendant(parent, sel) => write!(f, "{} >> {}", parent, sel),
            Locator::Nth(inner, n) => write!(f, "{} >> nth={}", inner, n),
        }
    }
}

/// JSON string literals are valid JavaScript string literals.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// A browser engine able to open independent tabs.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_session(&self) -> Result<Box<dyn PageSession>>;
    async fn shutdown(&self) -> Result<()>;
}

/// One interactive browsing context.
#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// Block until the page has stopped issuing network requests.
    async fn wait_for_network_idle(&mut self) -> Result<()>;
    /// Wait until at least one element matches. `false` if none appeared.
    async fn wait_for(&mut self, target: &Locator) -> Result<bool>;
    /// Click the first match. `false` if nothing matched.
    async fn click(&mut self, target: &Locator) -> Result<bool>;
    async fn count(&mut self, target: &Locator) -> Result<usize>;
    /// Rendered text of the first match, `None` if nothing matched.
    async fn inner_text(&mut self, target: &Locator) -> Result<Option<String>>;
    async fn close(self: Box<Self>) -> Result<()>;
}
