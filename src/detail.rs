use tracing::warn;

use crate::config::{MatchBy, SiteLayout};
use crate::error::{CrawlError, CrawlResult};
use crate::record::Record;
use crate::session::{Locator, PageSession};

/// The listing row for `record`, addressed the same way the scanner read it.
fn row_locator<'a>(layout: &SiteLayout, match_by: MatchBy, record: &'a Record) -> (Locator, &'a String) {
    let (column, key) = match match_by {
        MatchBy::Code => (layout.code_column, &record.code),
        MatchBy::Name => (layout.name_column, &record.name),
    };
    let row = Locator::Row {
        rows: layout.rows.clone(),
        cells: layout.cells.clone(),
        column,
        text: key.clone(),
    };
    (row, key)
}

/// Open the record's detail panel, read its body, close it again.
///
/// The session must be on the listing view and is left there on success.
pub async fn extract_report(
    session: &mut dyn PageSession,
    layout: &SiteLayout,
    match_by: MatchBy,
    record: &Record,
) -> CrawlResult<String> {
    // Locate
    let (row, key) = row_locator(layout, match_by, record);
    match session.count(&row).await? {
        0 => return Err(CrawlError::RowNotFound { key: key.clone() }),
        1 => {}
        n => warn!("{} rows match '{}', using the first", n, key),
    }

    // Open
    let control = row
        .find(layout.detail_control.clone())
        .nth(layout.detail_control_index);
    if !session.click(&control).await? {
        return Err(CrawlError::control(control.to_string()));
    }

    // Read
    let body = Locator::css(layout.overlay_body.clone());
    let report = session
        .inner_text(&body)
        .await?
        .ok_or_else(|| CrawlError::control(body.to_string()))?;

    // Close
    let close = Locator::Label(layout.close_label.clone());
    if !session.click(&close).await? {
        return Err(CrawlError::control(close.to_string()));
    }

    Ok(report)
}
