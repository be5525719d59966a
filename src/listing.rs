use tracing::info;

use crate::config::SiteLayout;
use crate::error::{CrawlError, CrawlResult};
use crate::record::Record;
use crate::session::{Locator, PageSession};

/// Read (code, name) from every row of the result table, in page order.
pub async fn scan_listing(
    session: &mut dyn PageSession,
    layout: &SiteLayout,
    year: &str,
    market_type: &str,
) -> CrawlResult<Vec<Record>> {
    let rows = Locator::css(layout.rows.clone());
    let row_count = session.count(&rows).await?;

    let mut records = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let row = rows.clone().nth(i);
        let code = read_cell(session, &row, layout, layout.code_column).await?;
        let name = read_cell(session, &row, layout, layout.name_column).await?;
        records.push(Record::new(code, name, year, market_type));
    }

    info!("Found {} companies", records.len());
    Ok(records)
}

async fn read_cell(
    session: &mut dyn PageSession,
    row: &Locator,
    layout: &SiteLayout,
    column: usize,
) -> CrawlResult<String> {
    let cell = row.clone().find(layout.cells.clone()).nth(column);
    session
        .inner_text(&cell)
        .await?
        .ok_or_else(|| CrawlError::control(cell.to_string()))
}
