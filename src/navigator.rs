use tracing::debug;

use crate::config::{MarketType, SiteLayout};
use crate::error::{CrawlError, CrawlResult};
use crate::session::{Locator, PageSession};

/// Fill in the inquiry form for (year, market) and wait for the result table.
///
/// Every control is required; a missing one fails the whole step.
pub async fn open_listing(
    session: &mut dyn PageSession,
    layout: &SiteLayout,
    year: &str,
    market_type: MarketType,
) -> CrawlResult<()> {
    session.goto(&layout.url).await?;
    session.wait_for_network_idle().await?;

    // Dismiss anything that grabbed focus on load
    click(session, Locator::css("body")).await?;
    click(session, Locator::Placeholder(layout.market_placeholder.clone())).await?;
    click(session, Locator::Text(market_type.label().to_string())).await?;
    click(session, Locator::Placeholder(layout.year_placeholder.clone())).await?;
    click(session, Locator::Text(year.to_string())).await?;
    click(session, Locator::Button(layout.query_button.clone())).await?;

    session.wait_for_network_idle().await?;
    let body = Locator::css(layout.table_body.clone());
    if !session.wait_for(&body).await? {
        return Err(CrawlError::control(body.to_string()));
    }
    debug!("listing ready for {} {}", year, market_type.label());
    Ok(())
}

async fn click(session: &mut dyn PageSession, target: Locator) -> CrawlResult<()> {
    if session.click(&target).await? {
        Ok(())
    } else {
        Err(CrawlError::control(target.to_string()))
    }
}
