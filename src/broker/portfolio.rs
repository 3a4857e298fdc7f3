//! Portfolio and trading history operations.

use chrono::{Duration, Utc};
use tracing::info;

use crate::broker::client::BrokerClient;
use crate::broker::models::{PortfolioResponse, TradingHistoryItem};
use crate::error::BrokerError;

/// Default lookback window for trading history when no start date is given.
const DEFAULT_HISTORY_DAYS: i64 = 90;

/// Fetch the current portfolio with per-position and account-level P&L.
pub async fn get_portfolio(client: &BrokerClient) -> Result<PortfolioResponse, BrokerError> {
    info!("fetching portfolio");
    let body = client.get("/trading/info/real/pnl").await?;
    let portfolio: PortfolioResponse = serde_json::from_value(body)?;
    info!(
        positions = portfolio.client_portfolio.positions.len(),
        credit = portfolio.client_portfolio.credit,
        unrealized_pnl = ?portfolio.client_portfolio.unrealized_pnl,
        "portfolio fetched"
    );
    Ok(portfolio)
}

/// Fetch closed-trade history.
///
/// `min_date` takes `YYYY-MM-DD`; when omitted the window starts 90 days
/// ago. `page` and `page_size` pass straight through when given.
pub async fn get_trading_history(
    client: &BrokerClient,
    min_date: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
) -> Result<Vec<TradingHistoryItem>, BrokerError> {
    let min_date = min_date.unwrap_or_else(|| {
        (Utc::now() - Duration::days(DEFAULT_HISTORY_DAYS))
            .format("%Y-%m-%d")
            .to_string()
    });

    let mut params = vec![("minDate", min_date.clone())];
    if let Some(page) = page {
        params.push(("page", page.to_string()));
    }
    if let Some(page_size) = page_size {
        params.push(("pageSize", page_size.to_string()));
    }

    info!(min_date, ?page, "fetching trading history");
    let body = client
        .get_with_params("/trading/info/trade/history", &params)
        .await?;
    let trades: Vec<TradingHistoryItem> = serde_json::from_value(body)?;
    info!(trades = trades.len(), "trading history fetched");
    Ok(trades)
}
