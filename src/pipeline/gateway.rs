//! Gateway seam between the pipeline and the brokerage API.
//!
//! The pipeline only ever talks to this trait, so tests can stand in a
//! scripted gateway without any network plumbing.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::broker::client::BrokerClient;
use crate::broker::market_data::{get_candles, get_instrument_catalog, CandleInterval, Direction};
use crate::broker::models::{Candle, PortfolioResponse};
use crate::broker::portfolio::get_portfolio;
use crate::error::BrokerError;

/// Everything the ingest pipeline needs from the brokerage API.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Current portfolio with P&L.
    async fn fetch_portfolio(&self) -> Result<PortfolioResponse, BrokerError>;

    /// The full raw instrument catalog.
    async fn fetch_instrument_catalog(&self) -> Result<Vec<Map<String, Value>>, BrokerError>;

    /// Recent candle history for one instrument, newest first.
    async fn fetch_candles(
        &self,
        instrument_id: i64,
        interval: CandleInterval,
        count: u32,
    ) -> Result<Vec<Candle>, BrokerError>;
}

#[async_trait]
impl MarketGateway for BrokerClient {
    async fn fetch_portfolio(&self) -> Result<PortfolioResponse, BrokerError> {
        get_portfolio(self).await
    }

    async fn fetch_instrument_catalog(&self) -> Result<Vec<Map<String, Value>>, BrokerError> {
        get_instrument_catalog(self).await
    }

    async fn fetch_candles(
        &self,
        instrument_id: i64,
        interval: CandleInterval,
        count: u32,
    ) -> Result<Vec<Candle>, BrokerError> {
        get_candles(self, instrument_id, interval, count, Direction::Desc).await
    }
}
