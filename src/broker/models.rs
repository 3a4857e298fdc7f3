//! Wire models for the brokerage REST API.
//!
//! Field names follow the upstream JSON exactly via serde renames. Payloads
//! that end up persisted verbatim (positions, trade history) keep their
//! unknown fields through `#[serde(flatten)]` so nothing is lost between
//! the API and the snapshot table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::AssetClass;

// ==================== Instruments ====================

/// A tradable instrument from the catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(rename = "instrumentID")]
    pub instrument_id: i64,
    #[serde(rename = "symbolFull")]
    pub symbol: String,
    #[serde(rename = "instrumentDisplayName")]
    pub name: String,
    #[serde(rename = "instrumentTypeID")]
    pub instrument_type_id: i64,
    #[serde(rename = "exchangeID", default)]
    pub exchange_id: Option<i64>,
}

impl Instrument {
    /// Asset class derived from the upstream instrument type id.
    pub fn asset_class(&self) -> AssetClass {
        AssetClass::from_type_id(self.instrument_type_id)
    }
}

/// Raw catalog listing; items stay untyped until a caller needs them.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentSearchResponse {
    #[serde(rename = "instrumentDisplayDatas")]
    pub items: Vec<serde_json::Map<String, Value>>,
}

// ==================== Candles ====================

fn default_volume() -> Option<f64> {
    Some(0.0)
}

/// A single OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "instrumentID")]
    pub instrument_id: i64,
    #[serde(rename = "fromDate")]
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default = "default_volume")]
    pub volume: Option<f64>,
}

/// Candles for one instrument as nested in the history response.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentCandles {
    #[serde(rename = "instrumentId")]
    pub instrument_id: i64,
    pub candles: Vec<Candle>,
    #[serde(rename = "rangeOpen")]
    pub range_open: f64,
    #[serde(rename = "rangeClose")]
    pub range_close: f64,
    #[serde(rename = "rangeHigh")]
    pub range_high: f64,
    #[serde(rename = "rangeLow")]
    pub range_low: f64,
    pub volume: f64,
}

/// Response from the candle history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleResponse {
    pub interval: String,
    pub candles: Vec<InstrumentCandles>,
}

// ==================== Rates ====================

/// Current market rate for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rate {
    #[serde(rename = "instrumentID")]
    pub instrument_id: i64,
    pub bid: f64,
    pub ask: f64,
    #[serde(rename = "lastExecution")]
    pub last_execution: f64,
    pub date: DateTime<Utc>,
    #[serde(rename = "conversionRateAsk", default)]
    pub conversion_rate_ask: Option<f64>,
    #[serde(rename = "conversionRateBid", default)]
    pub conversion_rate_bid: Option<f64>,
}

/// Response from the rates endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesResponse {
    pub rates: Vec<Rate>,
}

// ==================== Portfolio ====================

/// Per-position P&L block nested inside a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnrealizedPnl {
    #[serde(rename = "pnL")]
    pub pnl: f64,
    #[serde(rename = "closeRate", default)]
    pub close_rate: Option<f64>,
    #[serde(rename = "closeConversionRate", default)]
    pub close_conversion_rate: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// An open position. Typed fields cover what the pipeline reads; everything
/// else rides along in `extra` and survives into the stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "positionID")]
    pub position_id: i64,
    #[serde(rename = "instrumentID")]
    pub instrument_id: i64,
    #[serde(rename = "openDateTime")]
    pub open_date_time: DateTime<Utc>,
    #[serde(rename = "openRate")]
    pub open_rate: f64,
    #[serde(rename = "isBuy")]
    pub is_buy: bool,
    pub amount: f64,
    pub leverage: i64,
    pub units: f64,
    #[serde(rename = "unrealizedPnL", default)]
    pub unrealized_pnl: Option<UnrealizedPnl>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Portfolio state for the account: open positions plus account-level P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPortfolio {
    pub credit: f64,
    #[serde(rename = "unrealizedPnL", default)]
    pub unrealized_pnl: Option<f64>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub mirrors: Vec<Value>,
    #[serde(default)]
    pub orders: Vec<Value>,
    #[serde(rename = "bonusCredit", default)]
    pub bonus_credit: f64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Response from the P&L endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResponse {
    #[serde(rename = "clientPortfolio")]
    pub client_portfolio: ClientPortfolio,
}

// ==================== Trading history ====================

/// A closed trade from the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingHistoryItem {
    #[serde(rename = "netProfit")]
    pub net_profit: f64,
    #[serde(rename = "closeRate")]
    pub close_rate: f64,
    #[serde(rename = "closeTimestamp")]
    pub close_timestamp: DateTime<Utc>,
    #[serde(rename = "positionId")]
    pub position_id: i64,
    #[serde(rename = "instrumentId")]
    pub instrument_id: i64,
    #[serde(rename = "isBuy")]
    pub is_buy: bool,
    pub leverage: i64,
    #[serde(rename = "openRate")]
    pub open_rate: f64,
    #[serde(rename = "openTimestamp")]
    pub open_timestamp: DateTime<Utc>,
    pub units: f64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}
