//! Market data operations: candles, rates, and the instrument catalog.
//!
//! The catalog endpoint has no server-side search, so lookups fetch the
//! whole list (through the response cache) and filter client-side, with
//! pagination simulated over the filtered matches. Items that fail to
//! decode are skipped with a warning rather than failing the whole call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use crate::broker::client::BrokerClient;
use crate::broker::models::{
    Candle, CandleResponse, Instrument, InstrumentSearchResponse, Rate, RatesResponse,
};
use crate::error::BrokerError;

const CATALOG_PATH: &str = "/market-data/instruments";

/// Candle intervals accepted by the history endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleInterval {
    OneMinute,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    #[default]
    OneDay,
    OneWeek,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "OneMinute",
            CandleInterval::FiveMinutes => "FiveMinutes",
            CandleInterval::TenMinutes => "TenMinutes",
            CandleInterval::FifteenMinutes => "FifteenMinutes",
            CandleInterval::ThirtyMinutes => "ThirtyMinutes",
            CandleInterval::OneHour => "OneHour",
            CandleInterval::FourHours => "FourHours",
            CandleInterval::OneDay => "OneDay",
            CandleInterval::OneWeek => "OneWeek",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sort direction for candle history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// Fetch OHLCV history for one instrument.
///
/// `count` must be between 1 and 1000; the endpoint nests candles per
/// instrument, so the response is flattened into a single list.
pub async fn get_candles(
    client: &BrokerClient,
    instrument_id: i64,
    interval: CandleInterval,
    count: u32,
    direction: Direction,
) -> Result<Vec<Candle>, BrokerError> {
    if !(1..=1000).contains(&count) {
        return Err(BrokerError::InvalidCandleCount(count));
    }

    let path = format!(
        "/market-data/instruments/{instrument_id}/history/candles/{}/{}/{count}",
        direction.as_str(),
        interval.as_str(),
    );
    let body = client.get(&path).await?;
    let parsed: CandleResponse = serde_json::from_value(body)?;

    let mut candles = Vec::new();
    for per_instrument in parsed.candles {
        candles.extend(per_instrument.candles);
    }
    Ok(candles)
}

/// The full raw instrument catalog, served through the response cache.
pub async fn get_instrument_catalog(
    client: &BrokerClient,
) -> Result<Vec<Map<String, Value>>, BrokerError> {
    let body = client.get_cached(CATALOG_PATH).await?;
    let parsed: InstrumentSearchResponse = serde_json::from_value(body)?;
    Ok(parsed.items)
}

fn decode_item(item: &Map<String, Value>) -> Option<Instrument> {
    match serde_json::from_value(Value::Object(item.clone())) {
        Ok(instrument) => Some(instrument),
        Err(err) => {
            warn!(
                instrument_id = ?item.get("instrumentID"),
                symbol = ?item.get("symbolFull"),
                error = %err,
                "instrument failed to decode, skipping"
            );
            None
        }
    }
}

fn filter_matches(items: &[Map<String, Value>], query: &str) -> Vec<Instrument> {
    let query_lower = query.to_lowercase();
    items
        .iter()
        .filter(|item| {
            let symbol = item.get("symbolFull").and_then(Value::as_str).unwrap_or("");
            let name = item
                .get("instrumentDisplayName")
                .and_then(Value::as_str)
                .unwrap_or("");
            symbol.to_lowercase().contains(&query_lower)
                || name.to_lowercase().contains(&query_lower)
        })
        .filter_map(decode_item)
        .collect()
}

fn paginate<T>(mut matches: Vec<T>, page_size: u32, page_number: u32) -> Vec<T> {
    let start = (page_number as usize - 1) * page_size as usize;
    if start >= matches.len() {
        return Vec::new();
    }
    let end = (start + page_size as usize).min(matches.len());
    matches.drain(..start);
    matches.truncate(end - start);
    matches
}

/// Search instruments by symbol or display name substring.
pub async fn search_instruments(
    client: &BrokerClient,
    query: &str,
    page_size: u32,
    page_number: u32,
) -> Result<Vec<Instrument>, BrokerError> {
    if page_size < 1 || page_number < 1 {
        return Err(BrokerError::InvalidPage);
    }

    let items = get_instrument_catalog(client).await?;
    let matches = filter_matches(&items, query);
    Ok(paginate(matches, page_size, page_number))
}

/// Resolve an exact ticker symbol (case-insensitive) to an instrument.
pub async fn get_instrument_by_symbol(
    client: &BrokerClient,
    symbol: &str,
) -> Result<Instrument, BrokerError> {
    let items = get_instrument_catalog(client).await?;
    let symbol_upper = symbol.to_uppercase();

    for item in &items {
        let candidate = item.get("symbolFull").and_then(Value::as_str).unwrap_or("");
        if candidate.to_uppercase() == symbol_upper {
            if let Some(instrument) = decode_item(item) {
                return Ok(instrument);
            }
        }
    }
    Err(BrokerError::InstrumentNotFound(symbol.to_string()))
}

/// Current bid/ask rates for the given instruments.
///
/// An empty id list short-circuits without touching the network.
pub async fn get_rates(
    client: &BrokerClient,
    instrument_ids: &[i64],
) -> Result<Vec<Rate>, BrokerError> {
    if instrument_ids.is_empty() {
        return Ok(Vec::new());
    }

    let csv = instrument_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let body = client
        .get_with_params("/market-data/instruments/rates", &[("instrumentIds", csv)])
        .await?;
    let parsed: RatesResponse = serde_json::from_value(body)?;
    Ok(parsed.rates)
}
