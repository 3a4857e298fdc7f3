use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PipelineError;

/// Which of the two daily runs a pipeline invocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    MarketOpen,
    MarketClose,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::MarketOpen => "market_open",
            RunType::MarketClose => "market_close",
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = PipelineError;

    /// Case-sensitive: `"Market_Open"` is rejected, only the exact
    /// lowercase tags are valid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market_open" => Ok(RunType::MarketOpen),
            "market_close" => Ok(RunType::MarketClose),
            other => Err(PipelineError::InvalidRunType(other.to_string())),
        }
    }
}

/// Asset class of an instrument, derived from the brokerage type id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Stocks,
    #[serde(rename = "ETF")]
    Etf,
    Crypto,
    Forex,
    Commodities,
    Other,
}

impl AssetClass {
    /// Map the brokerage's numeric instrument type id to an asset class.
    pub fn from_type_id(type_id: i64) -> Self {
        match type_id {
            5 => AssetClass::Stocks,
            6 => AssetClass::Etf,
            10 => AssetClass::Crypto,
            1 => AssetClass::Forex,
            4 => AssetClass::Commodities,
            _ => AssetClass::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stocks => "Stocks",
            AssetClass::Etf => "ETF",
            AssetClass::Crypto => "Crypto",
            AssetClass::Forex => "Forex",
            AssetClass::Commodities => "Commodities",
            AssetClass::Other => "Other",
        }
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended action attached to a recommendation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Reduce,
    Increase,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
            Action::Reduce => "reduce",
            Action::Increase => "increase",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conviction level attached to a recommendation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conviction {
    High,
    Medium,
    Low,
}

impl Conviction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conviction::High => "high",
            Conviction::Medium => "medium",
            Conviction::Low => "low",
        }
    }
}

impl std::fmt::Display for Conviction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
