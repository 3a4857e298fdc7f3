//! Brokerage REST API: client, wire models, and typed operations.

pub mod cache;
pub mod client;
pub mod market_data;
pub mod models;
pub mod portfolio;

pub use cache::ResponseCache;
pub use client::BrokerClient;
pub use market_data::{
    get_candles, get_instrument_by_symbol, get_instrument_catalog, get_rates,
    search_instruments, CandleInterval, Direction,
};
pub use models::{
    Candle, CandleResponse, ClientPortfolio, Instrument, InstrumentCandles,
    InstrumentSearchResponse, PortfolioResponse, Position, Rate, RatesResponse,
    TradingHistoryItem, UnrealizedPnl,
};
pub use portfolio::{get_portfolio, get_trading_history};
