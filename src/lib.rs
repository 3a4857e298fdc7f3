pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod types;

pub use broker::{BrokerClient, CandleInterval, Direction, ResponseCache};
pub use config::AppConfig;
pub use error::{BrokerError, FolioError, PipelineError, Result, StoreError};
pub use pipeline::{InstrumentFailure, MarketGateway, Pipeline, RunSummary};
pub use store::{connect, Datastore, MemDatastore, Record, RecordId, SelectTarget};
pub use types::{Action, AssetClass, Conviction, RunType};
