//! Pipeline Module
//!
//! The fetch pipeline between data consumers and the remote market data
//! source.

mod fetcher;
mod flight;
mod source;

pub use fetcher::{
    FetchCompleted, FetchPipeline, FetchRequest, PendingFetch, PipelineOptions, Submission,
    WarmUpReport,
};
pub use source::{BatchResponse, MarketDataSource};
