//! Ingestion core for Brazilian company filings, B3 quotes and FII data.

pub mod api;
pub mod archive;
pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod fetch;
pub mod models;
pub mod parsers;

pub use config::Config;
pub use database::Store;
pub use error::{Error, Result};
pub use fetch::Orchestrator;
