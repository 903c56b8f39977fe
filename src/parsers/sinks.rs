//! Capabilities parsers need from storage.
//!
//! Each returns `true` when the record was new and `false` when an identical
//! key was already stored.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Company, FiiDetails, FiiDividend, FinancialFact, ReferenceFormFact, StockCode, StockQuote,
};

#[async_trait]
pub trait QuoteSink: Send {
    async fn save_quote(&mut self, quote: &StockQuote) -> Result<bool>;
}

#[async_trait]
pub trait CodeSink: Send {
    async fn save_code(&mut self, code: &StockCode) -> Result<bool>;
}

#[async_trait]
pub trait CompanySink: Send {
    async fn upsert_company(&mut self, company: &Company) -> Result<bool>;
}

#[async_trait]
pub trait FactSink: CompanySink {
    async fn save_fact(&mut self, fact: &FinancialFact) -> Result<bool>;

    async fn save_reference(&mut self, fact: &ReferenceFormFact) -> Result<bool>;
}

#[async_trait]
pub trait FiiSink: Send {
    async fn save_fii_details(&mut self, details: &FiiDetails) -> Result<bool>;

    async fn save_fii_dividend(&mut self, dividend: &FiiDividend) -> Result<bool>;
}
