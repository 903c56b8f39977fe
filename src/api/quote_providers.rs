use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tracing::debug;

use super::{HttpClient, RequestOptions};
use crate::error::{Error, Result};

/// Third-party daily quote source returning one of the CSV dialects the
/// quote parser understands
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw CSV covering at least `date` for `ticker`
    async fn fetch_csv(&self, http: &HttpClient, ticker: &str, date: NaiveDate) -> Result<String>;
}

/// "A" provider: `timestamp,open,high,low,close,volume`
pub struct AlphaVantageProvider {
    base_url: String,
    api_key: String,
    options: RequestOptions,
}

impl AlphaVantageProvider {
    pub fn new(base_url: &str, api_key: &str, options: RequestOptions) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            options,
        }
    }

    fn url(&self, ticker: &str) -> String {
        let mut url = format!("{}/query", self.base_url);
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("function", "TIME_SERIES_DAILY")
            .append_pair("symbol", &format!("{}.SAO", ticker))
            .append_pair("outputsize", "full")
            .append_pair("datatype", "csv")
            .append_pair("apikey", &self.api_key)
            .finish();
        url.push('?');
        url.push_str(&query);
        url
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    async fn fetch_csv(&self, http: &HttpClient, ticker: &str, _date: NaiveDate) -> Result<String> {
        let body = http.get_text(&self.url(ticker), self.options).await?;
        // Errors come back as JSON with HTTP 200
        if body.trim_start().starts_with('{') {
            debug!("alphavantage respondeu com erro JSON para {}", ticker);
            return Err(Error::NotFound(format!("{} via {}", ticker, self.name())));
        }
        Ok(body)
    }
}

/// "Y" provider: `Date,Open,High,Low,Close,Adj Close,Volume`
pub struct YahooProvider {
    base_url: String,
    options: RequestOptions,
}

impl YahooProvider {
    pub fn new(base_url: &str, options: RequestOptions) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        }
    }

    fn url(&self, ticker: &str, date: NaiveDate) -> Option<String> {
        let from = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
        let to = (date + Days::new(1)).and_hms_opt(0, 0, 0)?.and_utc().timestamp();
        Some(format!(
            "{}/v7/finance/download/{}.SA?period1={}&period2={}&interval=1d&events=history",
            self.base_url, ticker, from, to
        ))
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_csv(&self, http: &HttpClient, ticker: &str, date: NaiveDate) -> Result<String> {
        let url = self
            .url(ticker, date)
            .ok_or_else(|| Error::InvalidInput(format!("data {}", date)))?;
        http.get_text(&url, self.options).await
    }
}
