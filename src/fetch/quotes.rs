//! Closing prices with a source fallback chain.
//!
//! Order: local store, B3 daily archive for the date, then the third-party
//! providers. Every stage stores what it fetched and the store is asked
//! again, so later calls for the same day are local.

use chrono::NaiveDate;
use std::io::Cursor;
use tracing::{debug, info, warn};

use crate::api::{AlphaVantageProvider, HttpClient, QuoteProvider, RequestOptions, YahooProvider};
use crate::config::Config;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::parsers::QuoteParser;

pub struct QuoteFetcher {
    store: Store,
    http: HttpClient,
    config: Config,
    providers: Vec<Box<dyn QuoteProvider>>,
}

impl QuoteFetcher {
    /// The "A" provider joins the chain only when an API key is configured
    pub fn new(store: Store, http: HttpClient, config: Config) -> Self {
        let options = RequestOptions::small(config.http_timeout());
        let mut providers: Vec<Box<dyn QuoteProvider>> = Vec::new();
        if let Some(key) = &config.api_key {
            providers.push(Box::new(AlphaVantageProvider::new(
                &config.alpha_vantage_url,
                key,
                options,
            )));
        }
        providers.push(Box::new(YahooProvider::new(&config.yahoo_url, options)));

        Self {
            store,
            http,
            config,
            providers,
        }
    }

    pub fn cotahist_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/InstDados/SerHist/COTAHIST_D{}.ZIP",
            self.config.b3_base_url.trim_end_matches('/'),
            date.format("%d%m%Y")
        )
    }

    /// Closing price of `ticker` on `date`
    pub async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<f64> {
        let ticker = ticker.trim().to_uppercase();
        if let Some(close) = self.lookup(&ticker, date).await? {
            return Ok(close);
        }

        match self.fetch_daily_archive(date).await {
            Ok(()) => {
                if let Some(close) = self.lookup(&ticker, date).await? {
                    return Ok(close);
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("COTAHIST de {}: {}", date, e),
        }

        for provider in &self.providers {
            match self.fetch_provider(provider.as_ref(), &ticker, date).await {
                Ok(()) => {
                    if let Some(close) = self.lookup(&ticker, date).await? {
                        return Ok(close);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("⚠️ {} via {}: {}", ticker, provider.name(), e),
            }
        }

        Err(Error::NotFound(format!("cotação de {} em {}", ticker, date)))
    }

    async fn lookup(&self, ticker: &str, date: NaiveDate) -> Result<Option<f64>> {
        match self.store.quote(ticker, date).await {
            Ok(close) => Ok(Some(close)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_daily_archive(&self, date: NaiveDate) -> Result<()> {
        let url = self.cotahist_url(date);
        let target = self
            .config
            .data_dir
            .join(format!("COTAHIST_D{}.ZIP", date.format("%d%m%Y")));
        // B3 serves these files with an incomplete certificate chain
        let options = RequestOptions::archive().without_tls_verification();
        self.http.download(&url, &target, options).await?;

        let stats = super::ingest_quote_archive(&self.store, &target).await?;
        info!("💹 COTAHIST {}: {} cotações novas", date, stats.inserted);
        Ok(())
    }

    async fn fetch_provider(&self, provider: &dyn QuoteProvider, ticker: &str, date: NaiveDate) -> Result<()> {
        let csv = provider.fetch_csv(&self.http, ticker, date).await?;

        let mut batch = self.store.begin().await?;
        let stats = QuoteParser::new()
            .parse(Cursor::new(csv.into_bytes()), Some(ticker), &mut batch)
            .await?;
        batch.commit().await?;

        info!("💹 {} via {}: {} cotações novas", ticker, provider.name(), stats.inserted);
        Ok(())
    }
}
