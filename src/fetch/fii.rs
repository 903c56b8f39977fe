//! FII descriptors and dividend reports from the B3 gateways.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{HttpClient, RequestOptions};
use crate::codec::Clock;
use crate::config::Config;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::FiiDetails;
use crate::parsers::fii::{dividend_from_report, report_map, DetailsEnvelope, DocumentIndex};
use crate::parsers::scraper::{ScrapeEvent, Scraper};
use crate::parsers::{FiiSink, ParseStats};

/// "Rendimentos e Amortizações" in the document gateway taxonomy
const DOCUMENT_CATEGORY: u32 = 14;
const DOCUMENT_TYPE: u32 = 41;
const FUND_TYPE: u32 = 7;

/// Ledger key of a scraped document
pub fn document_key(id: i64) -> String {
    format!("fii-doc:{}", id)
}

/// Report being collected while its page's events arrive
struct OpenDocument {
    id: i64,
    rows: Vec<Vec<String>>,
    fetched: bool,
}

pub struct FiiFetcher {
    store: Store,
    http: HttpClient,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl FiiFetcher {
    pub fn new(store: Store, http: HttpClient, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            http,
            config,
            clock,
        }
    }

    fn small(&self) -> RequestOptions {
        RequestOptions::small(self.config.http_timeout())
    }

    /// Descriptor URL; the selector travels as base64 JSON in the path
    pub fn details_url(&self, code: &str) -> String {
        let acronym: String = code.trim().to_uppercase().chars().take(4).collect();
        let selector = serde_json::json!({
            "typeFund": FUND_TYPE,
            "cnpj": "0",
            "identifierFund": acronym,
        });
        format!(
            "{}/fundsProxy/fundsCall/GetDetailFundSIG/{}",
            self.config.b3_funds_url.trim_end_matches('/'),
            STANDARD.encode(selector.to_string())
        )
    }

    /// Document search URL for the last `months` reports of `cnpj`
    pub fn index_url(&self, cnpj: &str, months: usize) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("d", "1")
            .append_pair("s", "0")
            .append_pair("l", &months.to_string())
            .append_pair("o[0][dataEntrega]", "desc")
            .append_pair("cnpjFundo", cnpj)
            .append_pair("idCategoriaDocumento", &DOCUMENT_CATEGORY.to_string())
            .append_pair("idTipoDocumento", &DOCUMENT_TYPE.to_string())
            .append_pair("idEspecieDocumento", "0")
            .append_pair("_", &self.clock.now_millis().to_string())
            .finish();
        format!(
            "{}/fnet/publico/pesquisarGerenciadorDocumentosDados?{}",
            self.config.fnet_url.trim_end_matches('/'),
            query
        )
    }

    pub fn document_url(&self, id: i64) -> String {
        format!(
            "{}/fnet/publico/exibirDocumento?id={}&cvm=true",
            self.config.fnet_url.trim_end_matches('/'),
            id
        )
    }

    /// Stored descriptor, fetched and stored on first use
    pub async fn details(&self, code: &str) -> Result<FiiDetails> {
        match self.store.fii_details(code).await {
            Ok(details) => return Ok(details),
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let envelope: DetailsEnvelope = self.http.get_json(&self.details_url(code), self.small()).await?;
        let details = envelope.into_details(code)?;

        let mut batch = self.store.begin().await?;
        batch.save_fii_details(&details).await?;
        batch.commit().await?;
        info!("🏢 {} ({})", details.trading_code, details.company_name);
        Ok(details)
    }

    /// Scrape the dividend reports of the last `months` months for `code`
    pub async fn dividends(&self, code: &str, months: usize) -> Result<ParseStats> {
        let details = self.details(code).await?;
        // The gateway's certificate chain does not validate
        let insecure = self.small().without_tls_verification();

        let index: DocumentIndex = self
            .http
            .get_json(&self.index_url(&details.cnpj, months), insecure)
            .await?;

        let mut stats = ParseStats::default();
        let mut ids_by_url = HashMap::new();
        for id in index.active_ids() {
            if self.store.seen(&document_key(id)).await? {
                stats.duplicates += 1;
                continue;
            }
            ids_by_url.insert(self.document_url(id), id);
        }
        let mut urls: Vec<String> = ids_by_url.keys().cloned().collect();
        urls.sort_by_key(|url| std::cmp::Reverse(ids_by_url[url]));

        let mut scraper = Scraper::new(&self.http, insecure, urls);
        let mut open: Option<OpenDocument> = None;

        while let Some(event) = scraper.next().await {
            match event {
                ScrapeEvent::Request { url } => {
                    if let Some(done) = open.take() {
                        self.store_report(done, code, &mut stats).await?;
                    }
                    if let Some(id) = ids_by_url.get(&url) {
                        open = Some(OpenDocument {
                            id: *id,
                            rows: Vec::new(),
                            fetched: false,
                        });
                    }
                }
                ScrapeEvent::Response { url, bytes } => {
                    debug!("{}: {} bytes", url, bytes);
                    if let Some(doc) = open.as_mut() {
                        doc.fetched = true;
                    }
                }
                ScrapeEvent::Element { cells, .. } => {
                    if let Some(doc) = open.as_mut() {
                        doc.rows.push(cells);
                    }
                }
                ScrapeEvent::Error { url, error } => {
                    warn!("⚠️ {}: {}", url, error);
                    if error.is_fatal() {
                        return Err(error);
                    }
                }
            }
        }
        if let Some(done) = open.take() {
            self.store_report(done, code, &mut stats).await?;
        }

        info!(
            "💰 {}: {} proventos novos, {} já conhecidos",
            code, stats.inserted, stats.duplicates
        );
        Ok(stats)
    }

    /// Store one scraped report with its ledger entry. A page that yields no
    /// dividend is left out of the ledger and fetched again on the next run.
    async fn store_report(&self, doc: OpenDocument, code: &str, stats: &mut ParseStats) -> Result<()> {
        if !doc.fetched {
            return Ok(());
        }
        stats.rows += 1;

        let dividend = match dividend_from_report(&report_map(&doc.rows), code) {
            Ok(dividend) => dividend,
            Err(e) => {
                warn!("⚠️ documento {} sem provento legível: {}", doc.id, e);
                stats.skipped += 1;
                return Ok(());
            }
        };

        let mut batch = self.store.begin().await?;
        if batch.save_fii_dividend(&dividend).await? {
            stats.inserted += 1;
        } else {
            stats.duplicates += 1;
        }
        batch.mark_seen(&document_key(doc.id)).await?;
        batch.commit().await?;
        Ok(())
    }
}
