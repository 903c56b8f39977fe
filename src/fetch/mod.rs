//! Update drivers: download, dedupe, extract, parse and commit.
//!
//! Every source file is ingested inside its own [`Batch`]; its SHA-256 is
//! added to the file ledger in that same transaction, so a file is either
//! fully stored and marked or not at all. Archives are marked once all of
//! their members made it.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{HttpClient, RequestOptions};
use crate::archive::{self, MemberFilter, ScratchDir};
use crate::codec::Clock;
use crate::config::Config;
use crate::database::{Batch, CompanyMap, Store};
use crate::error::{Error, Result};
use crate::models::Period;
use crate::parsers::{sectors, FinancialParser, ParseStats, QuoteParser, ReferenceFormParser};

pub mod fii;
pub mod quotes;
pub mod retry;

pub use fii::FiiFetcher;
pub use quotes::QuoteFetcher;
pub use retry::{retry_with_backoff, retry_years, YearSummary};

const CATALOG_ATTEMPTS: u32 = 3;
const CATALOG_BACKOFF: Duration = Duration::from_secs(2);

/// CVM archive families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Statements(Period),
    ReferenceForm,
}

impl ArchiveKind {
    fn filter(&self) -> MemberFilter {
        match self {
            ArchiveKind::Statements(_) => MemberFilter::cvm(),
            ArchiveKind::ReferenceForm => MemberFilter::reference_form(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArchiveKind::Statements(Period::Annual) => "DFP",
            ArchiveKind::Statements(Period::Quarterly) => "ITR",
            ArchiveKind::ReferenceForm => "FRE",
        }
    }

    /// Archive URL for `year` under the CVM base
    pub fn url(&self, base: &str, year: i32) -> String {
        let base = base.trim_end_matches('/');
        match self {
            ArchiveKind::Statements(Period::Annual) => {
                format!("{}/DFP/DADOS/dfp_cia_aberta_{}.zip", base, year)
            }
            ArchiveKind::Statements(Period::Quarterly) => {
                format!("{}/ITR/DADOS/itr_cia_aberta_{}.zip", base, year)
            }
            ArchiveKind::ReferenceForm => format!("{}/FRE/DADOS/fre_cia_aberta_{}.zip", base, year),
        }
    }
}

/// Outcome of `get --all`
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub annual: YearSummary,
    pub quarterly: YearSummary,
    pub reference: YearSummary,
    pub catalog: Option<ParseStats>,
    pub sectors: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CatalogToken {
    token: String,
}

/// Drives every update against one store
pub struct Orchestrator {
    store: Store,
    http: HttpClient,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(store: Store, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = HttpClient::new(config.http_timeout())?;
        Ok(Self {
            store,
            http,
            config,
            clock,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn fii(&self) -> FiiFetcher {
        FiiFetcher::new(
            self.store.clone(),
            self.http.clone(),
            self.config.clone(),
            Arc::clone(&self.clock),
        )
    }

    pub fn quotes(&self) -> QuoteFetcher {
        QuoteFetcher::new(self.store.clone(), self.http.clone(), self.config.clone())
    }

    /// Years from last year down to the configured floor
    fn years(&self) -> impl Iterator<Item = i32> {
        let last = self.clock.today().year() - 1;
        (self.config.min_year..=last).rev()
    }

    pub async fn update_annual(&self) -> Result<YearSummary> {
        self.update_years(ArchiveKind::Statements(Period::Annual)).await
    }

    pub async fn update_quarterly(&self) -> Result<YearSummary> {
        self.update_years(ArchiveKind::Statements(Period::Quarterly)).await
    }

    /// Run after the statements: unknown companies are skipped
    pub async fn update_reference_form(&self) -> Result<YearSummary> {
        self.update_years(ArchiveKind::ReferenceForm).await
    }

    async fn update_years(&self, kind: ArchiveKind) -> Result<YearSummary> {
        info!("🚀 {}: {} até {}", kind.label(), self.config.min_year, self.clock.today().year() - 1);
        let mut companies = self.store.load_companies().await?;

        let summary = retry_years(self.years(), self.config.max_misses, async |year| {
            self.ingest_year(kind, year, &mut companies).await
        })
        .await?;

        info!(
            "✅ {}: anos {:?}, {} linhas novas",
            kind.label(),
            summary.ingested,
            summary.stats.inserted
        );
        Ok(summary)
    }

    async fn ingest_year(&self, kind: ArchiveKind, year: i32, companies: &mut CompanyMap) -> Result<ParseStats> {
        let url = kind.url(&self.config.cvm_base_url, year);
        let target = self.config.data_dir.join(file_name_of(&url));
        self.http.download(&url, &target, RequestOptions::archive()).await?;
        self.ingest_archive(&target, kind, companies).await
    }

    /// Ingest a downloaded CVM archive; the zip is removed once stored.
    ///
    /// Members already in the ledger are skipped, so a half-ingested archive
    /// resumes where it stopped.
    pub async fn ingest_archive(
        &self,
        zip_path: &Path,
        kind: ArchiveKind,
        companies: &mut CompanyMap,
    ) -> Result<ParseStats> {
        let digest = archive::digest_file(zip_path)?;
        if self.store.seen(&digest).await? {
            info!("⏭️ {} já processado", zip_path.display());
            remove_file(zip_path);
            return Ok(ParseStats::default());
        }

        let scratch = ScratchDir::new(scratch_path(zip_path));
        let mut members = archive::extract(zip_path, scratch.path(), &kind.filter())?;
        members.sort();

        let mut total = ParseStats::default();
        let mut first_error = None;
        for member in &members {
            match self.ingest_member(member, kind, companies).await {
                Ok(stats) => total.merge(stats),
                Err(e) => {
                    // Ids handed out for this file were never stored
                    *companies = self.store.load_companies().await?;
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!("⚠️ {}: {}", member.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        self.store.mark_seen(&digest).await?;
        remove_file(zip_path);
        Ok(total)
    }

    async fn ingest_member(&self, path: &Path, kind: ArchiveKind, companies: &mut CompanyMap) -> Result<ParseStats> {
        let digest = archive::digest_file(path)?;
        let mut batch = self.store.begin().await?;
        if batch.seen(&digest).await? {
            return Ok(ParseStats::default());
        }

        let stats = match kind {
            ArchiveKind::Statements(period) => {
                FinancialParser::new(period, companies)
                    .parse_file(path, &mut batch)
                    .await?
            }
            ArchiveKind::ReferenceForm => {
                ReferenceFormParser::new(companies)
                    .parse_file(path, &mut batch)
                    .await?
            }
        };

        finish(batch, &digest).await?;
        Ok(stats)
    }

    /// B3 instrument catalog for `date`, through the token handshake
    pub async fn update_catalog(&self, date: NaiveDate) -> Result<ParseStats> {
        let base = self.config.b3_files_url.trim_end_matches('/');
        let options = RequestOptions::small(self.config.http_timeout());
        let token_url = format!(
            "{}/api/download/requestname?fileName=InstrumentsConsolidatedFile&date={}",
            base,
            date.format("%Y-%m-%d")
        );

        let body = retry_with_backoff(CATALOG_ATTEMPTS, CATALOG_BACKOFF, async || {
            let reply: CatalogToken = self.http.get_json(&token_url, options).await?;
            let url = format!("{}/api/download/?token={}", base, reply.token);
            self.http.get_bytes(&url, RequestOptions::archive()).await
        })
        .await?;

        let digest = archive::digest_bytes(&body);
        if self.store.seen(&digest).await? {
            info!("⏭️ cadastro de instrumentos de {} já processado", date);
            return Ok(ParseStats::default());
        }

        let mut batch = self.store.begin().await?;
        let stats = QuoteParser::new()
            .parse(Cursor::new(body), None, &mut batch)
            .await?;
        finish(batch, &digest).await?;

        info!("✅ cadastro: {} códigos novos", stats.inserted);
        Ok(stats)
    }

    /// Sector spreadsheet to `<data_dir>/setores.yml`
    pub async fn update_sectors(&self) -> Result<PathBuf> {
        let url = &self.config.sectors_url;
        let zip_path = self.config.data_dir.join(file_name_of(url));
        self.http.download(url, &zip_path, RequestOptions::archive()).await?;

        let scratch = ScratchDir::new(scratch_path(&zip_path));
        let workbook = archive::extract(&zip_path, scratch.path(), &MemberFilter::spreadsheet())?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnknownFormat(format!("planilha em {}", zip_path.display())))?;

        let document = sectors::parse_workbook(&workbook)?;
        let target = self.config.data_dir.join("setores.yml");
        sectors::write_yaml(&document, &target)?;
        remove_file(&zip_path);

        info!("✅ setores em {}", target.display());
        Ok(target)
    }

    /// Statements, reference form, instrument catalog and sectors
    pub async fn update_all(&self) -> Result<UpdateReport> {
        let mut report = UpdateReport {
            annual: self.update_annual().await?,
            quarterly: self.update_quarterly().await?,
            reference: self.update_reference_form().await?,
            ..UpdateReport::default()
        };

        match self.update_catalog(self.clock.today()).await {
            Ok(stats) => report.catalog = Some(stats),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("⚠️ cadastro de instrumentos: {}", e),
        }
        match self.update_sectors().await {
            Ok(path) => report.sectors = Some(path),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("⚠️ setores: {}", e),
        }

        Ok(report)
    }
}

/// Mark `digest` and commit; the mark is only visible with the rows
async fn finish(mut batch: Batch, digest: &str) -> Result<()> {
    batch.mark_seen(digest).await?;
    batch.commit().await?;
    Ok(())
}

/// Ingest a COTAHIST daily archive into the quote table
pub(crate) async fn ingest_quote_archive(store: &Store, zip_path: &Path) -> Result<ParseStats> {
    let digest = archive::digest_file(zip_path)?;
    if store.seen(&digest).await? {
        remove_file(zip_path);
        return Ok(ParseStats::default());
    }

    let scratch = ScratchDir::new(scratch_path(zip_path));
    let members = archive::extract(zip_path, scratch.path(), &MemberFilter::cotahist())?;
    if members.is_empty() {
        return Err(Error::UnknownFormat(format!("{} sem COTAHIST", zip_path.display())));
    }

    let parser = QuoteParser::new();
    let mut batch = store.begin().await?;
    let mut total = ParseStats::default();
    for member in &members {
        total.merge(parser.parse_file(member, None, &mut batch).await?);
    }
    finish(batch, &digest).await?;
    remove_file(zip_path);
    Ok(total)
}

fn file_name_of(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|name| name.split('?').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip")
        .to_string()
}

fn scratch_path(zip_path: &Path) -> PathBuf {
    let mut name = zip_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".d");
    zip_path.with_file_name(name)
}

fn remove_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("não foi possível remover {}: {}", path.display(), e);
    }
}
