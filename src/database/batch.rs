//! One transaction per source file, with reusable inserts per record kind.
//!
//! sqlx keeps each query string as a persistent prepared statement on the
//! connection, so the `INSERT` constants below are the prepared handles:
//! they are parsed once and re-bound for every row.

use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;

use crate::error::Result;
use crate::models::{
    Company, FiiDetails, FiiDividend, FinancialFact, Period, ReferenceFormFact, StockCode,
    StockQuote,
};
use crate::parsers::sinks::{CodeSink, CompanySink, FactSink, FiiSink, QuoteSink};

/// A row that knows its own idempotent insert
#[async_trait]
pub trait Record: Sync {
    /// Insert ignoring key conflicts; `true` when a row was written
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool>;
}

const INSERT_COMPANY: &str = "INSERT OR IGNORE INTO companies (id, cnpj, name) VALUES (?, ?, ?)";

const INSERT_DFP: &str = r#"
    INSERT OR IGNORE INTO dfp (
        id, company_id, year, data_type, account_code, group_tag, currency, scale,
        period_start, period_end, version, raw_code, raw_description, value
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_ITR: &str = r#"
    INSERT OR IGNORE INTO itr (
        id, company_id, year, data_type, account_code, group_tag, currency, scale,
        period_start, period_end, version, raw_code, raw_description, value
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_FRE: &str = r#"
    INSERT OR IGNORE INTO fre (id, company_id, year, version, total_shares, free_float)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const INSERT_QUOTE: &str = r#"
    INSERT OR IGNORE INTO stock_quotes (ticker, date, open, high, low, close, volume)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_CODE: &str = r#"
    INSERT OR IGNORE INTO stock_codes (ticker, company_name, specification_code, governance_level)
    VALUES (?, ?, ?, ?)
"#;

const INSERT_FII_DETAILS: &str = r#"
    INSERT OR IGNORE INTO fii_details (
        cnpj, acronym, trading_name, trading_code, trading_code_others,
        classification, company_name, website, manager_name
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_FII_DIVIDEND: &str = r#"
    INSERT OR IGNORE INTO fii_dividends (
        trading_code, base_date, cnpj, release_date, ex_date, payment_date,
        value, reference_period, year
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_LEDGER: &str = r#"
    INSERT OR IGNORE INTO file_ledger (digest, seen_at)
    VALUES (?, CAST(strftime('%s', 'now') AS INTEGER))
"#;

#[async_trait]
impl Record for Company {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_COMPANY)
            .bind(self.id)
            .bind(&self.cnpj)
            .bind(&self.name)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for FinancialFact {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let sql = match self.period {
            Period::Annual => INSERT_DFP,
            Period::Quarterly => INSERT_ITR,
        };
        let result = sqlx::query(sql)
            .bind(i64::from(self.id))
            .bind(self.company_id)
            .bind(self.year)
            .bind(&self.data_type)
            .bind(i64::from(self.account_code))
            .bind(&self.group_tag)
            .bind(&self.currency)
            .bind(self.scale.as_str())
            .bind(self.period_start)
            .bind(self.period_end)
            .bind(self.version)
            .bind(&self.raw_code)
            .bind(&self.raw_description)
            .bind(self.value)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for ReferenceFormFact {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_FRE)
            .bind(i64::from(self.id))
            .bind(self.company_id)
            .bind(self.year)
            .bind(self.version)
            .bind(self.total_shares)
            .bind(self.free_float_ratio)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for StockQuote {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_QUOTE)
            .bind(&self.ticker)
            .bind(self.date)
            .bind(self.open)
            .bind(self.high)
            .bind(self.low)
            .bind(self.close)
            .bind(self.volume)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for StockCode {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_CODE)
            .bind(&self.ticker)
            .bind(&self.company_name)
            .bind(&self.specification_code)
            .bind(&self.governance_level)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for FiiDetails {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_FII_DETAILS)
            .bind(&self.cnpj)
            .bind(&self.acronym)
            .bind(&self.trading_name)
            .bind(&self.trading_code)
            .bind(&self.trading_code_others)
            .bind(&self.classification)
            .bind(&self.company_name)
            .bind(&self.website)
            .bind(&self.manager_name)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Record for FiiDividend {
    async fn insert(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let result = sqlx::query(INSERT_FII_DIVIDEND)
            .bind(&self.trading_code)
            .bind(self.base_date)
            .bind(&self.cnpj)
            .bind(self.release_date)
            .bind(self.ex_date)
            .bind(self.payment_date)
            .bind(self.value)
            .bind(&self.reference_period)
            .bind(self.year)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Row counters of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub inserted: u64,
    pub ignored: u64,
}

/// Open write transaction. Dropping it without `commit` rolls back.
pub struct Batch {
    tx: Transaction<'static, Sqlite>,
    stats: BatchStats,
}

impl Batch {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            tx,
            stats: BatchStats::default(),
        }
    }

    pub async fn insert<R: Record + ?Sized>(&mut self, record: &R) -> Result<bool> {
        let written = record.insert(&mut *self.tx).await?;
        if written {
            self.stats.inserted += 1;
        } else {
            self.stats.ignored += 1;
        }
        Ok(written)
    }

    /// Ledger lookup inside this transaction
    pub async fn seen(&mut self, digest: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM file_ledger WHERE digest = ?")
            .bind(digest)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    /// Record `digest` as ingested; becomes visible only on commit
    pub async fn mark_seen(&mut self, digest: &str) -> Result<()> {
        sqlx::query(INSERT_LEDGER)
            .bind(digest)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub async fn commit(self) -> Result<BatchStats> {
        self.tx.commit().await?;
        debug!(
            "commit: {} inseridas, {} ignoradas",
            self.stats.inserted, self.stats.ignored
        );
        Ok(self.stats)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl QuoteSink for Batch {
    async fn save_quote(&mut self, quote: &StockQuote) -> Result<bool> {
        self.insert(quote).await
    }
}

#[async_trait]
impl CodeSink for Batch {
    async fn save_code(&mut self, code: &StockCode) -> Result<bool> {
        self.insert(code).await
    }
}

#[async_trait]
impl CompanySink for Batch {
    async fn upsert_company(&mut self, company: &Company) -> Result<bool> {
        self.insert(company).await
    }
}

#[async_trait]
impl FactSink for Batch {
    async fn save_fact(&mut self, fact: &FinancialFact) -> Result<bool> {
        self.insert(fact).await
    }

    async fn save_reference(&mut self, fact: &ReferenceFormFact) -> Result<bool> {
        self.insert(fact).await
    }
}

#[async_trait]
impl FiiSink for Batch {
    async fn save_fii_details(&mut self, details: &FiiDetails) -> Result<bool> {
        self.insert(details).await
    }

    async fn save_fii_dividend(&mut self, dividend: &FiiDividend) -> Result<bool> {
        self.insert(dividend).await
    }
}
