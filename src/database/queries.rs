//! Read-side contract consumed by reporting.

use chrono::NaiveDate;
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};

use super::{Store, TableKind};
use crate::codec::{self, dates, Clock};
use crate::error::{Error, Result};
use crate::models::{FiiDetails, FiiDividend, Scale};

/// Account line of a company, as filed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountItem {
    pub account_code: u32,
    pub raw_code: String,
    pub raw_description: String,
}

/// Reference-form figures of one company and year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeFloat {
    pub ratio: f64,
    pub total_shares: f64,
}

impl Store {
    /// Distinct company names, ordered ignoring case and accents
    pub async fn list_companies(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = sqlx::query_scalar("SELECT DISTINCT name FROM companies")
            .fetch_all(&self.pool)
            .await?;
        names.sort_by_cached_key(|name| (codec::fold(name), name.clone()));
        Ok(names)
    }

    /// First company (by name) whose name starts with `prefix`
    async fn company_id(&self, prefix: &str) -> Result<i64> {
        let id: Option<i64> = sqlx::query_scalar(
            r"SELECT id FROM companies WHERE name LIKE ? || '%' ESCAPE '\' ORDER BY name LIMIT 1",
        )
        .bind(escape_like(prefix.trim()))
        .fetch_optional(&self.pool)
        .await?;
        id.ok_or_else(|| Error::NotFound(format!("empresa {}", prefix)))
    }

    pub async fn account_items(&self, company_prefix: &str) -> Result<Vec<AccountItem>> {
        let company_id = self.company_id(company_prefix).await?;
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT account_code, raw_code, raw_description
            FROM dfp
            WHERE company_id = ?
            ORDER BY raw_code, raw_description
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let code: i64 = row.try_get("account_code")?;
                Ok(AccountItem {
                    account_code: code as u32,
                    raw_code: row.try_get("raw_code")?,
                    raw_description: row.try_get("raw_description")?,
                })
            })
            .collect()
    }

    /// Annual values of `year` in units, keyed by account code. The highest
    /// filing version wins; within it, the shortest raw code.
    pub async fn account_values(&self, company_prefix: &str, year: i32) -> Result<HashMap<u32, f64>> {
        let company_id = self.company_id(company_prefix).await?;
        let rows = sqlx::query(
            r#"
            SELECT account_code, scale, value
            FROM dfp
            WHERE company_id = ? AND year = ?
            ORDER BY version DESC, length(raw_code), raw_code
            "#,
        )
        .bind(company_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        let mut values = HashMap::new();
        for row in rows {
            let code: i64 = row.try_get("account_code")?;
            let scale: String = row.try_get("scale")?;
            let value: f64 = row.try_get("value")?;
            let multiplier = if scale == Scale::Thousand.as_str() { 1000.0 } else { 1.0 };
            values.entry(code as u32).or_insert(value * multiplier);
        }
        Ok(values)
    }

    /// Closing price of `ticker` on `date`
    pub async fn quote(&self, ticker: &str, date: NaiveDate) -> Result<f64> {
        let close: Option<f64> =
            sqlx::query_scalar("SELECT close FROM stock_quotes WHERE ticker = ? AND date = ?")
                .bind(ticker.trim().to_uppercase())
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;
        close.ok_or_else(|| Error::NotFound(format!("cotação de {} em {}", ticker, date)))
    }

    /// Ticker of the company whose name contains `name` and whose
    /// specification starts with `spec_prefix` (`ON`, `PN`, `UNT`...)
    pub async fn code(&self, name: &str, spec_prefix: &str) -> Result<String> {
        let ticker: Option<String> = sqlx::query_scalar(
            r#"
            SELECT ticker FROM stock_codes
            WHERE company_name LIKE '%' || ? || '%' ESCAPE '\'
              AND specification_code LIKE ? || '%' ESCAPE '\'
            ORDER BY ticker
            LIMIT 1
            "#,
        )
        .bind(escape_like(name.trim()))
        .bind(escape_like(spec_prefix.trim()))
        .fetch_optional(&self.pool)
        .await?;
        ticker.ok_or_else(|| Error::NotFound(format!("código de {} ({})", name, spec_prefix)))
    }

    /// Fund descriptor by acronym (`ALMI`) or trading code (`ALMI11`)
    pub async fn fii_details(&self, code: &str) -> Result<FiiDetails> {
        let code = code.trim().to_uppercase();
        let acronym: String = code.chars().take(4).collect();
        let row = sqlx::query(
            r#"
            SELECT * FROM fii_details
            WHERE acronym = ?1 OR trading_code = ?1 OR acronym = ?2
            ORDER BY trading_code = ?1 DESC
            LIMIT 1
            "#,
        )
        .bind(&code)
        .bind(&acronym)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("FII {}", code)))?;

        Ok(FiiDetails {
            cnpj: row.try_get("cnpj")?,
            acronym: row.try_get("acronym")?,
            trading_name: row.try_get("trading_name")?,
            trading_code: row.try_get("trading_code")?,
            trading_code_others: row.try_get("trading_code_others")?,
            classification: row.try_get("classification")?,
            company_name: row.try_get("company_name")?,
            website: row.try_get("website")?,
            manager_name: row.try_get("manager_name")?,
        })
    }

    /// Dividends of `code` whose base date falls in the last `months` months,
    /// newest first
    pub async fn fii_dividends(&self, clock: &dyn Clock, code: &str, months: usize) -> Result<Vec<FiiDividend>> {
        let Some(oldest) = dates::months_from_today(clock, months).pop() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            r#"
            SELECT * FROM fii_dividends
            WHERE trading_code = ? AND base_date >= ?
            ORDER BY base_date DESC
            "#,
        )
        .bind(code.trim().to_uppercase())
        .bind(format!("{}-01", oldest))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FiiDividend {
                    cnpj: row.try_get("cnpj")?,
                    trading_code: row.try_get("trading_code")?,
                    release_date: row.try_get("release_date")?,
                    base_date: row.try_get("base_date")?,
                    ex_date: row.try_get("ex_date")?,
                    payment_date: row.try_get("payment_date")?,
                    value: row.try_get("value")?,
                    reference_period: row.try_get("reference_period")?,
                    year: row.try_get("year")?,
                })
            })
            .collect()
    }

    /// Free float of the latest reference-form version for `year`
    pub async fn free_float(&self, company_prefix: &str, year: i32) -> Result<FreeFloat> {
        let company_id = self.company_id(company_prefix).await?;
        let row = sqlx::query(
            r#"
            SELECT free_float, total_shares FROM fre
            WHERE company_id = ? AND year = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("free float de {} em {}", company_prefix, year)))?;

        Ok(FreeFloat {
            ratio: row.try_get("free_float")?,
            total_shares: row.try_get("total_shares")?,
        })
    }

    pub async fn list_fii_codes(&self) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT trading_code FROM fii_details WHERE trading_code <> '' ORDER BY trading_code",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Row count of every managed table
    pub async fn counts(&self) -> Result<BTreeMap<&'static str, i64>> {
        let mut counts = BTreeMap::new();
        for kind in TableKind::ALL {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", kind.name()))
                .fetch_one(&self.pool)
                .await?;
            counts.insert(kind.name(), count);
        }
        Ok(counts)
    }
}

/// Make `%` and `_` match themselves in a `LIKE ... ESCAPE '\'` pattern
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
