//! Table definitions and their schema versions.
//!
//! Every table is re-derivable from the public sources, so a version bump
//! simply drops and recreates the table.

use sqlx::{Row, SqliteConnection};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Tables managed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Companies,
    Annual,
    Quarterly,
    ReferenceForm,
    StockQuotes,
    StockCodes,
    FiiDetails,
    FiiDividends,
    FileLedger,
}

impl TableKind {
    pub const ALL: [TableKind; 9] = [
        TableKind::Companies,
        TableKind::Annual,
        TableKind::Quarterly,
        TableKind::ReferenceForm,
        TableKind::StockQuotes,
        TableKind::StockCodes,
        TableKind::FiiDetails,
        TableKind::FiiDividends,
        TableKind::FileLedger,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Companies => "companies",
            TableKind::Annual => "dfp",
            TableKind::Quarterly => "itr",
            TableKind::ReferenceForm => "fre",
            TableKind::StockQuotes => "stock_quotes",
            TableKind::StockCodes => "stock_codes",
            TableKind::FiiDetails => "fii_details",
            TableKind::FiiDividends => "fii_dividends",
            TableKind::FileLedger => "file_ledger",
        }
    }

    /// Compiled schema version; bump whenever `create_sql` changes
    pub fn version(&self) -> i64 {
        match self {
            TableKind::Companies => 1,
            TableKind::Annual | TableKind::Quarterly => 3,
            TableKind::ReferenceForm => 2,
            TableKind::StockQuotes => 1,
            TableKind::StockCodes => 2,
            TableKind::FiiDetails => 1,
            TableKind::FiiDividends => 2,
            TableKind::FileLedger => 1,
        }
    }

    fn create_sql(&self) -> String {
        match self {
            TableKind::Companies => r#"
                CREATE TABLE IF NOT EXISTS companies (
                    id INTEGER PRIMARY KEY,
                    cnpj TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL
                )
            "#
            .to_string(),
            TableKind::Annual | TableKind::Quarterly => format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    company_id INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    data_type TEXT NOT NULL,
                    account_code INTEGER NOT NULL,
                    group_tag TEXT NOT NULL,
                    currency TEXT NOT NULL,
                    scale TEXT NOT NULL,
                    period_start INTEGER,
                    period_end INTEGER NOT NULL,
                    version INTEGER NOT NULL,
                    raw_code TEXT NOT NULL,
                    raw_description TEXT NOT NULL,
                    value REAL NOT NULL,
                    UNIQUE (company_id, raw_code, period_end, version)
                )
            "#,
                table = self.name()
            ),
            TableKind::ReferenceForm => r#"
                CREATE TABLE IF NOT EXISTS fre (
                    id INTEGER PRIMARY KEY,
                    company_id INTEGER NOT NULL,
                    year INTEGER NOT NULL,
                    version INTEGER NOT NULL,
                    total_shares REAL NOT NULL,
                    free_float REAL NOT NULL
                )
            "#
            .to_string(),
            TableKind::StockQuotes => r#"
                CREATE TABLE IF NOT EXISTS stock_quotes (
                    ticker TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    PRIMARY KEY (ticker, date)
                )
            "#
            .to_string(),
            TableKind::StockCodes => r#"
                CREATE TABLE IF NOT EXISTS stock_codes (
                    ticker TEXT PRIMARY KEY,
                    company_name TEXT NOT NULL,
                    specification_code TEXT NOT NULL,
                    governance_level TEXT NOT NULL
                )
            "#
            .to_string(),
            TableKind::FiiDetails => r#"
                CREATE TABLE IF NOT EXISTS fii_details (
                    cnpj TEXT PRIMARY KEY,
                    acronym TEXT NOT NULL,
                    trading_name TEXT NOT NULL,
                    trading_code TEXT NOT NULL,
                    trading_code_others TEXT NOT NULL,
                    classification TEXT NOT NULL,
                    company_name TEXT NOT NULL,
                    website TEXT NOT NULL,
                    manager_name TEXT NOT NULL
                )
            "#
            .to_string(),
            TableKind::FiiDividends => r#"
                CREATE TABLE IF NOT EXISTS fii_dividends (
                    trading_code TEXT NOT NULL,
                    base_date TEXT NOT NULL,
                    cnpj TEXT NOT NULL,
                    release_date TEXT,
                    ex_date TEXT NOT NULL,
                    payment_date TEXT,
                    value REAL NOT NULL,
                    reference_period TEXT NOT NULL,
                    year INTEGER,
                    PRIMARY KEY (trading_code, base_date)
                )
            "#
            .to_string(),
            TableKind::FileLedger => r#"
                CREATE TABLE IF NOT EXISTS file_ledger (
                    digest TEXT PRIMARY KEY,
                    seen_at INTEGER NOT NULL
                )
            "#
            .to_string(),
        }
    }
}

pub(crate) async fn create_version_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            table_name TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn stored_version(conn: &mut SqliteConnection, kind: TableKind) -> Result<Option<i64>> {
    let row = sqlx::query("SELECT version FROM schema_versions WHERE table_name = ?")
        .bind(kind.name())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(match row {
        Some(row) => Some(row.try_get("version")?),
        None => None,
    })
}

/// Create `kind` if missing, or drop and recreate it when the stored version
/// differs from the compiled one. Returns whether existing rows were dropped.
pub(crate) async fn ensure(conn: &mut SqliteConnection, kind: TableKind) -> Result<bool> {
    let expected = kind.version();
    let mut recreated = false;

    match stored_version(conn, kind).await? {
        Some(found) if found == expected => {}
        Some(found) => {
            recreated = true;
            let mismatch = Error::SchemaMismatch {
                table: kind.name().to_string(),
                found,
                expected,
            };
            warn!("⚠️ {}; recriando tabela", mismatch);
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", kind.name()))
                .execute(&mut *conn)
                .await?;
        }
        None => info!("🗄️ criando tabela {}", kind.name()),
    }

    sqlx::query(&kind.create_sql()).execute(&mut *conn).await?;

    sqlx::query(
        r#"
        INSERT INTO schema_versions (table_name, version) VALUES (?, ?)
        ON CONFLICT(table_name) DO UPDATE SET version = excluded.version
        "#,
    )
    .bind(kind.name())
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(recreated)
}

/// Forget every ingested file so the next run derives the tables again
pub(crate) async fn clear_ledger(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM file_ledger")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Reporting indices on the statement tables
pub(crate) fn index_statements(create: bool) -> Vec<String> {
    let mut statements = Vec::new();
    for table in [TableKind::Annual.name(), TableKind::Quarterly.name()] {
        let indices = [
            (format!("{}_code_desc_idx", table), "raw_code, raw_description"),
            (format!("{}_desc_idx", table), "raw_description"),
            (format!("{}_period_end_idx", table), "period_end"),
        ];
        for (name, columns) in indices {
            statements.push(if create {
                format!("CREATE INDEX IF NOT EXISTS {} ON {} ({})", name, table, columns)
            } else {
                format!("DROP INDEX IF EXISTS {}", name)
            });
        }
    }
    statements
}
