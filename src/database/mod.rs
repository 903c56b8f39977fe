//! Embedded SQLite store: schema versions, the file ledger, companies and
//! the transactional batch every ingest runs in.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Company;

pub mod batch;
pub mod queries;
pub mod schema;

pub use batch::{Batch, BatchStats, Record};
pub use queries::{AccountItem, FreeFloat};
pub use schema::TableKind;

/// Ids below this are never assigned automatically
pub const FIRST_COMPANY_ID: i64 = 100;

/// Handle to the store. A single connection serializes every writer.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| crate::error::Error::io(parent, e))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        info!("🗄️ banco de dados em {}", path.display());
        Self::init(pool).await
    }

    /// Private in-memory database; lives as long as the returned store
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        {
            let mut conn = store.pool.acquire().await?;
            schema::create_version_table(&mut conn).await?;
        }
        // The ledger must exist before any data table can invalidate it
        store.ensure_tables(TableKind::FileLedger).await?;
        for kind in TableKind::ALL {
            if kind != TableKind::FileLedger {
                store.ensure_tables(kind).await?;
            }
        }
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent DDL for `kind`; recreates the table on version mismatch.
    /// A recreated data table empties the file ledger, otherwise the files
    /// that filled it would be skipped as already seen.
    pub async fn ensure_tables(&self, kind: TableKind) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if schema::ensure(&mut conn, kind).await? && kind != TableKind::FileLedger {
            let forgotten = schema::clear_ledger(&mut conn).await?;
            warn!("⚠️ {} recriada; {} arquivos serão ingeridos de novo", kind.name(), forgotten);
        }
        Ok(())
    }

    /// Start the transaction of one source file
    pub async fn begin(&self) -> Result<Batch> {
        let tx = self.pool.begin().await?;
        Ok(Batch::new(tx))
    }

    pub async fn seen(&self, digest: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM file_ledger WHERE digest = ?")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn mark_seen(&self, digest: &str) -> Result<()> {
        let mut batch = self.begin().await?;
        batch.mark_seen(digest).await?;
        batch.commit().await?;
        Ok(())
    }

    pub async fn load_companies(&self) -> Result<CompanyMap> {
        let rows = sqlx::query("SELECT id, cnpj, name FROM companies")
            .fetch_all(&self.pool)
            .await?;

        let mut companies = Vec::with_capacity(rows.len());
        for row in rows {
            companies.push(Company {
                id: row.try_get("id")?,
                cnpj: row.try_get("cnpj")?,
                name: row.try_get("name")?,
            });
        }
        debug!("{} empresas carregadas", companies.len());
        Ok(CompanyMap::from_companies(companies))
    }

    /// Merge the companies first seen since the map was loaded
    pub async fn save_companies(&self, map: &mut CompanyMap) -> Result<usize> {
        let mut batch = self.begin().await?;
        let mut saved = 0;
        for company in map.take_pending() {
            if batch.insert(&company).await? {
                saved += 1;
            }
        }
        batch.commit().await?;
        Ok(saved)
    }

    /// Create the reporting indices on the statement tables
    pub async fn create_indices(&self) -> Result<()> {
        for statement in schema::index_statements(true) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!("📇 índices criados");
        Ok(())
    }

    pub async fn drop_indices(&self) -> Result<()> {
        for statement in schema::index_statements(false) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Companies keyed by CNPJ, assigning ids on first sighting
#[derive(Debug, Clone)]
pub struct CompanyMap {
    by_cnpj: HashMap<String, Company>,
    pending: Vec<String>,
    next_id: i64,
}

impl Default for CompanyMap {
    fn default() -> Self {
        Self {
            by_cnpj: HashMap::new(),
            pending: Vec::new(),
            next_id: FIRST_COMPANY_ID,
        }
    }
}

impl CompanyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map of already persisted companies; nothing is pending
    pub fn from_companies(companies: Vec<Company>) -> Self {
        let mut map = Self::new();
        for company in companies {
            map.next_id = map.next_id.max(company.id + 1);
            map.by_cnpj.insert(company.cnpj.clone(), company);
        }
        map
    }

    pub fn get(&self, cnpj: &str) -> Option<&Company> {
        self.by_cnpj.get(cnpj)
    }

    pub fn id_of(&self, cnpj: &str) -> Option<i64> {
        self.by_cnpj.get(cnpj).map(|c| c.id)
    }

    /// Add a company with a known id; it is written on the next save
    pub fn insert(&mut self, company: Company) {
        self.next_id = self.next_id.max(company.id + 1);
        if !self.by_cnpj.contains_key(&company.cnpj) {
            self.pending.push(company.cnpj.clone());
        }
        self.by_cnpj.insert(company.cnpj.clone(), company);
    }

    /// Id for `cnpj`, assigning the next one when the CNPJ is new
    pub fn observe(&mut self, cnpj: &str, name: &str) -> i64 {
        if let Some(company) = self.by_cnpj.get(cnpj) {
            return company.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_cnpj.insert(
            cnpj.to_string(),
            Company {
                id,
                cnpj: cnpj.to_string(),
                name: name.trim().to_string(),
            },
        );
        self.pending.push(cnpj.to_string());
        id
    }

    /// Companies not yet written, in sighting order
    pub fn take_pending(&mut self) -> Vec<Company> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|cnpj| self.by_cnpj.get(&cnpj).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_cnpj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cnpj.is_empty()
    }
}
