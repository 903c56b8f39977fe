//! Test stores backed by a temporary directory

use rapina::Store;
use std::path::PathBuf;
use tempfile::TempDir;

/// File-backed store that disappears with the test
pub struct TestStore {
    pub store: Store,
    pub dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Store::open(&dir.path().join("rapina.db"))
            .await
            .expect("open store");
        Self { store, dir }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("rapina.db")
    }

    /// A second handle on the same file, as a new run would open it
    pub async fn reopen(&self) -> Store {
        Store::open(&self.db_path()).await.expect("reopen store")
    }

    /// Scratch directory for downloads next to the database
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

/// Row count of `table`
pub async fn count(store: &Store, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(store.pool())
        .await
        .expect("count rows")
}
