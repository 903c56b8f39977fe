use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub cvm_base_url: String,
    pub b3_base_url: String,
    pub b3_files_url: String,
    pub fnet_url: String,
    pub b3_funds_url: String,
    pub sectors_url: String,
    pub alpha_vantage_url: String,
    pub yahoo_url: String,
    pub api_key: Option<String>,
    pub min_year: i32,
    pub max_misses: u32,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".data"),
            database_file: "rapina.db".to_string(),
            cvm_base_url: "https://dados.cvm.gov.br/dados/CIA_ABERTA/DOC".to_string(),
            b3_base_url: "https://bvmf.bmfbovespa.com.br".to_string(),
            b3_files_url: "https://arquivos.b3.com.br".to_string(),
            fnet_url: "https://fnet.bmfbovespa.com.br".to_string(),
            b3_funds_url: "https://sistemaswebb3-listados.b3.com.br".to_string(),
            sectors_url: "https://www.b3.com.br/data/files/57/E6/AA/A1/68C7781064456178AC094EA8/ClassifSetorial.zip"
                .to_string(),
            alpha_vantage_url: "https://www.alphavantage.co".to_string(),
            yahoo_url: "https://query1.finance.yahoo.com".to_string(),
            api_key: None,
            min_year: 2010,
            max_misses: 2,
            http_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Self::default();

        Self {
            data_dir: std::env::var("RAPINA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            database_file: env_or("RAPINA_DB_FILE", defaults.database_file),
            cvm_base_url: env_or("RAPINA_CVM_BASE_URL", defaults.cvm_base_url),
            b3_base_url: env_or("RAPINA_B3_BASE_URL", defaults.b3_base_url),
            b3_files_url: env_or("RAPINA_B3_FILES_URL", defaults.b3_files_url),
            fnet_url: env_or("RAPINA_FNET_URL", defaults.fnet_url),
            b3_funds_url: env_or("RAPINA_B3_FUNDS_URL", defaults.b3_funds_url),
            sectors_url: env_or("RAPINA_SECTORS_URL", defaults.sectors_url),
            alpha_vantage_url: env_or("RAPINA_ALPHA_VANTAGE_URL", defaults.alpha_vantage_url),
            yahoo_url: env_or("RAPINA_YAHOO_URL", defaults.yahoo_url),
            api_key: std::env::var("APIKEY").ok().filter(|k| !k.trim().is_empty()),
            min_year: env_parse("RAPINA_MIN_YEAR", defaults.min_year),
            max_misses: env_parse("RAPINA_MAX_MISSES", defaults.max_misses),
            http_timeout_secs: env_parse("RAPINA_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
        }
    }

    /// Path of the embedded database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Connect/read budget for small endpoints
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
