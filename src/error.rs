//! Error kinds shared by fetchers, parsers and the store.
//!
//! Hard errors abort the current source file; soft errors are logged and the
//! offending row or record is skipped. Display strings are the user-facing
//! message, hence Portuguese.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("falha de rede em {url}: {source}")]
    NetworkFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("não encontrado: {0}")]
    NotFound(String),

    #[error("falha de E/S em {path}: {source}")]
    IoFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("arquivo compactado inválido: {0}")]
    CorruptArchive(String),

    #[error("formato desconhecido: {0}")]
    UnknownFormat(String),

    #[error("ITR acumulado ignorado ({days} dias)")]
    AccumulatedQuarterly { days: i64 },

    #[error("empresa desconhecida: {0}")]
    CompanyUnknown(String),

    #[error("registro duplicado: {0}")]
    DuplicateRow(String),

    #[error("versão de esquema divergente para {table}: {found} != {expected}")]
    SchemaMismatch {
        table: String,
        found: i64,
        expected: i64,
    },

    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    #[error("erro no banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    #[error("erro de CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("erro de ZIP: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("erro de YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("erro na planilha: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("operação cancelada")]
    Cancelled,
}

impl Error {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::IoFailed {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::NetworkFailed {
            url: url.into(),
            source,
        }
    }

    /// Soft errors skip a row or record; they never abort a file.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::AccumulatedQuarterly { .. }
                | Self::CompanyUnknown(_)
                | Self::DuplicateRow(_)
                | Self::InvalidInput(_)
        )
    }

    /// Errors the year loop counts against its miss budget.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::NetworkFailed { .. } | Self::NotFound(_))
    }

    /// Errors that end the whole update rather than the current year.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
