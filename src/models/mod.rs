use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Listed company, keyed by CNPJ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub cnpj: String,
    pub name: String,
}

/// Storage bucket of a financial filing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// DFP
    Annual,
    /// ITR
    Quarterly,
}

impl Period {
    pub fn table(&self) -> &'static str {
        match self {
            Period::Annual => "dfp",
            Period::Quarterly => "itr",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Annual => write!(f, "annual"),
            Period::Quarterly => write!(f, "quarterly"),
        }
    }
}

/// Financial statement kinds published by CVM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statement {
    /// Balance sheet, assets
    Bpa,
    /// Balance sheet, liabilities and equity
    Bpp,
    /// Income statement
    Dre,
    /// Cash flow, direct method
    DfcMd,
    /// Cash flow, indirect method
    DfcMi,
    /// Value added
    Dva,
}

impl Statement {
    pub const ALL: [Statement; 6] = [
        Statement::Bpa,
        Statement::Bpp,
        Statement::Dre,
        Statement::DfcMd,
        Statement::DfcMi,
        Statement::Dva,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Statement::Bpa => "BPA",
            Statement::Bpp => "BPP",
            Statement::Dre => "DRE",
            Statement::DfcMd => "DFC_MD",
            Statement::DfcMi => "DFC_MI",
            Statement::Dva => "DVA",
        }
    }

    /// Storage data type: quarterly kinds carry an `_ITR` suffix
    pub fn data_type(&self, period: Period) -> String {
        match period {
            Period::Annual => self.code().to_string(),
            Period::Quarterly => format!("{}_ITR", self.code()),
        }
    }

    /// Balance sheets are point-in-time and never accumulated
    pub fn is_balance_sheet(&self) -> bool {
        matches!(self, Statement::Bpa | Statement::Bpp)
    }

    /// Identify the statement from a CVM member name such as
    /// `dfp_cia_aberta_DFC_MI_con_2020.csv`
    pub fn from_file_name(name: &str) -> Option<Statement> {
        let lower = name.to_lowercase();
        // Longest tokens first so `_dfc_md_` is not mistaken for another kind
        [
            ("_dfc_md_", Statement::DfcMd),
            ("_dfc_mi_", Statement::DfcMi),
            ("_bpa_", Statement::Bpa),
            ("_bpp_", Statement::Bpp),
            ("_dre_", Statement::Dre),
            ("_dva_", Statement::Dva),
        ]
        .into_iter()
        .find(|(token, _)| lower.contains(token))
        .map(|(_, statement)| statement)
    }
}

/// Currency scale reported in `ESCALA_MOEDA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    Unit,
    Thousand,
}

impl Scale {
    pub fn parse(raw: &str) -> Scale {
        if raw.trim().eq_ignore_ascii_case("MIL") {
            Scale::Thousand
        } else {
            Scale::Unit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Unit => "unit",
            Scale::Thousand => "thousand",
        }
    }
}

/// One line item of a CVM statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialFact {
    pub id: u32,
    pub company_id: i64,
    pub year: i32,
    pub period: Period,
    pub data_type: String,
    pub account_code: u32,
    pub group_tag: String,
    pub currency: String,
    pub scale: Scale,
    pub period_start: Option<i64>,
    pub period_end: i64,
    pub version: i64,
    pub raw_code: String,
    pub raw_description: String,
    pub value: f64,
}

/// Free float and share count derived from the reference form (FRE)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFormFact {
    pub id: u32,
    pub company_id: i64,
    pub year: i32,
    pub version: i64,
    pub total_shares: f64,
    pub free_float_ratio: f64,
}

/// Daily quote for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ticker entry from the B3 instrument catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCode {
    pub ticker: String,
    pub company_name: String,
    pub specification_code: String,
    pub governance_level: String,
}

/// Descriptor of a real-estate fund as served by the B3 funds gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiiDetails {
    #[serde(default)]
    pub cnpj: String,
    #[serde(default)]
    pub acronym: String,
    #[serde(default)]
    pub trading_name: String,
    #[serde(default)]
    pub trading_code: String,
    #[serde(default)]
    pub trading_code_others: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default, rename = "webSite")]
    pub website: String,
    #[serde(default)]
    pub manager_name: String,
}

/// Dividend announced by a fund for one reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiiDividend {
    pub cnpj: String,
    pub trading_code: String,
    pub release_date: Option<NaiveDate>,
    pub base_date: NaiveDate,
    pub ex_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub value: f64,
    pub reference_period: String,
    pub year: Option<i32>,
}
