//! FII document index, dividend reports and fund descriptors.

use serde::Deserialize;
use std::collections::HashMap;

use crate::codec::{cnpj_digits, dates, parse_brl};
use crate::error::{Error, Result};
use crate::models::{FiiDetails, FiiDividend};

/// Answer of the document gateway search
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentIndex {
    #[serde(default)]
    pub data: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub id: i64,
    #[serde(default)]
    pub descricao_fundo: String,
    #[serde(default)]
    pub tipo_documento: String,
    #[serde(default)]
    pub situacao_documento: String,
}

impl DocumentIndex {
    /// Ids of active documents, in gateway order
    pub fn active_ids(&self) -> Vec<i64> {
        self.data
            .iter()
            .filter(|entry| entry.situacao_documento == "A")
            .map(|entry| entry.id)
            .collect()
    }
}

/// Envelope of the funds gateway descriptor call
#[derive(Debug, Clone, Deserialize)]
pub struct DetailsEnvelope {
    #[serde(rename = "detailFund")]
    pub detail_fund: Option<FiiDetails>,
}

impl DetailsEnvelope {
    pub fn into_details(self, code: &str) -> Result<FiiDetails> {
        let mut details = self
            .detail_fund
            .ok_or_else(|| Error::NotFound(format!("FII {}", code)))?;
        if let Some(digits) = cnpj_digits(&details.cnpj) {
            details.cnpj = digits;
        }
        details.acronym = details.acronym.trim().to_uppercase();
        details.trading_code = details.trading_code.trim().to_uppercase();
        Ok(details)
    }
}

/// Label -> value map of a report page. Cells alternate label, value;
/// the first occurrence of a label wins.
pub fn report_map<'a, I>(rows: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let mut map = HashMap::new();
    for cells in rows {
        for pair in cells.chunks(2) {
            if let [label, value] = pair {
                map.entry(label.trim().to_string())
                    .or_insert_with(|| value.trim().to_string());
            }
        }
    }
    map
}

/// Value of the first label starting with `prefix`
fn lookup<'m>(map: &'m HashMap<String, String>, prefix: &str) -> Option<&'m str> {
    if let Some(value) = map.get(prefix) {
        return Some(value.as_str());
    }
    let mut hits: Vec<(&String, &String)> = map.iter().filter(|(k, _)| k.starts_with(prefix)).collect();
    hits.sort();
    hits.first().map(|(_, v)| v.as_str())
}

/// Build a dividend from a scraped report. `fallback_code` is used when the
/// page omits the trading code.
pub fn dividend_from_report(map: &HashMap<String, String>, fallback_code: &str) -> Result<FiiDividend> {
    let cnpj = lookup(map, "CNPJ do Fundo")
        .and_then(cnpj_digits)
        .ok_or_else(|| Error::InvalidInput("CNPJ do Fundo".into()))?;

    let base_text = lookup(map, "Data-base").unwrap_or_default();
    let base_date = dates::parse_br(base_text)
        .ok_or_else(|| Error::InvalidInput(format!("Data-base {}", base_text)))?;

    let value_text = lookup(map, "Valor do provento por cota").unwrap_or_default();
    let value = parse_brl(value_text)
        .ok_or_else(|| Error::InvalidInput(format!("valor {}", value_text)))?;

    let trading_code = lookup(map, "Código de negociação")
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| fallback_code.trim().to_uppercase());

    Ok(FiiDividend {
        cnpj,
        trading_code,
        release_date: lookup(map, "Data da Informação").and_then(dates::parse_br),
        base_date,
        ex_date: dates::next_weekday(base_date),
        payment_date: lookup(map, "Data do pagamento").and_then(dates::parse_br),
        value,
        reference_period: lookup(map, "Período de referência")
            .unwrap_or_default()
            .to_string(),
        year: lookup(map, "Ano").and_then(|y| y.trim().parse().ok()),
    })
}
