//! CVM statement (DFP/ITR) and reference-form (FRE) CSVs.
//!
//! Files are `;`-separated Latin-1 without quoting; descriptions may carry
//! stray `"` characters, so quoting is disabled.

use csv::{ByteRecord, ReaderBuilder};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::accounts::account_code;
use super::sinks::FactSink;
use super::{field, Columns, ParseStats, RowSpinner};
use crate::codec::{cnpj_digits, dates, fold, parse_decimal, Fnv1a32, KeyHasher};
use crate::database::CompanyMap;
use crate::error::{Error, Result};
use crate::models::{FinancialFact, Period, ReferenceFormFact, Scale, Statement};

/// Quarterly spans outside this range are year-to-date accumulations
const QUARTER_DAYS: std::ops::RangeInclusive<i64> = 80..=100;

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b';')
        .quoting(false)
        .flexible(true)
        .has_headers(false)
        .from_reader(reader)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::io(path, e))
}

struct StatementColumns {
    cnpj: usize,
    name: usize,
    start: Option<usize>,
    end: usize,
    version: usize,
    currency: usize,
    scale: usize,
    code: usize,
    description: usize,
    value: usize,
    group: usize,
    order: Option<usize>,
}

impl StatementColumns {
    fn discover(columns: &Columns) -> Result<Self> {
        Ok(Self {
            cnpj: columns.require("CNPJ_CIA")?,
            name: columns.require("DENOM_CIA")?,
            start: columns.get("DT_INI_EXERC"),
            end: columns.require("DT_FIM_EXERC")?,
            version: columns.require("VERSAO")?,
            currency: columns.require("MOEDA")?,
            scale: columns.require("ESCALA_MOEDA")?,
            code: columns.require("CD_CONTA")?,
            description: columns.require("DS_CONTA")?,
            value: columns.require("VL_CONTA")?,
            group: columns.require("GRUPO_DFP")?,
            order: columns.get("ORDEM_EXERC"),
        })
    }
}

/// Turns DFP/ITR statement CSVs into [`FinancialFact`]s
pub struct FinancialParser<'a> {
    period: Period,
    companies: &'a mut CompanyMap,
    hasher: Fnv1a32,
}

impl<'a> FinancialParser<'a> {
    pub fn new(period: Period, companies: &'a mut CompanyMap) -> Self {
        Self {
            period,
            companies,
            hasher: Fnv1a32::new(),
        }
    }

    /// Parse one extracted member; the statement kind comes from its name
    pub async fn parse_file<S>(&mut self, path: &Path, sink: &mut S) -> Result<ParseStats>
    where
        S: FactSink + ?Sized,
    {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let statement = Statement::from_file_name(&name)
            .ok_or_else(|| Error::UnknownFormat(format!("demonstrativo de {}", name)))?;

        let stats = self.parse(open(path)?, statement, sink).await?;
        info!(
            "📊 {}: {} linhas, {} novas, {} repetidas",
            name, stats.rows, stats.inserted, stats.duplicates
        );
        Ok(stats)
    }

    pub async fn parse<R, S>(&mut self, reader: R, statement: Statement, sink: &mut S) -> Result<ParseStats>
    where
        R: Read,
        S: FactSink + ?Sized,
    {
        let mut csv = csv_reader(reader);
        let mut record = ByteRecord::new();
        if !csv.read_byte_record(&mut record)? {
            return Ok(ParseStats::default());
        }
        let header = Columns::from_header(&record);
        let cols = StatementColumns::discover(&header)?;

        let data_type = statement.data_type(self.period);
        let check_span = self.period == Period::Quarterly && !statement.is_balance_sheet();
        let mut spinner = RowSpinner::new(&data_type);
        let mut stats = ParseStats::default();

        while csv.read_byte_record(&mut record)? {
            stats.rows += 1;
            spinner.row();

            if record.len() < header.width() {
                stats.skipped += 1;
                continue;
            }

            match self.fact(&record, &cols, &data_type, check_span) {
                Ok(Some(fact)) => stats.count(sink.save_fact(&fact).await?),
                Ok(None) => {}
                Err(Error::AccumulatedQuarterly { .. }) => stats.accumulated += 1,
                Err(e) if e.is_soft() => {
                    debug!("linha {} ignorada: {}", stats.rows + 1, e);
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for company in self.companies.take_pending() {
            sink.upsert_company(&company).await?;
        }
        spinner.finish();

        if stats.accumulated > 0 {
            debug!("{} linhas acumuladas descartadas", stats.accumulated);
        }
        Ok(stats)
    }

    /// One row to a fact; `Ok(None)` for comparative-period rows
    fn fact(
        &mut self,
        record: &ByteRecord,
        cols: &StatementColumns,
        data_type: &str,
        check_span: bool,
    ) -> Result<Option<FinancialFact>> {
        let raw_cnpj = field(record, cols.cnpj);
        let cnpj = cnpj_digits(&raw_cnpj)
            .ok_or_else(|| Error::InvalidInput(format!("CNPJ {}", raw_cnpj)))?;
        let company_id = self.companies.observe(&cnpj, &field(record, cols.name));

        if let Some(order) = cols.order {
            if fold(&field(record, order)) == "penultimo" {
                return Ok(None);
            }
        }

        let end_text = field(record, cols.end);
        let year = dates::year_of(&end_text)
            .filter(|_| dates::is_date(&end_text))
            .ok_or_else(|| Error::InvalidInput(format!("DT_FIM_EXERC {}", end_text)))?;
        let end = dates::parse_iso(&end_text)
            .ok_or_else(|| Error::InvalidInput(format!("DT_FIM_EXERC {}", end_text)))?;

        let start = cols
            .start
            .map(|i| field(record, i))
            .and_then(|text| dates::parse_iso(&text));

        if check_span {
            let start = start.ok_or_else(|| Error::InvalidInput("DT_INI_EXERC".into()))?;
            let days = (end - start).num_days();
            if !QUARTER_DAYS.contains(&days) {
                return Err(Error::AccumulatedQuarterly { days });
            }
        }

        let raw_code = field(record, cols.code);
        let raw_description = field(record, cols.description);
        let value_text = field(record, cols.value);
        let value = parse_decimal(&value_text)
            .ok_or_else(|| Error::InvalidInput(format!("VL_CONTA {}", value_text)))?;
        let version_text = field(record, cols.version);
        let version = version_text.parse::<i64>().unwrap_or(1);
        let group_tag = field(record, cols.group);

        let id = self.hasher.key(&[
            cnpj.as_str(),
            group_tag.as_str(),
            end_text.as_str(),
            version_text.as_str(),
            raw_code.as_str(),
            value_text.as_str(),
        ]);

        Ok(Some(FinancialFact {
            id,
            company_id,
            year,
            period: self.period,
            data_type: data_type.to_string(),
            account_code: account_code(&mut self.hasher, &raw_code, &raw_description),
            group_tag,
            currency: field(record, cols.currency),
            scale: Scale::parse(&field(record, cols.scale)),
            period_start: start.and_then(dates::unix_of),
            period_end: dates::unix_of(end).unwrap_or_default(),
            version,
            raw_code,
            raw_description,
            value,
        }))
    }
}

/// Turns `fre_cia_aberta_distribuicao_capital_*.csv` into free-float facts.
///
/// Only companies already known from statement ingestion are kept.
pub struct ReferenceFormParser<'a> {
    companies: &'a CompanyMap,
    hasher: Fnv1a32,
}

impl<'a> ReferenceFormParser<'a> {
    pub fn new(companies: &'a CompanyMap) -> Self {
        Self {
            companies,
            hasher: Fnv1a32::new(),
        }
    }

    pub async fn parse_file<S>(&mut self, path: &Path, sink: &mut S) -> Result<ParseStats>
    where
        S: FactSink + ?Sized,
    {
        let stats = self.parse(open(path)?, sink).await?;
        info!(
            "📊 {}: {} linhas, {} novas, {} sem empresa",
            path.display(),
            stats.rows,
            stats.inserted,
            stats.skipped
        );
        Ok(stats)
    }

    pub async fn parse<R, S>(&mut self, reader: R, sink: &mut S) -> Result<ParseStats>
    where
        R: Read,
        S: FactSink + ?Sized,
    {
        let mut csv = csv_reader(reader);
        let mut record = ByteRecord::new();
        if !csv.read_byte_record(&mut record)? {
            return Ok(ParseStats::default());
        }
        let header = Columns::from_header(&record);
        let cnpj_col = header.require("CNPJ_Companhia")?;
        let date_col = header.require("Data_Referencia")?;
        let version_col = header.require("Versao")?;
        let shares_col = header.require("Quantidade_Total_Acoes_Circulacao")?;
        let ratio_col = header.require("Percentual_Total_Acoes_Circulacao")?;

        let mut spinner = RowSpinner::new("FRE");
        let mut stats = ParseStats::default();

        while csv.read_byte_record(&mut record)? {
            stats.rows += 1;
            spinner.row();

            let raw_cnpj = field(&record, cnpj_col);
            let Some(company_id) = cnpj_digits(&raw_cnpj).and_then(|c| self.companies.id_of(&c)) else {
                debug!("{}", Error::CompanyUnknown(raw_cnpj));
                stats.skipped += 1;
                continue;
            };

            let date_text = field(&record, date_col);
            let Some(year) = dates::year_of(&date_text) else {
                stats.skipped += 1;
                continue;
            };
            let version_text = field(&record, version_col);
            let free_float = parse_decimal(&field(&record, ratio_col)).unwrap_or(0.0) / 100.0;
            let circulating = parse_decimal(&field(&record, shares_col)).unwrap_or(0.0);
            let total_shares = if free_float > 0.0 {
                circulating / free_float
            } else {
                0.0
            };

            if !(0.0..=1.0).contains(&free_float) {
                warn!("free float fora do intervalo para {}: {}", raw_cnpj, free_float);
                stats.skipped += 1;
                continue;
            }

            let fact = ReferenceFormFact {
                id: self.hasher.key(&[raw_cnpj.as_str(), date_text.as_str(), version_text.as_str()]),
                company_id,
                year,
                version: version_text.parse().unwrap_or(1),
                total_shares,
                free_float_ratio: free_float,
            };
            stats.count(sink.save_reference(&fact).await?);
        }

        spinner.finish();
        Ok(stats)
    }
}
