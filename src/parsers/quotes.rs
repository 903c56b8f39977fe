//! Daily quotes and the instrument catalog.
//!
//! Four dialects share one entry point and are told apart by their first
//! line: two third-party CSVs, the B3 fixed-width daily file (COTAHIST) and
//! the B3 instrument catalog.

use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use super::sinks::{CodeSink, QuoteSink};
use super::{ParseStats, RowSpinner};
use crate::codec::{dates, decode_latin1, parse_decimal};
use crate::error::{Error, Result};
use crate::models::{StockCode, StockQuote};

const ALPHA_HEADER: &str = "timestamp,open,high,low,close,volume";
const YAHOO_HEADER: &str = "Date,Open,High,Low,Close,Adj Close,Volume";
const B3_DAILY_PREFIX: &str = "00COTAHIST.";
const B3_CATALOG_PREFIX: &str = "RptDt;TckrSymb;Asst;AsstDesc;SgmtNm;MktNm;SctyCtgyNm;XprtnDt;";

/// COTAHIST record length, excluding the line terminator
pub const B3_LINE_LEN: usize = 245;

/// Standard lot, real-estate funds, ETFs/units and the like
const ACCEPTED_BDI: [&[u8]; 4] = [b"02", b"12", b"13", b"14"];
/// Cash and odd-lot markets
const ACCEPTED_TPMERC: [&[u8]; 2] = [b"010", b"020"];
const ACCEPTED_CATEGORIES: [&str; 3] = ["SHARES", "FUNDS", "UNIT"];

/// Input flavour, detected from the first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `timestamp,open,high,low,close,volume`
    AlphaVantage,
    /// `Date,Open,High,Low,Close,Adj Close,Volume`
    Yahoo,
    B3Daily,
    B3Catalog,
}

impl Dialect {
    pub fn detect(first_line: &str) -> Option<Dialect> {
        let line = first_line.trim_start_matches('\u{feff}').trim_end();
        if line.starts_with(ALPHA_HEADER) {
            Some(Dialect::AlphaVantage)
        } else if line.starts_with(YAHOO_HEADER) {
            Some(Dialect::Yahoo)
        } else if line.starts_with(B3_DAILY_PREFIX) {
            Some(Dialect::B3Daily)
        } else if line.starts_with(B3_CATALOG_PREFIX) {
            Some(Dialect::B3Catalog)
        } else {
            None
        }
    }
}

/// Parses any quote dialect into a quote/code sink
#[derive(Debug, Default)]
pub struct QuoteParser;

impl QuoteParser {
    pub fn new() -> Self {
        Self
    }

    pub async fn parse_file<S>(&self, path: &Path, ticker: Option<&str>, sink: &mut S) -> Result<ParseStats>
    where
        S: QuoteSink + CodeSink + ?Sized,
    {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let stats = self.parse(file, ticker, sink).await?;
        info!(
            "💹 {}: {} linhas, {} novas",
            path.display(),
            stats.rows,
            stats.inserted
        );
        Ok(stats)
    }

    /// `ticker` names the instrument of single-ticker third-party CSVs
    pub async fn parse<R, S>(&self, mut reader: R, ticker: Option<&str>, sink: &mut S) -> Result<ParseStats>
    where
        R: Read,
        S: QuoteSink + CodeSink + ?Sized,
    {
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| Error::io("<quotes>", e))?;

        let first_line = raw
            .split(|b| *b == b'\n')
            .find(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(decode_latin1)
            .unwrap_or_default();
        let dialect = Dialect::detect(&first_line)
            .ok_or_else(|| Error::UnknownFormat(first_line.chars().take(40).collect()))?;
        debug!("dialeto {:?}", dialect);

        match dialect {
            Dialect::B3Daily => parse_b3_daily(&raw, sink).await,
            Dialect::B3Catalog => parse_catalog(&decode_latin1(&raw), sink).await,
            Dialect::AlphaVantage | Dialect::Yahoo => {
                let ticker = ticker
                    .map(|t| t.trim().to_uppercase())
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| Error::InvalidInput("ticker ausente para CSV de cotações".into()))?;
                parse_provider_csv(dialect, &decode_latin1(&raw), &ticker, sink).await
            }
        }
    }
}

fn fixed_point(line: &[u8], range: std::ops::Range<usize>) -> Result<f64> {
    let text = std::str::from_utf8(&line[range.clone()])
        .map_err(|_| Error::InvalidInput(format!("bytes {:?}", range)))?;
    let units: i64 = text
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("número {}", text)))?;
    Ok(units as f64 / 100.0)
}

/// One COTAHIST record; `Ok(None)` for headers, trailers and filtered markets
pub fn parse_b3_line(line: &[u8]) -> Result<Option<StockQuote>> {
    if line.len() != B3_LINE_LEN {
        return Err(Error::InvalidInput(format!("linha com {} bytes", line.len())));
    }
    if &line[0..2] != b"01" {
        return Ok(None);
    }
    if !ACCEPTED_BDI.contains(&&line[10..12]) || !ACCEPTED_TPMERC.contains(&&line[24..27]) {
        return Ok(None);
    }

    let date_text = String::from_utf8_lossy(&line[2..10]);
    let date = dates::parse_compact(&date_text)
        .ok_or_else(|| Error::InvalidInput(format!("data {}", date_text)))?;
    let ticker = String::from_utf8_lossy(&line[12..24]).trim().to_string();
    if ticker.is_empty() {
        return Err(Error::InvalidInput("ticker vazio".into()));
    }

    Ok(Some(StockQuote {
        ticker,
        date,
        open: fixed_point(line, 56..69)?,
        high: fixed_point(line, 69..82)?,
        low: fixed_point(line, 82..95)?,
        close: fixed_point(line, 108..121)?,
        volume: fixed_point(line, 170..188)?,
    }))
}

async fn parse_b3_daily<S>(raw: &[u8], sink: &mut S) -> Result<ParseStats>
where
    S: QuoteSink + ?Sized,
{
    let mut spinner = RowSpinner::new("COTAHIST");
    let mut stats = ParseStats::default();

    for line in raw.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        stats.rows += 1;
        spinner.row();

        match parse_b3_line(line) {
            Ok(Some(quote)) => stats.count(sink.save_quote(&quote).await?),
            Ok(None) => {}
            Err(e) => {
                debug!("linha {} ignorada: {}", stats.rows, e);
                stats.skipped += 1;
            }
        }
    }

    spinner.finish();
    Ok(stats)
}

fn provider_quote(dialect: Dialect, record: &StringRecord, ticker: &str) -> Result<StockQuote> {
    let (expected, close_col, volume_col) = match dialect {
        Dialect::AlphaVantage => (6, 4, 5),
        // Column 5 is the adjusted close
        _ => (7, 4, 6),
    };
    if record.len() != expected {
        return Err(Error::InvalidInput(format!("{} campos", record.len())));
    }

    let date_text = record[0].trim();
    if !dates::is_date(date_text) {
        return Err(Error::InvalidInput(format!("data {}", date_text)));
    }
    let date = dates::parse_iso(date_text)
        .ok_or_else(|| Error::InvalidInput(format!("data {}", date_text)))?;
    let number = |i: usize| {
        parse_decimal(&record[i]).ok_or_else(|| Error::InvalidInput(format!("valor {}", &record[i])))
    };

    Ok(StockQuote {
        ticker: ticker.to_string(),
        date,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(close_col)?,
        volume: number(volume_col)?,
    })
}

async fn parse_provider_csv<S>(dialect: Dialect, text: &str, ticker: &str, sink: &mut S) -> Result<ParseStats>
where
    S: QuoteSink + ?Sized,
{
    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut stats = ParseStats::default();
    for record in reader.records() {
        let record = record?;
        stats.rows += 1;
        match provider_quote(dialect, &record, ticker) {
            Ok(quote) => stats.count(sink.save_quote(&quote).await?),
            Err(e) => {
                debug!("linha {} ignorada: {}", stats.rows, e);
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

async fn parse_catalog<S>(text: &str, sink: &mut S) -> Result<ParseStats>
where
    S: CodeSink + ?Sized,
{
    let start = text.find(B3_CATALOG_PREFIX).unwrap_or(0);
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .has_headers(true)
        .from_reader(text[start..].as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| Error::UnknownFormat(format!("coluna {} ausente", name)))
    };
    let ticker_col = column("TckrSymb")?;
    let segment_col = column("SgmtNm")?;
    let category_col = column("SctyCtgyNm")?;
    let spec_col = column("SpcfctnCd")?;
    let name_col = column("CrpnNm")?;
    let governance_col = column("CorpGovnLvlNm").ok();

    let mut spinner = RowSpinner::new("instrumentos");
    let mut stats = ParseStats::default();

    for record in reader.records() {
        let record = record?;
        stats.rows += 1;
        spinner.row();

        if record.len() < headers.len() {
            stats.skipped += 1;
            continue;
        }
        let get = |i: usize| record.get(i).unwrap_or_default().trim().to_string();

        if get(segment_col) != "CASH" || !ACCEPTED_CATEGORIES.contains(&get(category_col).as_str()) {
            continue;
        }

        let code = StockCode {
            ticker: get(ticker_col),
            company_name: get(name_col),
            specification_code: get(spec_col),
            governance_level: governance_col.map(get).unwrap_or_default(),
        };
        stats.count(sink.save_code(&code).await?);
    }

    spinner.finish();
    Ok(stats)
}
