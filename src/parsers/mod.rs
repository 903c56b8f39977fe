//! Per-format parsers. Each one turns a source file into records handed to a
//! sink; only the HTML scraper performs requests.

use csv::ByteRecord;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;

use crate::codec::decode_latin1;
use crate::error::{Error, Result};

pub mod accounts;
pub mod cvm;
pub mod fii;
pub mod quotes;
pub mod scraper;
pub mod sectors;
pub mod sinks;

pub use accounts::{canonical_code, classify, Account};
pub use cvm::{FinancialParser, ReferenceFormParser};
pub use quotes::{Dialect, QuoteParser};
pub use sinks::{CodeSink, CompanySink, FactSink, FiiSink, QuoteSink};

/// Rows between spinner updates
pub const PROGRESS_EVERY: u64 = 1000;

const SPINNER_PHASES: [&str; 6] = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"];

/// Outcome of parsing one source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Malformed or unknown-company rows
    pub skipped: u64,
    /// Quarterly rows covering more than one quarter
    pub accumulated: u64,
}

impl ParseStats {
    pub fn merge(&mut self, other: ParseStats) {
        self.rows += other.rows;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.accumulated += other.accumulated;
    }

    fn count(&mut self, written: bool) {
        if written {
            self.inserted += 1;
        } else {
            self.duplicates += 1;
        }
    }
}

/// Six-phase spinner advanced every [`PROGRESS_EVERY`] rows
pub(crate) struct RowSpinner {
    bar: ProgressBar,
    rows: u64,
}

impl RowSpinner {
    pub(crate) fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&[
                    SPINNER_PHASES[0],
                    SPINNER_PHASES[1],
                    SPINNER_PHASES[2],
                    SPINNER_PHASES[3],
                    SPINNER_PHASES[4],
                    SPINNER_PHASES[5],
                    "✓",
                ]),
        );
        bar.set_message(label.to_string());
        Self { bar, rows: 0 }
    }

    pub(crate) fn row(&mut self) {
        self.rows += 1;
        if self.rows % PROGRESS_EVERY == 0 {
            self.bar.tick();
        }
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for RowSpinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Column positions of a delimited header, looked up by name
pub(crate) struct Columns {
    index: HashMap<String, usize>,
    width: usize,
}

impl Columns {
    pub(crate) fn from_header(header: &ByteRecord) -> Self {
        let index = header
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let name = decode_latin1(field);
                (name.trim().trim_start_matches('\u{feff}').to_string(), i)
            })
            .collect();
        Self {
            index,
            width: header.len(),
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn require(&self, name: &str) -> Result<usize> {
        self.get(name)
            .ok_or_else(|| Error::UnknownFormat(format!("coluna {} ausente", name)))
    }
}

/// Field `i` decoded from Latin-1 and trimmed
pub(crate) fn field(record: &ByteRecord, i: usize) -> String {
    record
        .get(i)
        .map(|raw| decode_latin1(raw).trim().to_string())
        .unwrap_or_default()
}
