//! Retry combinators wrapped around fetch steps.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::parsers::ParseStats;

/// What happened across a run of yearly archives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearSummary {
    pub ingested: Vec<i32>,
    pub missed: Vec<i32>,
    /// Years abandoned on a broken archive or file
    pub failed: Vec<i32>,
    pub stats: ParseStats,
}

/// Walk `years` in order, stopping after `max_misses` consecutive misses.
///
/// Misses are `NotFound`/`NetworkFailed`; a success resets the count. Other
/// non-fatal errors abandon only that year. Fatal errors end the walk.
pub async fn retry_years<I, F>(years: I, max_misses: u32, mut attempt: F) -> Result<YearSummary>
where
    I: IntoIterator<Item = i32>,
    F: AsyncFnMut(i32) -> Result<ParseStats>,
{
    let mut summary = YearSummary::default();
    let mut misses = 0;

    for year in years {
        match attempt(year).await {
            Ok(stats) => {
                misses = 0;
                summary.stats.merge(stats);
                summary.ingested.push(year);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if e.is_miss() => {
                misses += 1;
                summary.missed.push(year);
                info!("{}: {} ({}/{})", year, e, misses, max_misses);
                if misses >= max_misses {
                    break;
                }
            }
            Err(e) => {
                warn!("⚠️ {} abandonado: {}", year, e);
                summary.failed.push(year);
            }
        }
    }

    Ok(summary)
}

/// Run `step` up to `attempts` times, sleeping `delay` between tries.
/// Fatal errors are returned at once.
pub async fn retry_with_backoff<T, F>(attempts: u32, delay: Duration, mut step: F) -> Result<T>
where
    F: AsyncFnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match step().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() || attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("tentativa {} falhou: {}; repetindo", attempt, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
