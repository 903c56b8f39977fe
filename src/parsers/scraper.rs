//! Pull-based HTML scraping.
//!
//! The scraper walks a queue of URLs and yields what happened as typed
//! events; callers drive it with `while let Some(event) = scraper.next().await`
//! and keep their own state between events.

use scraper::{Html, Selector};
use std::collections::VecDeque;
use tracing::debug;

use crate::api::{HttpClient, RequestOptions};
use crate::error::Error;

/// Something observed while scraping one URL
#[derive(Debug)]
pub enum ScrapeEvent {
    /// About to fetch `url`
    Request { url: String },
    /// Body received
    Response { url: String, bytes: usize },
    /// One `<tr>` of the page, as its trimmed `<td>` texts
    Element { url: String, cells: Vec<String> },
    /// Fetch failed; the scraper moves on to the next URL
    Error { url: String, error: Error },
}

/// Event iterator over a queue of pages
pub struct Scraper<'a> {
    http: &'a HttpClient,
    options: RequestOptions,
    queue: VecDeque<String>,
    in_flight: Option<String>,
    events: VecDeque<ScrapeEvent>,
}

impl<'a> Scraper<'a> {
    pub fn new<I>(http: &'a HttpClient, options: RequestOptions, urls: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            http,
            options,
            queue: urls.into_iter().collect(),
            in_flight: None,
            events: VecDeque::new(),
        }
    }

    /// Add a page to the end of the queue
    pub fn visit(&mut self, url: impl Into<String>) {
        self.queue.push_back(url.into());
    }

    pub async fn next(&mut self) -> Option<ScrapeEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }

            if let Some(url) = self.in_flight.take() {
                self.fetch(url).await;
                continue;
            }

            let url = self.queue.pop_front()?;
            self.in_flight = Some(url.clone());
            return Some(ScrapeEvent::Request { url });
        }
    }

    async fn fetch(&mut self, url: String) {
        match self.http.get_text(&url, self.options).await {
            Ok(body) => {
                let rows = table_rows(&body);
                debug!("{}: {} linhas de tabela", url, rows.len());
                self.events.push_back(ScrapeEvent::Response {
                    url: url.clone(),
                    bytes: body.len(),
                });
                self.events.extend(rows.into_iter().map(|cells| ScrapeEvent::Element {
                    url: url.clone(),
                    cells,
                }));
            }
            Err(error) => self.events.push_back(ScrapeEvent::Error { url, error }),
        }
    }
}

/// Every `<tr>` with at least one `<td>`, cells trimmed and whitespace
/// collapsed
pub fn table_rows(html: &str) -> Vec<Vec<String>> {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();

    if let Ok(tr_selector) = Selector::parse("tr") {
        if let Ok(td_selector) = Selector::parse("td") {
            for tr in document.select(&tr_selector) {
                let cells: Vec<String> = tr
                    .select(&td_selector)
                    .map(|td| td.text().collect::<Vec<_>>().join(" "))
                    .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
                    .collect();
                if !cells.is_empty() {
                    rows.push(cells);
                }
            }
        }
    }

    rows
}
