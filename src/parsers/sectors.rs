//! B3 sectoral classification spreadsheet to a YAML document.
//!
//! Columns are sector, subsector, segment-or-company, listing code. A row
//! whose third column has no listing code opens a segment; rows with a code
//! are companies of the current segment. Sector and subsector cells are only
//! filled where they change.

use calamine::{open_workbook_auto, Reader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::codec::fold;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorDocument {
    #[serde(rename = "Setores")]
    pub sectors: Vec<Sector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    #[serde(rename = "Setor")]
    pub name: String,
    #[serde(rename = "Subsetores")]
    pub subsectors: Vec<Subsector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsector {
    #[serde(rename = "Subsetor")]
    pub name: String,
    #[serde(rename = "Segmentos")]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "Segmento")]
    pub name: String,
    #[serde(rename = "Empresas")]
    pub companies: Vec<String>,
}

impl SectorDocument {
    pub fn company_count(&self) -> usize {
        self.sectors
            .iter()
            .flat_map(|s| &s.subsectors)
            .flat_map(|s| &s.segments)
            .map(|s| s.companies.len())
            .sum()
    }

    fn open_sector(&mut self, name: &str) {
        if self.sectors.last().map(|s| s.name.as_str()) != Some(name) {
            self.sectors.push(Sector {
                name: name.to_string(),
                subsectors: Vec::new(),
            });
        }
    }

    fn open_subsector(&mut self, name: &str) -> Option<()> {
        let sector = self.sectors.last_mut()?;
        if sector.subsectors.last().map(|s| s.name.as_str()) != Some(name) {
            sector.subsectors.push(Subsector {
                name: name.to_string(),
                segments: Vec::new(),
            });
        }
        Some(())
    }

    fn open_segment(&mut self, name: &str) -> Option<()> {
        let subsector = self.sectors.last_mut()?.subsectors.last_mut()?;
        subsector.segments.push(Segment {
            name: name.to_string(),
            companies: Vec::new(),
        });
        Some(())
    }

    fn add_company(&mut self, name: &str) -> Option<()> {
        let segment = self
            .sectors
            .last_mut()?
            .subsectors
            .last_mut()?
            .segments
            .last_mut()?;
        segment.companies.push(name.to_string());
        Some(())
    }
}

fn is_header(row: &[String]) -> bool {
    row.first()
        .map(|cell| fold(cell).starts_with("setor economico"))
        .unwrap_or(false)
}

/// Build the hierarchy from spreadsheet rows rendered as text
pub fn build_document<I>(rows: I) -> SectorDocument
where
    I: IntoIterator<Item = Vec<String>>,
{
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| row.into_iter().map(|c| c.trim().to_string()).collect())
        .collect();
    // Rows above the column titles are banners and notes
    let start = rows.iter().position(|r| is_header(r)).map_or(0, |i| i + 1);

    let mut doc = SectorDocument::default();
    for row in &rows[start..] {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or_default();
        let (sector, subsector, third, code) = (cell(0), cell(1), cell(2), cell(3));

        if !sector.is_empty() {
            if subsector.is_empty() && third.is_empty() {
                continue;
            }
            doc.open_sector(sector);
        }
        if !subsector.is_empty() && doc.open_subsector(subsector).is_none() {
            continue;
        }
        if third.is_empty() {
            continue;
        }
        let placed = if code.is_empty() {
            doc.open_segment(third)
        } else {
            doc.add_company(third)
        };
        if placed.is_none() {
            debug!("linha fora de hierarquia: {:?}", row);
        }
    }
    doc
}

/// Read every sheet of the classification workbook
pub fn parse_workbook(path: &Path) -> Result<SectorDocument> {
    let mut workbook = open_workbook_auto(path)?;
    let mut rows = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        rows.extend(
            range
                .rows()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>()),
        );
    }
    let doc = build_document(rows);
    info!(
        "🏭 {} setores, {} empresas em {}",
        doc.sectors.len(),
        doc.company_count(),
        path.display()
    );
    Ok(doc)
}

pub fn write_yaml(doc: &SectorDocument, target: &Path) -> Result<()> {
    let text = serde_yaml::to_string(doc)?;
    std::fs::write(target, text).map_err(|e| Error::io(target, e))
}

pub fn read_yaml(path: &Path) -> Result<SectorDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_yaml::from_str(&text)?)
}
