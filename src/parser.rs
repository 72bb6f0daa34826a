//! HTML table parsers for the meeting and veto index pages
//!
//! The yearly meeting tables changed layout twice:
//!
//! | Years        | Columns | Layout                                                        |
//! |--------------|---------|---------------------------------------------------------------|
//! | before 1994  | 4       | record, date, topic, outcome                                  |
//! | 1994 onward  | 5       | record, date, press release, topic, outcome                   |
//! | remote 2020+ | 7       | record, date, press release, topic, ?, letter, outcome        |
//!
//! Only rows whose outcome mentions a resolution or draft id are kept.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};
use crate::types::MeetingRecord;

/// Turns one index page into meeting records
///
/// Implementations are pure: a page either yields all its records or fails
/// as a whole. Callers log failures per page and carry on.
pub trait RecordExtractor: Send + Sync {
    /// Extract the meeting records of one page
    fn extract_records(&self, html: &str) -> Result<Vec<MeetingRecord>>;
}

#[allow(clippy::expect_used)]
static OUTCOME_IDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"S/[0-9]{1,5}|S/[0-9]{4}/[0-9]{1,4}|S/RES/[0-9]{1,4}\s?\(?[0-9]{4}\)?")
        .expect("outcome id pattern is valid")
});

#[allow(clippy::expect_used)]
static LEGACY_OUTCOME_IDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"S/PV.[0-9]{1,4}|S/[0-9]{1,5}|S/[0-9]{4}/[0-9]{1,4}|S/RES/[0-9]{1,4}\s?\(?[0-9]{4}\)?")
        .expect("legacy outcome id pattern is valid")
});

#[allow(clippy::expect_used)]
static LETTER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"S/[0-9]{4}/[0-9]{0,3}").expect("letter id pattern is valid"));

/// Marker the remote-meeting tables use for "no document"
const NO_DOCUMENT: &str = "--";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector '{}': {}", css, e)))
}

fn text_of(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>()
}

fn href_of(cell: &ElementRef<'_>, link: &Selector) -> Option<String> {
    cell.select(link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// Rows of the first table in the document, as lists of `<td>` cells
fn table_rows<'a>(document: &'a Html) -> Result<Vec<Vec<ElementRef<'a>>>> {
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| Error::Parse("page contains no table".to_string()))?;

    Ok(table
        .select(&row_selector)
        .map(|row| row.select(&cell_selector).collect())
        .collect())
}

/// Parser for one yearly meeting table
#[derive(Clone, Copy, Debug)]
pub struct MeetingTableParser {
    year: i32,
}

impl MeetingTableParser {
    /// Parser for the table of `year`
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Year stamped on every extracted record
    pub fn year(&self) -> i32 {
        self.year
    }

    fn record(
        &self,
        meeting_record: &str,
        meeting_url: String,
        date: &ElementRef<'_>,
        topic: &ElementRef<'_>,
        outcome: &str,
    ) -> MeetingRecord {
        MeetingRecord {
            meeting_record: meeting_record.trim().to_string(),
            meeting_url,
            year: self.year,
            date: text_of(date).trim().to_string(),
            topic: text_of(topic).trim().to_string(),
            outcome: outcome.trim().to_string(),
        }
    }

    fn missing_link(&self, meeting_record: &str) -> Error {
        Error::Parse(format!(
            "no link for meeting '{}' in the {} table",
            meeting_record.trim(),
            self.year
        ))
    }

    fn remote_meeting_row(
        &self,
        cells: &[ElementRef<'_>],
        link: &Selector,
    ) -> Result<Option<MeetingRecord>> {
        let outcome = text_of(&cells[6]);
        if !OUTCOME_IDS.is_match(&outcome) {
            return Ok(None);
        }

        let record_text = text_of(&cells[0]);
        if record_text.trim() != NO_DOCUMENT {
            let url = href_of(&cells[0], link).ok_or_else(|| self.missing_link(&record_text))?;
            return Ok(Some(self.record(&record_text, url, &cells[1], &cells[3], &outcome)));
        }

        // No verbatim record: the letter column documents the meeting instead
        let letter_text = text_of(&cells[5]);
        if letter_text.trim() == NO_DOCUMENT {
            tracing::debug!(year = self.year, "Skipping meeting without any record");
            return Ok(None);
        }
        let letter_text = letter_text.replace("\n\t\t", "");
        let letter_id = LETTER_ID
            .find(&letter_text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::Parse(format!(
                    "no letter id in '{}' in the {} table",
                    letter_text.trim(),
                    self.year
                ))
            })?;
        let url = href_of(&cells[5], link).ok_or_else(|| self.missing_link(&letter_id))?;
        Ok(Some(self.record(&letter_id, url, &cells[1], &cells[3], &outcome)))
    }

    fn modern_row(&self, cells: &[ElementRef<'_>], link: &Selector) -> Result<Option<MeetingRecord>> {
        let outcome = text_of(&cells[4]);
        if !OUTCOME_IDS.is_match(&outcome) {
            return Ok(None);
        }
        let record_text = text_of(&cells[0]);
        let url = href_of(&cells[0], link).ok_or_else(|| self.missing_link(&record_text))?;
        Ok(Some(self.record(&record_text, url, &cells[1], &cells[3], &outcome)))
    }

    fn legacy_row(&self, cells: &[ElementRef<'_>], link: &Selector) -> Result<Option<MeetingRecord>> {
        let outcome = text_of(&cells[3]);
        if !LEGACY_OUTCOME_IDS.is_match(&outcome) {
            return Ok(None);
        }
        // Early years list resolutions without a meeting; nothing to relate them to
        let record_text = text_of(&cells[0]);
        if record_text.trim().is_empty() {
            return Ok(None);
        }
        let url = href_of(&cells[0], link).ok_or_else(|| self.missing_link(&record_text))?;
        Ok(Some(self.record(&record_text, url, &cells[1], &cells[2], &outcome)))
    }
}

impl RecordExtractor for MeetingTableParser {
    fn extract_records(&self, html: &str) -> Result<Vec<MeetingRecord>> {
        let document = Html::parse_document(html);
        let link = selector("a")?;
        let mut records = Vec::new();

        for cells in table_rows(&document)? {
            let record = match cells.len() {
                7 => self.remote_meeting_row(&cells, &link)?,
                5 => self.modern_row(&cells, &link)?,
                4 => self.legacy_row(&cells, &link)?,
                _ => None,
            };
            records.extend(record);
        }

        tracing::debug!(year = self.year, records = records.len(), "Parsed meeting table");
        Ok(records)
    }
}

/// Parser for the veto table
///
/// Columns: date, draft, written record, agenda item, permanent member(s)
/// casting a negative vote. Several casters in one cell are separated by
/// `<br>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct VetoTableParser;

impl VetoTableParser {
    /// Map every vetoed draft id to the states that vetoed it
    pub fn parse(&self, html: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let document = Html::parse_document(html);
        let link = selector("a")?;
        let mut vetoes = BTreeMap::new();

        for cells in table_rows(&document)? {
            // Header and library notice rows
            if cells.len() <= 1 {
                continue;
            }
            if cells.len() < 5 {
                return Err(Error::Parse(format!(
                    "veto table row has {} cells, expected 5",
                    cells.len()
                )));
            }

            let draft = cells[1]
                .select(&link)
                .next()
                .map(|a| text_of(&a).trim().to_string())
                .filter(|draft| !draft.is_empty())
                .ok_or_else(|| {
                    Error::Parse(format!(
                        "no draft link in veto table row '{}'",
                        text_of(&cells[1]).trim()
                    ))
                })?;

            let casters: Vec<String> = cells[4]
                .text()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(normalize_state_name)
                .collect();

            vetoes.insert(draft, casters);
        }

        tracing::debug!(drafts = vetoes.len(), "Parsed veto table");
        Ok(vetoes)
    }
}

/// Normalize state names to the names in the `state` table
///
/// Russia appears as `USSR` before 1992 and as `Russian Federation` after.
pub fn normalize_state_name(name: &str) -> String {
    match name.trim() {
        "Russian Federation" | "USSR" => "Russia".to_string(),
        "United States" | "United States of America" => "USA".to_string(),
        "United Kingdom" => "UK".to_string(),
        other => other.to_string(),
    }
}
