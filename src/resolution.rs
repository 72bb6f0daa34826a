//! Resolution and draft id matching
//!
//! Meeting outcomes mention three kinds of ids:
//! - vetoed drafts (`S/2019/961 vetoed by ...`)
//! - drafts that failed the vote (`S/2019/962 not adopted`)
//! - adopted resolutions (`S/RES/2516 (2020)`)
//!
//! Vetoed drafts are looked up in the [`VetoTable`] to learn who vetoed them;
//! adopted resolutions are looked up in the [`CrossReference`] to learn which
//! draft they came from. Both tables are built once before the workers start
//! and are immutable afterwards.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, missing_file};
use crate::parser::VetoTableParser;

#[allow(clippy::expect_used)]
static VETOED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\(?(S/[0-9]{1,5}/Rev.[0-9]+|S/PV.[0-9]{1,4}|S/[0-9]{1,5}|S/[0-9]{4}/[0-9]{1,4})\)?\s*\n*\t*\r*\(?[a-zA-Z\s]*\)*\s*\n*\t*\r*vetoed by",
    )
    .expect("vetoed draft pattern is valid")
});

#[allow(clippy::expect_used)]
static NOT_ADOPTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(S/[0-9]{1,5}|S/PV.[0-9]{1,4}|S/[0-9]{4}/[0-9]{1,4})\s*\n*\t*\r*not adopted")
        .expect("not adopted draft pattern is valid")
});

#[allow(clippy::expect_used)]
static ADOPTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"S/RES/[0-9]{1,4}\s?\(?[0-9]{4}\)?").expect("adopted resolution pattern is valid")
});

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[allow(clippy::expect_used)]
static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*\)").expect("parenthesized suffix pattern is valid"));

/// Drafts mentioned as vetoed
///
/// Covers the historic id formats too: `S/X`, `S/PV.X` (1946-47) and
/// `S/X/Rev.Y` (1986).
pub fn find_vetoed_drafts(outcome: &str) -> Vec<String> {
    VETOED
        .captures_iter(outcome)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drafts mentioned as not adopted
pub fn find_not_adopted_drafts(outcome: &str) -> Vec<String> {
    NOT_ADOPTED
        .captures_iter(outcome)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Adopted resolutions, with whitespace removed (`S/RES/2516(2020)`)
///
/// Other sources reference resolutions without the space between number and
/// year, so whitespace is stripped before matching.
pub fn find_adopted_resolutions(outcome: &str) -> Vec<String> {
    let compact = WHITESPACE.replace_all(outcome, "");
    ADOPTED
        .find_iter(&compact)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Vetoed drafts and the permanent members that vetoed them
#[derive(Clone, Debug, Default)]
pub struct VetoTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for VetoTable {
    fn from(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self { entries }
    }
}

impl VetoTable {
    /// Build the table from the veto table page
    pub fn from_html(html: &str) -> Result<Self> {
        VetoTableParser.parse(html).map(Self::from)
    }

    /// Read and parse a stored veto table page
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Err(missing_file("paths.scratch_dir", path));
        }
        let html = tokio::fs::read_to_string(path).await?;
        Self::from_html(&html)
    }

    /// Number of vetoed drafts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table holds no draft
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Casters of exactly this draft
    pub fn get(&self, draft: &str) -> Option<&[String]> {
        self.entries.get(draft).map(Vec::as_slice)
    }

    /// Look up a draft, falling back to a revision of it
    ///
    /// Meeting tables sometimes name the original draft (`S/18087`) while the
    /// veto table lists the revision that was voted on (`S/18087/Rev.1`).
    /// Returns the id as listed in the table together with its casters.
    pub fn resolve(&self, draft: &str) -> Option<(&str, &[String])> {
        if let Some((id, casters)) = self.entries.get_key_value(draft) {
            return Some((id.as_str(), casters.as_slice()));
        }

        self.entries
            .range::<str, _>((Bound::Included(draft), Bound::Unbounded))
            .take_while(|(id, _)| id.starts_with(draft))
            .find(|(id, _)| {
                !id[draft.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
            })
            .map(|(id, casters)| (id.as_str(), casters.as_slice()))
    }
}

/// Adopted-resolution to draft mapping exported from the library catalogue
///
/// The export is tab-separated; any of the first 26 columns may hold the
/// adopted resolution id, and the draft id sits in a fixed column
/// (column B by default).
#[derive(Clone, Debug)]
pub struct CrossReference {
    rows: Vec<Vec<String>>,
    draft_column: usize,
}

/// Columns searched for the adopted id (A..Z)
const SEARCHED_COLUMNS: usize = 26;

impl CrossReference {
    /// Default draft column (B)
    pub const DEFAULT_DRAFT_COLUMN: usize = 1;

    /// Parse a tab-separated export
    pub fn from_tsv(content: &str) -> Self {
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split('\t')
                    .map(|cell| cell.trim().trim_matches('"').trim().to_string())
                    .collect()
            })
            .collect();

        Self {
            rows,
            draft_column: Self::DEFAULT_DRAFT_COLUMN,
        }
    }

    /// Load the export from disk
    ///
    /// # Errors
    /// A missing file is a configuration error: adopted resolutions cannot be
    /// reconciled without it.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Err(missing_file("paths.cross_reference_path", path));
        }
        let content = tokio::fs::read_to_string(path).await?;
        let table = Self::from_tsv(&content);
        tracing::info!(path = %path.display(), rows = table.len(), "Loaded cross-reference");
        Ok(table)
    }

    /// Use another column for the draft id (0-based)
    pub fn with_draft_column(mut self, column: usize) -> Self {
        self.draft_column = column;
        self
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the export has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Draft that became `resolution`
    ///
    /// Exact cell match first. The catalogue sometimes records the wrong year
    /// (`S/RES/2498(2018)` for `S/RES/2498(2019)`), so the fallback drops the
    /// parenthesized year and matches any cell starting with `S/RES/2498(`.
    pub fn draft_for(&self, resolution: &str) -> Option<String> {
        if let Some(draft) = self.find_row(|cell| cell == resolution) {
            return Some(draft);
        }

        let stem = PARENTHESIZED.replace_all(resolution, "");
        let prefix = format!("{}(", stem);
        let draft = self.find_row(|cell| cell.starts_with(&prefix));
        if let Some(draft) = &draft {
            tracing::debug!(resolution, draft = %draft, "Draft found by partial match");
        }
        draft
    }

    fn find_row(&self, matches: impl Fn(&str) -> bool) -> Option<String> {
        self.rows
            .iter()
            .filter(|row| {
                row.iter()
                    .take(SEARCHED_COLUMNS)
                    .any(|cell| matches(cell.as_str()))
            })
            .filter_map(|row| row.get(self.draft_column))
            .find(|draft| !draft.is_empty())
            .cloned()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn vetoed_drafts_are_found() {
        let outcome = "Draft resolution S/2019/961 vetoed by Russian Federation and China\n\t13-2-0 \n\tS/2019/962 not adopted5-6-4";
        assert_eq!(find_vetoed_drafts(outcome), vec!["S/2019/961"]);
        assert_eq!(find_not_adopted_drafts(outcome), vec!["S/2019/962"]);
        assert!(find_adopted_resolutions(outcome).is_empty());
    }

    #[test]
    fn historic_veto_formats_are_found() {
        assert_eq!(find_vetoed_drafts("S/18087/Rev.1 vetoed by USSR"), vec!["S/18087/Rev.1"]);
        assert_eq!(find_vetoed_drafts("(S/PV.49) vetoed by USSR"), vec!["S/PV.49"]);
        assert_eq!(
            find_vetoed_drafts("S/20378 (revised)\n vetoed by France"),
            vec!["S/20378"]
        );
    }

    #[test]
    fn adopted_resolutions_lose_whitespace() {
        let outcome = "S/RES/2516 (2020)\n Adopted 15-0-0; S/RES/ 2517(2020)";
        assert_eq!(
            find_adopted_resolutions(outcome),
            vec!["S/RES/2516(2020)", "S/RES/2517(2020)"]
        );
    }

    fn veto_table() -> VetoTable {
        let mut entries = BTreeMap::new();
        entries.insert("S/18087/Rev.1".to_string(), vec!["Russia".to_string()]);
        entries.insert(
            "S/2020/667".to_string(),
            vec!["China".to_string(), "Russia".to_string()],
        );
        entries.insert("S/180870".to_string(), vec!["USA".to_string()]);
        VetoTable::from(entries)
    }

    #[test]
    fn veto_lookup_prefers_exact_match() {
        let table = veto_table();
        let (id, casters) = table.resolve("S/2020/667").unwrap();
        assert_eq!(id, "S/2020/667");
        assert_eq!(casters, ["China", "Russia"]);
    }

    #[test]
    fn veto_lookup_falls_back_to_revision() {
        let table = veto_table();
        let (id, casters) = table.resolve("S/18087").unwrap();
        assert_eq!(id, "S/18087/Rev.1");
        assert_eq!(casters, ["Russia"]);
    }

    #[test]
    fn veto_lookup_prefix_stops_at_digit_boundary() {
        let mut entries = BTreeMap::new();
        entries.insert("S/180870".to_string(), vec!["USA".to_string()]);
        entries.insert("S/18087/Rev.2".to_string(), vec!["UK".to_string()]);
        let table = VetoTable::from(entries);

        let (id, casters) = table.resolve("S/18087").unwrap();
        assert_eq!(id, "S/18087/Rev.2");
        assert_eq!(casters, ["UK"]);
        assert!(table.resolve("S/1808").is_none());
    }

    #[test]
    fn veto_lookup_misses_unknown_drafts() {
        let table = veto_table();
        assert!(table.resolve("S/2019/961").is_none());
        assert!(table.get("S/18087").is_none());
        assert_eq!(table.len(), 3);
    }

    const EXPORT: &str = "id\tdraft\ttitle\tresolution\n\
        1\tS/2019/1\tYemen\tS/RES/2498(2018)\n\
        2\tS/2020/250\tSudan\tS/RES/2516(2020)\n\
        3\t\tNo draft\tS/RES/12(1946)\n";

    #[test]
    fn cross_reference_exact_match() {
        let table = CrossReference::from_tsv(EXPORT);
        assert_eq!(table.draft_for("S/RES/2516(2020)").as_deref(), Some("S/2020/250"));
    }

    #[test]
    fn cross_reference_ignores_wrong_year() {
        let table = CrossReference::from_tsv(EXPORT);
        assert_eq!(table.draft_for("S/RES/2498(2019)").as_deref(), Some("S/2019/1"));
    }

    #[test]
    fn cross_reference_misses_unknown_and_empty_drafts() {
        let table = CrossReference::from_tsv(EXPORT);
        assert!(table.draft_for("S/RES/9999(2020)").is_none());
        assert!(table.draft_for("S/RES/12(1946)").is_none());
    }

    #[test]
    fn cross_reference_draft_column_is_configurable() {
        let table = CrossReference::from_tsv(EXPORT).with_draft_column(2);
        assert_eq!(table.draft_for("S/RES/2516(2020)").as_deref(), Some("Sudan"));
    }

    #[tokio::test]
    async fn missing_cross_reference_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CrossReference::load(&dir.path().join("links.tsv"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn cross_reference_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.tsv");
        std::fs::write(&path, EXPORT).unwrap();
        let table = CrossReference::load(&path).await.unwrap();
        assert_eq!(table.len(), 4);
    }
}
