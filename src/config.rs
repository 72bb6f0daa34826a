//! Configuration types for unsc-ingest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Retry queue and worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum attempts before a unit is classified as terminally failed (default: 20)
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,

    /// Number of concurrent workers draining one queue (default: 8)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_bound: default_retry_bound(),
            workers: default_workers(),
        }
    }
}

/// Start-of-task jitter for record units
///
/// Record units sleep a random amount of time before starting so that the
/// workers do not hit the upstream host in lockstep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Apply the random start delay (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound of the random delay (default: 10 seconds)
    #[serde(default = "default_max_jitter", with = "duration_serde")]
    pub max_delay: Duration,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_delay: default_max_jitter(),
        }
    }
}

/// HTTP client and redirect protocol configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Endpoint that hands out the session cookies needed for document downloads.
    /// The credentials in the default URL are public and protect nothing.
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Base URL for document ids (`{base}/{id}`)
    #[serde(default = "default_document_base_url")]
    pub document_base_url: String,

    /// Content type a resolved document must carry (default: "application/pdf")
    #[serde(default = "default_expected_content_type")]
    pub expected_content_type: String,

    /// Maximum meta-refresh hops before giving up (default: 10)
    #[serde(default = "default_max_redirect_hops")]
    pub max_redirect_hops: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
            login_url: default_login_url(),
            document_base_url: default_document_base_url(),
            expected_content_type: default_expected_content_type(),
            max_redirect_hops: default_max_redirect_hops(),
        }
    }
}

/// Which index pages to enumerate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Base URL of the research guide holding the yearly meeting tables
    #[serde(default = "default_index_base_url")]
    pub index_base_url: String,

    /// First year to ingest (default: 1946)
    #[serde(default = "default_since")]
    pub since: i32,

    /// Year to stop at, exclusive (default: 2021)
    #[serde(default = "default_until")]
    pub until: i32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            index_base_url: default_index_base_url(),
            since: default_since(),
            until: default_until(),
        }
    }
}

impl ArchiveConfig {
    /// Years covered by this configuration
    pub fn years(&self) -> std::ops::Range<i32> {
        self.since..self.until
    }
}

/// Filesystem locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where index pages are downloaded to and read from
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Meeting transcripts, one sub-directory per year
    #[serde(default = "default_meeting_pdf_dir")]
    pub meeting_pdf_dir: PathBuf,

    /// Resolution documents, one sub-directory per year
    #[serde(default = "default_resolution_pdf_dir")]
    pub resolution_pdf_dir: PathBuf,

    /// Tab-separated export of the library spreadsheet mapping adopted
    /// resolutions to their drafts
    #[serde(default = "default_cross_reference_path")]
    pub cross_reference_path: PathBuf,

    /// Where failure snapshots are written
    #[serde(default = "default_failure_dir")]
    pub failure_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            meeting_pdf_dir: default_meeting_pdf_dir(),
            resolution_pdf_dir: default_resolution_pdf_dir(),
            cross_reference_path: default_cross_reference_path(),
            failure_dir: default_failure_dir(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./unsc.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for an ingest run
///
/// Every section has defaults, so `{}` is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Retry bound and worker count
    #[serde(default)]
    pub queue: QueueConfig,

    /// Start-of-task jitter
    #[serde(default)]
    pub jitter: JitterConfig,

    /// HTTP and redirect protocol settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Years and index location
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Database location
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config",
                format!("failed to read '{}': {}", path.display(), e),
            )
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.queue.retry_bound == 0 {
            return Err(Error::config("queue.retry_bound", "must be at least 1"));
        }
        if self.queue.workers == 0 {
            return Err(Error::config("queue.workers", "must be at least 1"));
        }
        if self.http.max_redirect_hops == 0 {
            return Err(Error::config("http.max_redirect_hops", "must be at least 1"));
        }
        if self.archive.since >= self.archive.until {
            return Err(Error::config(
                "archive.since",
                format!(
                    "since ({}) must be before until ({})",
                    self.archive.since, self.archive.until
                ),
            ));
        }
        for (key, value) in [
            ("http.login_url", &self.http.login_url),
            ("http.document_base_url", &self.http.document_base_url),
            ("archive.index_base_url", &self.archive.index_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("'{value}' is not a valid URL: {e}")))?;
        }
        Ok(())
    }
}

fn default_retry_bound() -> u32 {
    20
}

fn default_workers() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_max_jitter() -> Duration {
    Duration::from_secs(10)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("unsc-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_login_url() -> String {
    "https://documents-dds-ny.un.org/prod/ods_mother.nsf?Login&Username=freeods2&Password=1234"
        .into()
}

fn default_document_base_url() -> String {
    "http://www.undocs.org/en".into()
}

fn default_expected_content_type() -> String {
    "application/pdf".into()
}

fn default_max_redirect_hops() -> usize {
    10
}

fn default_index_base_url() -> String {
    "https://www.un.org/depts/dhl/resguide".into()
}

fn default_since() -> i32 {
    1946
}

fn default_until() -> i32 {
    2021
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./scratch")
}

fn default_meeting_pdf_dir() -> PathBuf {
    PathBuf::from("./scratch/unsc_meeting_pdfs")
}

fn default_resolution_pdf_dir() -> PathBuf {
    PathBuf::from("./scratch/unsc_resolution_pdfs")
}

fn default_cross_reference_path() -> PathBuf {
    PathBuf::from("./exports/security_council_links.tsv")
}

fn default_failure_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./unsc.db")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
