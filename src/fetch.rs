//! Index page enumeration, page fetching and document downloads

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ArchiveConfig, HttpConfig};
use crate::error::{Error, Result};
use crate::redirect::RedirectResolver;
use crate::types::{FetchTask, WorkUnit};

/// File the veto table is stored as in the scratch directory
pub const VETO_TABLE_FILE: &str = "scact_veto_table_en.html";

/// Remote-meeting page published separately for 2020
const REMOTE_MEETINGS_2020_PAGE: &str = "SC_2020-revised.html";

/// First year whose table is served with a `.htm` extension
const HTM_SINCE: i32 = 1994;

/// Year whose table went back to `.html`
const HTML_AGAIN: i32 = 2022;

/// File a year's meeting table is stored as
pub fn meeting_table_file(year: i32) -> String {
    format!("scact{}_table_en.html", year)
}

/// File a year's remote-meeting table is stored as, when there is one
pub fn remote_meeting_table_file(year: i32) -> String {
    format!("scact{}_covid_table_en.html", year)
}

/// Fetch units for every yearly meeting table and the veto table
///
/// The upstream extension is inconsistent: `.html` before 1994 and again in
/// 2022, `.htm` in between. Local copies are always `.html`.
pub fn index_jobs(archive: &ArchiveConfig, scratch_dir: &Path) -> Vec<WorkUnit> {
    let base = archive.index_base_url.trim_end_matches('/');
    let mut jobs = Vec::new();

    for year in archive.years() {
        let extension = if year < HTM_SINCE || year == HTML_AGAIN {
            "html"
        } else {
            "htm"
        };
        jobs.push(WorkUnit::fetch(
            format!("{}/scact{}_table_en.{}", base, year, extension),
            scratch_dir.join(meeting_table_file(year)),
            format!("meeting table {}", year),
        ));

        if year == 2020 {
            jobs.push(WorkUnit::fetch(
                format!("{}/{}", base, REMOTE_MEETINGS_2020_PAGE),
                scratch_dir.join(remote_meeting_table_file(year)),
                format!("remote meeting table {}", year),
            ));
        }
    }

    jobs.push(WorkUnit::fetch(
        format!("{}/scact_veto_table_en.htm", base),
        scratch_dir.join(VETO_TABLE_FILE),
        "veto table",
    ));

    jobs
}

/// Where fetched pages and documents are kept
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `bytes` to `path`, replacing any previous content
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Read a stored file as text
    async fn read(&self, path: &Path) -> Result<String>;

    /// True when `path` has been stored
    async fn exists(&self, path: &Path) -> Result<bool>;
}

/// [`FileStore`] over the local filesystem
///
/// Parent directories are created on write.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// Retrieves index pages and stores them verbatim
pub struct PageFetcher {
    client: reqwest::Client,
    store: Arc<dyn FileStore>,
}

impl PageFetcher {
    /// Create a fetcher with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &HttpConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config("http", format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, store })
    }

    /// Fetch one page; anything but 200 is a failure
    pub async fn fetch(&self, task: &FetchTask) -> Result<()> {
        tracing::info!(url = %task.url, "Fetching page");
        let response = self.client.get(&task.url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::HttpStatus {
                url: task.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        self.store.write(&task.destination, &body).await
    }
}

/// Downloads documents by id through the redirect protocol
pub struct ArtifactDownloader {
    resolver: RedirectResolver,
    store: Arc<dyn FileStore>,
    document_base_url: String,
}

impl ArtifactDownloader {
    /// Create a downloader
    ///
    /// # Errors
    /// Returns error if the HTTP clients cannot be created
    pub fn new(config: &HttpConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        Ok(Self {
            resolver: RedirectResolver::new(config)?,
            store,
            document_base_url: config.document_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Default URL of a document id
    pub fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.document_base_url, id)
    }

    /// Download document `id` into `directory`
    ///
    /// `uri` overrides the default document URL. Returns the path written.
    pub async fn download(&self, id: &str, uri: Option<&str>, directory: &Path) -> Result<PathBuf> {
        let url = uri.map_or_else(|| self.document_url(id), str::to_string);
        let path = directory.join(document_file_name(id));

        tracing::info!(id, url = %url, "Downloading document");
        let artifact = self.resolver.resolve(&url).await?;
        self.store.write(&path, &artifact.bytes).await?;

        Ok(path)
    }
}

/// File name for a document id (`S/PV.8697` → `S_PV_8697`)
pub fn document_file_name(id: &str) -> String {
    id.trim().replace(['.', '/'], "_")
}
