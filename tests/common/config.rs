//! Configuration helpers pointing every endpoint at a mock server

use std::path::Path;
use std::time::Duration;

use unsc_ingest::config::{
    ArchiveConfig, HttpConfig, JitterConfig, PathsConfig, PersistenceConfig, QueueConfig,
};
use unsc_ingest::Config;

/// Config for a run against `server_uri`, with all files under `root`
///
/// Covers the single year 1986, retries each unit twice and never sleeps.
pub fn test_config(root: &Path, server_uri: &str) -> Config {
    Config {
        queue: QueueConfig {
            retry_bound: 2,
            workers: 4,
        },
        jitter: JitterConfig {
            enabled: false,
            max_delay: Duration::ZERO,
        },
        http: http_config(server_uri),
        archive: ArchiveConfig {
            index_base_url: format!("{}/resguide", server_uri),
            since: 1986,
            until: 1987,
        },
        paths: PathsConfig {
            scratch_dir: root.join("scratch"),
            meeting_pdf_dir: root.join("meetings"),
            resolution_pdf_dir: root.join("resolutions"),
            cross_reference_path: root.join("links.tsv"),
            failure_dir: root.join("failures"),
        },
        persistence: PersistenceConfig {
            database_path: root.join("unsc.db"),
        },
    }
}

/// HTTP settings against `server_uri` with a short timeout
pub fn http_config(server_uri: &str) -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_secs(5),
        login_url: format!("{}/login", server_uri),
        document_base_url: format!("{}/en", server_uri),
        ..HttpConfig::default()
    }
}
