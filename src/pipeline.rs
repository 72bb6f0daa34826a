//! Ingest pipeline: processing functions and the run driver
//!
//! A run has up to two phases, each draining its own [`RetryQueue`] with the
//! [`Executor`]:
//!
//! 1. Pre-flight (optional): download every index page. Any terminal failure
//!    aborts the run.
//! 2. Reconciliation: one record unit per meeting, enumerated from the stored
//!    index pages or rebuilt from a replay file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::{
    Database, Entity, Meeting, Persistence, Resolution, ResolutionStatus, VetoCast,
};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fetch::{
    self, ArtifactDownloader, FileStore, LocalFileStore, PageFetcher, VETO_TABLE_FILE,
};
use crate::parser::{MeetingTableParser, RecordExtractor};
use crate::queue::RetryQueue;
use crate::resolution::{
    CrossReference, VetoTable, find_adopted_resolutions, find_not_adopted_drafts,
    find_vetoed_drafts,
};
use crate::retry::DelayPolicy;
use crate::snapshot::{self, SnapshotFiles};
use crate::types::{MeetingRecord, Payload, QueueStats, WorkUnit};

/// Turns a downloaded document into text
///
/// Provided by the host; the crate ships no PDF reader.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Text of the document stored at `path`
    async fn extract_text(&self, path: &Path) -> Result<String>;
}

/// A draft found in a meeting outcome, with everything needed to store it
#[derive(Clone, Debug, PartialEq, Eq)]
enum Outcome {
    Vetoed { draft: String, casters: Vec<String> },
    NotAdopted { draft: String },
    Adopted { draft: String, resolution: String },
}

impl Outcome {
    fn draft(&self) -> &str {
        match self {
            Outcome::Vetoed { draft, .. }
            | Outcome::NotAdopted { draft }
            | Outcome::Adopted { draft, .. } => draft,
        }
    }
}

/// Reconciles one meeting record and persists what it finds
pub struct MeetingReconciler {
    documents: ArtifactDownloader,
    extractor: Arc<dyn TextExtractor>,
    persistence: Arc<dyn Persistence>,
    vetoes: Arc<VetoTable>,
    cross_reference: Arc<CrossReference>,
    delay: DelayPolicy,
    meeting_dir: PathBuf,
    resolution_dir: PathBuf,
}

impl MeetingReconciler {
    /// Create a reconciler
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: ArtifactDownloader,
        extractor: Arc<dyn TextExtractor>,
        persistence: Arc<dyn Persistence>,
        vetoes: Arc<VetoTable>,
        cross_reference: Arc<CrossReference>,
        delay: DelayPolicy,
        meeting_dir: PathBuf,
        resolution_dir: PathBuf,
    ) -> Self {
        Self {
            documents,
            extractor,
            persistence,
            vetoes,
            cross_reference,
            delay,
            meeting_dir,
            resolution_dir,
        }
    }

    /// Reconcile `record` on its `attempt`-th run
    ///
    /// Every draft mentioned in the outcome must resolve (vetoed drafts
    /// through the veto table, adopted resolutions through the
    /// cross-reference) before anything is downloaded. Each resolution is
    /// stored in its own unit of work; one already stored is skipped.
    pub async fn reconcile(&self, record: &MeetingRecord, attempt: u32) -> Result<()> {
        self.delay.wait(attempt).await;

        let meeting_id = record.meeting_record.trim();
        let outcomes = self.outcomes(record)?;
        tracing::info!(
            meeting = meeting_id,
            year = record.year,
            drafts = outcomes.len(),
            "Reconciling meeting"
        );

        let meeting_dir = self.meeting_dir.join(record.year.to_string());
        let transcript_path = self
            .documents
            .download(meeting_id, Some(&record.meeting_url), &meeting_dir)
            .await?;
        let transcript = self.extractor.extract_text(&transcript_path).await?;

        let meeting = Meeting {
            meeting_id: meeting_id.to_string(),
            year: record.year,
            date: record.date.clone(),
            topic: record.topic.clone(),
            url: record.meeting_url.clone(),
            full_text: transcript,
            veto_used_in_meeting: outcomes
                .iter()
                .any(|o| matches!(o, Outcome::Vetoed { .. })),
        };
        self.persist(vec![meeting.into()], meeting_id).await?;

        let resolution_dir = self.resolution_dir.join(record.year.to_string());
        for outcome in outcomes {
            let entities = self
                .resolution_entities(&outcome, meeting_id, record.year, &resolution_dir)
                .await?;
            self.persist(entities, outcome.draft()).await?;
        }

        Ok(())
    }

    /// Classify and resolve every draft mentioned in the outcome text
    fn outcomes(&self, record: &MeetingRecord) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();

        for draft in find_vetoed_drafts(&record.outcome) {
            let (listed, casters) = self.vetoes.resolve(&draft).ok_or_else(|| {
                Error::DataInconsistency(format!(
                    "'{}' is reported vetoed in {} but is not in the veto table",
                    draft,
                    record.meeting_record.trim()
                ))
            })?;
            if listed != draft {
                tracing::debug!(draft = %draft, listed, "Veto table lists a revision");
            }
            outcomes.push(Outcome::Vetoed {
                draft: listed.to_string(),
                casters: casters.to_vec(),
            });
        }

        for draft in find_not_adopted_drafts(&record.outcome) {
            outcomes.push(Outcome::NotAdopted { draft });
        }

        for resolution in find_adopted_resolutions(&record.outcome) {
            let draft = self.cross_reference.draft_for(&resolution).ok_or_else(|| {
                Error::DataInconsistency(format!(
                    "no draft found for '{}' ({}) in the cross-reference",
                    resolution,
                    record.meeting_record.trim()
                ))
            })?;
            outcomes.push(Outcome::Adopted { draft, resolution });
        }

        Ok(outcomes)
    }

    /// Download a document and return its text
    async fn document_text(&self, id: &str, directory: &Path) -> Result<String> {
        let path = self.documents.download(id, None, directory).await?;
        self.extractor.extract_text(&path).await
    }

    async fn resolution_entities(
        &self,
        outcome: &Outcome,
        meeting_id: &str,
        year: i32,
        directory: &Path,
    ) -> Result<Vec<Entity>> {
        let draft = outcome.draft();
        let draft_text = self.document_text(draft, directory).await?;

        let mut resolution = Resolution {
            draft_id: draft.to_string(),
            final_id: None,
            draft_url: self.documents.document_url(draft),
            final_url: None,
            status: ResolutionStatus::NotAdopted,
            draft_text,
            final_text: None,
            year,
            meeting_id: meeting_id.to_string(),
        };

        let mut casts = Vec::new();
        match outcome {
            Outcome::Vetoed { casters, .. } => {
                resolution.status = ResolutionStatus::Vetoed;
                casts.extend(casters.iter().map(|state| {
                    Entity::from(VetoCast {
                        draft_id: draft.to_string(),
                        state: state.clone(),
                    })
                }));
            }
            Outcome::NotAdopted { .. } => {}
            Outcome::Adopted {
                resolution: final_id,
                ..
            } => {
                resolution.status = ResolutionStatus::Adopted;
                resolution.final_text = Some(self.document_text(final_id, directory).await?);
                resolution.final_url = Some(self.documents.document_url(final_id));
                resolution.final_id = Some(final_id.clone());
            }
        }

        let mut entities = vec![Entity::from(resolution)];
        entities.extend(casts);
        Ok(entities)
    }

    /// Write `entities` in one unit of work
    ///
    /// A conflict means an earlier run stored the same thing: the unit of
    /// work is rolled back and the write counts as done.
    async fn persist(&self, entities: Vec<Entity>, label: &str) -> Result<()> {
        let mut unit = self.persistence.begin().await?;

        let result = async {
            for entity in entities {
                unit.upsert(entity).await?;
            }
            unit.commit().await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                unit.rollback().await?;
                tracing::info!(record = label, error = %e, "Already recorded, skipping");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    tracing::warn!(record = label, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// The processing function for both kinds of work unit
pub struct UnitProcessor {
    pages: PageFetcher,
    meetings: Option<MeetingReconciler>,
}

impl UnitProcessor {
    /// Processor that can only fetch pages; record units fail fatally
    pub fn pages_only(pages: PageFetcher) -> Self {
        Self {
            pages,
            meetings: None,
        }
    }

    /// Processor for both unit kinds
    pub fn new(pages: PageFetcher, meetings: MeetingReconciler) -> Self {
        Self {
            pages,
            meetings: Some(meetings),
        }
    }

    /// Process one unit
    pub async fn process(&self, unit: WorkUnit) -> Result<()> {
        match unit.payload() {
            Payload::Fetch(task) => self.pages.fetch(task).await,
            Payload::Record(task) => match &self.meetings {
                Some(meetings) => meetings.reconcile(&task.record, unit.attempts()).await,
                None => Err(Error::config(
                    "pipeline",
                    format!("no reconciler configured for {}", unit.description()),
                )),
            },
        }
    }
}

/// What a run should do
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Download every index page before reconciling
    pub fetch_index: bool,
    /// Reconcile the units of this replay file instead of the index pages
    pub replay_file: Option<PathBuf>,
}

/// Outcome of a run
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    /// Index pages that could not be downloaded; non-zero aborts the run
    pub preflight_failed: usize,
    /// Record units enqueued for reconciliation
    pub enqueued: usize,
    /// Counters of the reconciliation queue
    pub stats: QueueStats,
    /// Failure snapshot, when anything failed
    pub snapshot: Option<SnapshotFiles>,
}

impl RunReport {
    /// Process exit status for the host
    ///
    /// Non-zero only when the pre-flight download left index pages missing;
    /// reconciliation failures are reported through the snapshot.
    pub fn exit_code(&self) -> i32 {
        if self.preflight_failed > 0 { 1 } else { 0 }
    }
}

/// Drives a complete ingest run
pub struct Ingestor {
    config: Config,
    database: Arc<Database>,
    extractor: Arc<dyn TextExtractor>,
    store: Arc<dyn FileStore>,
    delay: DelayPolicy,
}

impl Ingestor {
    /// Create an ingestor writing to `database`
    pub fn new(config: Config, database: Arc<Database>, extractor: Arc<dyn TextExtractor>) -> Self {
        let delay = DelayPolicy::from_config(&config.jitter);
        Self {
            config,
            database,
            extractor,
            store: Arc::new(LocalFileStore),
            delay,
        }
    }

    /// Use another file store
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = store;
        self
    }

    /// Use another start delay for record units
    pub fn with_delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }

    /// Run the ingest
    ///
    /// # Errors
    /// Only fatal problems surface here: invalid configuration, a missing
    /// cross-reference export or veto table, or an unusable database. Failures
    /// of individual units end up in the report and the snapshot.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        self.config.validate()?;
        let paths = &self.config.paths;
        let executor = Executor::from_config(&self.config.queue);

        if options.fetch_index {
            let failed = self.fetch_index(&executor).await?;
            if !failed.is_empty() {
                tracing::error!(
                    failed = failed.len(),
                    "Not all index pages were fetched; retry later or check whether the upstream URLs changed"
                );
                let snapshot = snapshot::write(&paths.failure_dir, &failed).await?;
                return Ok(RunReport {
                    preflight_failed: failed.len(),
                    snapshot,
                    ..RunReport::default()
                });
            }
        }

        let cross_reference = Arc::new(CrossReference::load(&paths.cross_reference_path).await?);
        let vetoes = Arc::new(VetoTable::load(&paths.scratch_dir.join(VETO_TABLE_FILE)).await?);
        tracing::info!(drafts = vetoes.len(), "Loaded veto table");
        self.database.seed_states().await?;

        let units = match &options.replay_file {
            Some(path) => snapshot::load(path).await?,
            None => self.enumerate_records().await,
        };
        let enqueued = units.len();

        let queue = Arc::new(RetryQueue::with_retry_bound(self.config.queue.retry_bound));
        queue.enqueue_all(units).await;
        tracing::info!(units = enqueued, "Units queued, ready for processing");

        let reconciler = MeetingReconciler::new(
            ArtifactDownloader::new(&self.config.http, self.store.clone())?,
            self.extractor.clone(),
            self.database.clone(),
            vetoes,
            cross_reference,
            self.delay.clone(),
            paths.meeting_pdf_dir.clone(),
            paths.resolution_pdf_dir.clone(),
        );
        let processor = Arc::new(UnitProcessor::new(self.page_fetcher()?, reconciler));

        let stats = executor
            .run(queue.clone(), move |unit| {
                let processor = processor.clone();
                async move { processor.process(unit).await }
            })
            .await;

        let failed = queue.take_failed().await;
        tracing::info!(remaining = stats.pending, "Units remaining unprocessed");
        tracing::info!(failed = failed.len(), "Units failed to process");
        for unit in &failed {
            tracing::debug!(unit = %unit, "Failed unit");
        }
        let snapshot = snapshot::write(&paths.failure_dir, &failed).await?;

        Ok(RunReport {
            preflight_failed: 0,
            enqueued,
            stats,
            snapshot,
        })
    }

    fn page_fetcher(&self) -> Result<PageFetcher> {
        PageFetcher::new(&self.config.http, self.store.clone())
    }

    /// Download every index page; returns the pages that failed terminally
    async fn fetch_index(&self, executor: &Executor) -> Result<Vec<WorkUnit>> {
        let jobs = fetch::index_jobs(&self.config.archive, &self.config.paths.scratch_dir);
        tracing::info!(pages = jobs.len(), "Fetching index pages");

        let queue = Arc::new(RetryQueue::with_retry_bound(self.config.queue.retry_bound));
        queue.enqueue_all(jobs).await;

        let processor = Arc::new(UnitProcessor::pages_only(self.page_fetcher()?));
        executor
            .run(queue.clone(), move |unit| {
                let processor = processor.clone();
                async move { processor.process(unit).await }
            })
            .await;

        Ok(queue.take_failed().await)
    }

    /// Record units for every stored meeting table in the configured years
    ///
    /// A page that cannot be read or parsed is logged and skipped.
    async fn enumerate_records(&self) -> Vec<WorkUnit> {
        let scratch = &self.config.paths.scratch_dir;
        let mut units = Vec::new();

        for year in self.config.archive.years() {
            let parser = MeetingTableParser::new(year);

            let page = scratch.join(fetch::meeting_table_file(year));
            match self.read_records(&parser, &page).await {
                Ok(records) => units.extend(records.into_iter().map(WorkUnit::record)),
                Err(e) => {
                    tracing::error!(year, page = %page.display(), error = %e, "Failed reading meeting table")
                }
            }

            let remote_page = scratch.join(fetch::remote_meeting_table_file(year));
            match self.store.exists(&remote_page).await {
                Ok(true) => match self.read_records(&parser, &remote_page).await {
                    Ok(records) => units.extend(records.into_iter().map(WorkUnit::record)),
                    Err(e) => {
                        tracing::error!(year, page = %remote_page.display(), error = %e, "Failed reading remote meeting table")
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(year, page = %remote_page.display(), error = %e, "Failed checking remote meeting table")
                }
            }
        }

        units
    }

    async fn read_records(
        &self,
        parser: &MeetingTableParser,
        page: &Path,
    ) -> Result<Vec<MeetingRecord>> {
        let html = self.store.read(page).await?;
        parser.extract_records(&html)
    }
}
