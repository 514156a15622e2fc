//! Sync engine: one-way sync from the notes store to the flashcard backend.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use deckbridge_core::{plan_decks, reconcile, TransformOptions, Transformer};

use crate::anki::FlashcardBackend;
use crate::config::BridgeConfig;
use crate::error::{BatchFailure, Result, SyncError};
use crate::executor::{ActionBatch, Executor};
use crate::extract::{extract_destination, extract_source};
use crate::notes::NotesBackend;

/// How long completion messages stay on screen.
pub const NOTIFY_TIMEOUT_MS: u64 = 5000;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Timer,
}

/// Sync status.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Syncing { stage: SyncStage },
    Completed { synced_at: String, stats: SyncStats },
    Failed { stage: SyncStage, error: String },
}

/// Current sync stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStage {
    EnsureSchema,
    Extract,
    Reconcile,
    Transform,
    Execute,
    Cleanup,
    Notify,
}

/// Sync statistics. In a dry run these are the planned numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub source_records: usize,
    pub destination_records: usize,
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub decks_created: usize,
    pub decks_deleted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub dry_run: bool,
    pub stats: SyncStats,
    pub failures: Vec<BatchFailure>,
    pub deleted_decks: Vec<String>,
    pub summary: Vec<String>,
}

impl SyncReport {
    fn new(run_id: Uuid, trigger: Trigger, dry_run: bool) -> Self {
        Self {
            run_id,
            trigger,
            dry_run,
            stats: SyncStats::default(),
            failures: Vec::new(),
            deleted_decks: Vec::new(),
            summary: Vec::new(),
        }
    }

    /// Message shown to the user when the run is done.
    pub fn message(&self) -> String {
        format!("Anki sync finished\n{}", self.summary.join("\n"))
    }

    fn summarize(&mut self) {
        let s = &self.stats;
        let verb = |done: &'static str, planned: &'static str| if self.dry_run { planned } else { done };
        let mut lines = Vec::new();

        for (count, done, planned, what) in [
            (s.created, "Created", "Would create", ("card", "cards")),
            (s.updated, "Updated", "Would update", ("card", "cards")),
            (s.moved, "Moved", "Would move", ("card to another deck", "cards to another deck")),
            (s.deleted, "Deleted", "Would delete", ("card", "cards")),
            (s.decks_created, "Created", "Would create", ("deck", "decks")),
            (s.decks_deleted, "Deleted", "Would delete", ("deck", "decks")),
        ] {
            if count > 0 {
                lines.push(format!("{} {} {}", verb(done, planned), count, noun(count, what)));
            }
        }
        if !self.failures.is_empty() {
            let n = self.failures.len();
            lines.push(format!("{} {} failed, see the log", n, noun(n, ("item", "items"))));
        }
        if lines.is_empty() {
            let n = s.source_records;
            lines.push(format!("Everything up to date ({} {})", n, noun(n, ("card", "cards"))));
        }
        self.summary = lines;
    }
}

/// Singular or plural form for `count`.
fn noun(count: usize, (one, many): (&'static str, &'static str)) -> &'static str {
    if count == 1 {
        one
    } else {
        many
    }
}

/// Inner state shared across clones.
struct SyncEngineInner {
    config: BridgeConfig,
    notes: Arc<dyn NotesBackend>,
    anki: Arc<dyn FlashcardBackend>,
    executor: Executor,
    transformer: Transformer,
    status: Mutex<SyncStatus>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

/// Drives sync runs. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncEngineInner>,
}

impl SyncEngine {
    pub fn new(
        config: BridgeConfig,
        notes: Arc<dyn NotesBackend>,
        anki: Arc<dyn FlashcardBackend>,
    ) -> Self {
        let executor = Executor::new(
            anki.clone(),
            config.model_name.clone(),
            config.root_deck.clone(),
            config.preserved_decks.clone(),
        );
        let transformer = Transformer::new(TransformOptions {
            asset_base_url: config.notes_url(),
            link_scheme: config.link_scheme.clone(),
        });
        let last_sync_at = config.last_sync_at;

        Self {
            inner: Arc::new(SyncEngineInner {
                config,
                notes,
                anki,
                executor,
                transformer,
                status: Mutex::new(SyncStatus::Idle),
                last_sync_at: Mutex::new(last_sync_at),
            }),
        }
    }

    /// Get current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.lock().await.clone()
    }

    /// Time of the last successful run.
    pub async fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_sync_at.lock().await
    }

    async fn set_stage(&self, stage: SyncStage) {
        *self.inner.status.lock().await = SyncStatus::Syncing { stage };
    }

    async fn current_stage(&self) -> SyncStage {
        match &*self.inner.status.lock().await {
            SyncStatus::Syncing { stage } => *stage,
            _ => SyncStage::EnsureSchema,
        }
    }

    /// Run one full sync.
    ///
    /// Fails with [`SyncError::AlreadyInProgress`] while another run is in
    /// flight. Remote changes made before a failing step stay applied.
    ///
    /// The run itself executes on its own task, so dropping the returned
    /// future does not stop it; the status still ends in `Completed` or
    /// `Failed`.
    pub async fn run(&self, trigger: Trigger) -> Result<SyncReport> {
        {
            let mut status = self.inner.status.lock().await;
            if matches!(*status, SyncStatus::Syncing { .. }) {
                return Err(SyncError::AlreadyInProgress);
            }
            *status = SyncStatus::Syncing {
                stage: SyncStage::EnsureSchema,
            };
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", %run_id, ?trigger);

        let engine = self.clone();
        let task = tokio::spawn(
            async move { engine.run_inner(run_id, trigger).await }.instrument(span),
        );

        match task.await {
            Ok(result) => result,
            Err(e) => {
                let stage = self.current_stage().await;
                tracing::error!(%run_id, ?stage, "Sync task ended abnormally: {}", e);
                let error = SyncError::Data(format!("sync task failed: {}", e));
                *self.inner.status.lock().await = SyncStatus::Failed {
                    stage,
                    error: error.to_string(),
                };
                Err(error)
            }
        }
    }

    async fn run_inner(&self, run_id: Uuid, trigger: Trigger) -> Result<SyncReport> {
        tracing::info!(dry_run = self.inner.config.dry_run, "Sync started");
        let result = self.run_stages(SyncReport::new(run_id, trigger, self.inner.config.dry_run)).await;

        match &result {
            Ok(report) => {
                let now = Utc::now();
                *self.inner.last_sync_at.lock().await = Some(now);
                *self.inner.status.lock().await = SyncStatus::Completed {
                    synced_at: now.to_rfc3339(),
                    stats: report.stats.clone(),
                };
                tracing::info!(stats = ?report.stats, "Sync completed");
            }
            Err(e) => {
                let stage = self.current_stage().await;
                tracing::error!(?stage, "Sync failed: {}", e);
                *self.inner.status.lock().await = SyncStatus::Failed {
                    stage,
                    error: e.to_string(),
                };
                if trigger == Trigger::Manual {
                    self.notify(&format!("Anki sync failed\n{}", e)).await;
                }
            }
        }
        result
    }

    async fn run_stages(&self, mut report: SyncReport) -> Result<SyncReport> {
        let inner = &self.inner;
        let config = &inner.config;

        // 1. Schema
        self.set_stage(SyncStage::EnsureSchema).await;
        if config.dry_run {
            if !inner.executor.model_exists().await? {
                tracing::info!(model = %config.model_name, "Note type missing, would create it");
            }
        } else {
            inner.executor.ensure_model().await?;
        }

        // 2. Extract both sides
        self.set_stage(SyncStage::Extract).await;
        let source = extract_source(inner.notes.as_ref(), &config.root_deck).await?;
        report.stats.source_records = source.records.len();
        report.stats.duplicates = source.duplicates.len();
        report.stats.skipped = source.skipped;

        if source.records.is_empty() {
            tracing::info!("No flashcard blocks found, nothing to sync");
            report.summary = vec!["No flashcard blocks found".to_string()];
            return Ok(report);
        }

        let dest = extract_destination(inner.anki.as_ref(), &config.model_name).await?;
        report.stats.destination_records = dest.records.len();
        report.stats.duplicates += dest.duplicates.len();
        report.stats.skipped += dest.skipped;
        tracing::info!(
            source = source.records.len(),
            destination = dest.records.len(),
            "Extracted records"
        );

        // 3. Reconcile
        self.set_stage(SyncStage::Reconcile).await;
        let mut diff = reconcile(&source.records, &dest.records);
        let existing_decks = inner.anki.deck_names().await?;
        let plan = plan_decks(&source.records, &diff, &existing_decks, &config.root_deck);
        tracing::info!(
            create = diff.create.len(),
            update = diff.update.len(),
            delete = diff.delete.len(),
            unchanged = diff.unchanged.len(),
            "Reconciled"
        );

        report.stats.created = diff.create.len();
        report.stats.updated = diff.update.len();
        report.stats.moved = diff.moved().count();
        report.stats.deleted = diff.delete.len();
        report.stats.unchanged = diff.unchanged.len();
        report.stats.decks_created = plan.to_create.len();
        report.stats.decks_deleted = plan.to_delete.len();

        // 4. Transform
        self.set_stage(SyncStage::Transform).await;
        for record in diff.create.iter_mut() {
            inner.transformer.transform_record(record);
        }
        for update in diff.update.iter_mut() {
            inner.transformer.transform_record(&mut update.record);
        }

        if config.dry_run {
            report.deleted_decks = plan.to_delete.clone();
            report.summarize();
            tracing::info!("Dry run, no changes made");
            return Ok(report);
        }

        // 5. Execute
        self.set_stage(SyncStage::Execute).await;
        let batch = ActionBatch::new(diff, &plan);
        if batch.is_empty() {
            tracing::debug!("Destination already current");
        }
        let outcome = inner.executor.execute(batch).await?;
        for (block, note) in &outcome.assigned_ids {
            tracing::debug!(%block, note, "Created note");
        }
        report.stats.created = outcome.notes_created;
        report.stats.updated = outcome.notes_updated;
        report.stats.moved = outcome.cards_moved;
        report.stats.deleted = outcome.notes_deleted;
        report.stats.decks_created = outcome.decks_created;
        report.failures = outcome.failures;

        // 6. Cleanup
        self.set_stage(SyncStage::Cleanup).await;
        report.deleted_decks = inner.executor.cleanup().await?;
        report.stats.decks_deleted = report.deleted_decks.len();

        // 7. Notify
        self.set_stage(SyncStage::Notify).await;
        report.summarize();
        self.notify(&report.message()).await;

        Ok(report)
    }

    /// Push a message to the notes app. Failures are only logged.
    async fn notify(&self, msg: &str) {
        if let Err(e) = self.inner.notes.push_message(msg, NOTIFY_TIMEOUT_MS).await {
            tracing::warn!("Failed to send notification: {}", e);
        }
    }
}
