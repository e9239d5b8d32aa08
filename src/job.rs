use crate::audio::AudioExtractor;
use crate::cancel::CancelToken;
use crate::error::{Result, SubGenError};
use crate::srt::SrtFile;
use crate::stt::{SpeechEngine, Transcriber};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::watch;
use uuid::Uuid;

/// Progress checkpoints per stage. Coarse by design; within transcription the
/// per-chunk callback interpolates between start and end.
const PROGRESS_EXTRACT: f32 = 0.0;
const PROGRESS_TRANSCRIBE_START: f32 = 0.2;
const PROGRESS_TRANSCRIBE_END: f32 = 0.9;
const PROGRESS_SERIALIZE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    ExtractingAudio,
    Transcribing,
    GeneratingSrt,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::ExtractingAudio => "extracting_audio",
            JobStatus::Transcribing => "transcribing",
            JobStatus::GeneratingSrt => "generating_srt",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(JobStatus::Pending),
            "extracting_audio" => Some(JobStatus::ExtractingAudio),
            "transcribing" => Some(JobStatus::Transcribing),
            "generating_srt" => Some(JobStatus::GeneratingSrt),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Observable state of one subtitle generation job.
#[derive(Debug, Clone)]
pub struct SubtitleJob {
    pub id: String,
    pub source_uri: String,
    pub source_path: PathBuf,
    pub status: JobStatus,
    pub progress: f32,
}

/// The durable work record: the only state that survives a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    pub job_id: String,
    pub source_uri: String,
    pub source_path: PathBuf,
    /// Whole percent, 0-100.
    pub progress: u8,
    pub stage: String,
}

impl WorkRecord {
    fn from_job(job: &SubtitleJob) -> Self {
        Self {
            job_id: job.id.clone(),
            source_uri: job.source_uri.clone(),
            source_path: job.source_path.clone(),
            progress: (job.progress.clamp(0.0, 1.0) * 100.0).round() as u8,
            stage: job.status.label().to_string(),
        }
    }

    pub fn to_job(&self) -> SubtitleJob {
        SubtitleJob {
            id: self.job_id.clone(),
            source_uri: self.source_uri.clone(),
            source_path: self.source_path.clone(),
            // An unreadable stage label means the record was written by an
            // incompatible version; surface it as a failed job.
            status: JobStatus::from_label(&self.stage).unwrap_or(JobStatus::Failed),
            progress: self.progress.min(100) as f32 / 100.0,
        }
    }
}

/// Single-slot durable store for the work record.
///
/// One tracked job per controller means one record file; a job queue would
/// need records keyed by job id instead.
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            path: work_dir.join("subgen-job.json"),
        }
    }

    pub fn save(&self, record: &WorkRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn load(&self) -> Option<WorkRecord> {
        let content = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Scratch WAV with scoped lifetime: the file is removed when the guard goes
/// out of scope, on success, error, cancellation and panic alike.
struct ScratchWav {
    path: PathBuf,
}

impl ScratchWav {
    fn acquire(work_dir: &Path, job_id: &str) -> Result<Self> {
        fs::create_dir_all(work_dir)?;
        let path = work_dir.join(format!("{job_id}.wav"));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchWav {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Runs the extract → transcribe → serialize pipeline as one cancellable
/// background job and publishes status over a watch channel.
///
/// Tracks at most one job at a time; a second submission while a job is live
/// is rejected.
pub struct JobController {
    work_dir: PathBuf,
    status_tx: watch::Sender<Option<SubtitleJob>>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl JobController {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            work_dir: work_dir.into(),
            status_tx,
            cancel: CancelToken::new(),
            worker: None,
        }
    }

    pub fn store(&self) -> JobStore {
        JobStore::new(&self.work_dir)
    }

    /// Subscribe to job status updates. The receiver always holds the latest
    /// published state.
    pub fn status(&self) -> watch::Receiver<Option<SubtitleJob>> {
        self.status_tx.subscribe()
    }

    pub fn current(&self) -> Option<SubtitleJob> {
        self.status_tx.borrow().clone()
    }

    /// Reconstruct job state from the durable record, e.g. after the hosting
    /// process was killed and restarted.
    pub fn resume(&self) -> Option<SubtitleJob> {
        self.store().load().map(|record| record.to_job())
    }

    /// Request cooperative cancellation of the running job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker thread finishes.
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// Start a subtitle generation job for `source_path`.
    ///
    /// Returns the job id. The pipeline runs on a dedicated worker thread;
    /// observe it through [`JobController::status`].
    pub fn submit<E>(
        &mut self,
        source_uri: impl Into<String>,
        source_path: impl AsRef<Path>,
        transcriber: Transcriber<E>,
    ) -> Result<String>
    where
        E: SpeechEngine + 'static,
    {
        if let Some(job) = self.current() {
            if !job.status.is_terminal() {
                return Err(SubGenError::JobActive);
            }
        }
        // The previous job reached a terminal state; reap its thread.
        self.wait();

        let source_path = source_path.as_ref().to_path_buf();
        if !source_path.is_file() {
            return Err(SubGenError::InvalidPath(format!(
                "source does not exist: {}",
                source_path.display()
            )));
        }

        let job = SubtitleJob {
            id: Uuid::new_v4().to_string(),
            source_uri: source_uri.into(),
            source_path,
            status: JobStatus::Pending,
            progress: 0.0,
        };
        info!(
            "Submitting subtitle job {} for {}",
            job.id,
            job.source_path.display()
        );

        self.cancel = CancelToken::new();
        let cancel = self.cancel.clone();
        let status_tx = self.status_tx.clone();
        let store = self.store();
        let work_dir = self.work_dir.clone();
        let id = job.id.clone();

        let handle = std::thread::Builder::new()
            .name("subgen-job".to_string())
            .spawn(move || run_pipeline(job, transcriber, store, status_tx, cancel, work_dir))?;
        self.worker = Some(handle);

        Ok(id)
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.wait();
    }
}

fn publish(store: &JobStore, status_tx: &watch::Sender<Option<SubtitleJob>>, job: &SubtitleJob) {
    if let Err(e) = store.save(&WorkRecord::from_job(job)) {
        // Bookkeeping failure must not kill the pipeline.
        warn!("Failed to persist work record for job {}: {e}", job.id);
    }
    // send() fails when no receiver is subscribed yet; send_replace updates
    // the slot unconditionally so current() always sees the latest state.
    status_tx.send_replace(Some(job.clone()));
}

fn run_pipeline<E: SpeechEngine>(
    mut job: SubtitleJob,
    mut transcriber: Transcriber<E>,
    store: JobStore,
    status_tx: watch::Sender<Option<SubtitleJob>>,
    cancel: CancelToken,
    work_dir: PathBuf,
) {
    publish(&store, &status_tx, &job);

    match execute_stages(
        &mut job,
        &mut transcriber,
        &store,
        &status_tx,
        &cancel,
        &work_dir,
    ) {
        Ok(()) => {
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            info!("Subtitle job {} completed", job.id);
        }
        Err(SubGenError::Cancelled) => {
            job.status = JobStatus::Cancelled;
            info!("Subtitle job {} cancelled", job.id);
        }
        Err(e) => {
            // Observers only see pass/fail; keep the subtype in the log.
            error!("Subtitle job {} failed: {e}", job.id);
            job.status = JobStatus::Failed;
        }
    }

    publish(&store, &status_tx, &job);
}

fn execute_stages<E: SpeechEngine>(
    job: &mut SubtitleJob,
    transcriber: &mut Transcriber<E>,
    store: &JobStore,
    status_tx: &watch::Sender<Option<SubtitleJob>>,
    cancel: &CancelToken,
    work_dir: &Path,
) -> Result<()> {
    let scratch = ScratchWav::acquire(work_dir, &job.id)?;

    job.status = JobStatus::ExtractingAudio;
    job.progress = PROGRESS_EXTRACT;
    publish(store, status_tx, job);
    AudioExtractor::default().extract_to_wav(job.source_path.as_path(), scratch.path(), cancel)?;

    cancel.check()?;
    job.status = JobStatus::Transcribing;
    job.progress = PROGRESS_TRANSCRIBE_START;
    publish(store, status_tx, job);

    let snapshot = job.clone();
    let segments = transcriber.transcribe(scratch.path(), cancel, |fraction| {
        let mut checkpoint = snapshot.clone();
        checkpoint.progress = PROGRESS_TRANSCRIBE_START
            + (PROGRESS_TRANSCRIBE_END - PROGRESS_TRANSCRIBE_START) * fraction;
        publish(store, status_tx, &checkpoint);
    })?;
    job.progress = PROGRESS_TRANSCRIBE_END;

    cancel.check()?;
    job.status = JobStatus::GeneratingSrt;
    job.progress = PROGRESS_SERIALIZE;
    publish(store, status_tx, job);

    // The subtitle file lives beside the source: same directory, same base
    // name, .srt extension.
    let srt_path = job.source_path.with_extension("srt");
    let srt = SrtFile::from_segments(&segments);
    srt.save(&srt_path)?;
    debug!("Wrote {} cue(s) to {}", srt.len(), srt_path.display());

    Ok(())
}
