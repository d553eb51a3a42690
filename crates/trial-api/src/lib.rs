//! In-process API facade: composes the trial engine with the durable
//! state document, the SQLite session archive, the polling runtime, and
//! the HTTP inspection server. All I/O in the system happens here; the
//! kernel's transition stays pure.

mod archive;
mod runtime;
mod server;
mod store;

use std::fmt;
use std::path::{Path, PathBuf};

use contracts::{
    Contradiction, SessionConfig, SessionStatus, TestimonyEvent, TrialAction, TrialState,
};
use serde::Serialize;
use trial_kernel::{read_transcript, SourceError, StatementComparer, TrialEngine};

pub use archive::{ArchiveError, SqliteSessionArchive};
pub use runtime::watch_transcript;
pub use server::{serve, ServerError};
pub use store::{StateStore, StoreError};

#[derive(Debug)]
pub enum FacadeError {
    Source(SourceError),
    Store(StoreError),
    Archive(ArchiveError),
    StoreNotAttached,
    ArchiveNotAttached,
    /// The stream shrank below the resume cursor. The feed is append-only
    /// by contract; a shorter file means the cursor no longer addresses it.
    StreamTruncated { cursor: u64, available: u64 },
}

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Archive(err) => write!(f, "{err}"),
            Self::StoreNotAttached => write!(f, "state store is not attached"),
            Self::ArchiveNotAttached => write!(f, "session archive is not attached"),
            Self::StreamTruncated { cursor, available } => write!(
                f,
                "transcript shrank below the resume cursor (cursor={cursor}, available={available})"
            ),
        }
    }
}

impl std::error::Error for FacadeError {}

impl From<SourceError> for FacadeError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<StoreError> for FacadeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ArchiveError> for FacadeError {
    fn from(value: ArchiveError) -> Self {
        Self::Archive(value)
    }
}

/// Outcome of one ingest pass, handed to the rendering collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub processed: u64,
    pub rejected: u64,
    pub stream_warnings: u64,
    pub actions: Vec<TrialAction>,
    pub changes: Vec<String>,
    pub status: SessionStatus,
}

#[derive(Debug)]
struct ArchiveState {
    store: SqliteSessionArchive,
    persisted_action_count: usize,
    last_snapshot_cursor: Option<u64>,
}

#[derive(Debug)]
pub struct EngineApi {
    engine: TrialEngine,
    transcript_path: PathBuf,
    store: Option<StateStore>,
    archive: Option<ArchiveState>,
    last_persistence_error: Option<String>,
}

impl EngineApi {
    pub fn from_config(config: SessionConfig, transcript_path: impl Into<PathBuf>) -> Self {
        Self {
            engine: TrialEngine::new(config),
            transcript_path: transcript_path.into(),
            store: None,
            archive: None,
            last_persistence_error: None,
        }
    }

    pub fn with_comparer(mut self, comparer: Box<dyn StatementComparer>) -> Self {
        let config = self.engine.config().clone();
        let state = self.engine.state().clone();
        self.engine = TrialEngine::resume(config, state).with_comparer(comparer);
        self
    }

    /// Attach the durable state document. An existing document resumes the
    /// session (returns true); an absent one is bootstrapped immediately so
    /// readers always find a snapshot. Corrupt or mismatched documents are
    /// fatal here, never silently replaced.
    pub fn attach_state_store(&mut self, path: impl Into<PathBuf>) -> Result<bool, StoreError> {
        let store = StateStore::new(path);
        let resumed = match store.load()? {
            Some(state) => {
                let expected = self.engine.config().session_id.clone();
                if state.session_id != expected {
                    return Err(StoreError::SessionMismatch {
                        expected,
                        found: state.session_id,
                    });
                }
                self.engine = TrialEngine::resume(self.engine.config().clone(), state);
                true
            }
            None => {
                store.save(self.engine.state())?;
                false
            }
        };
        self.store = Some(store);
        Ok(resumed)
    }

    /// Attach the audit archive and bootstrap a snapshot of the current
    /// state, mirroring what the state store does on first attach.
    pub fn attach_archive(&mut self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let mut store = SqliteSessionArchive::open(path)?;
        store.persist_delta(
            self.engine.config(),
            &[],
            &[],
            Some(self.engine.state()),
        )?;
        self.archive = Some(ArchiveState {
            store,
            persisted_action_count: self.engine.state().pending_actions.len(),
            last_snapshot_cursor: Some(self.engine.state().events_processed),
        });
        Ok(())
    }

    /// One full pass: read the stream, slice at the resume cursor, advance
    /// the engine once per new event, then persist. The persisted document
    /// is the acknowledgement; if the save fails the events are reprocessed
    /// from the last durable cursor on restart rather than lost.
    pub fn ingest_pass(&mut self) -> Result<IngestReport, FacadeError> {
        let batch = read_transcript(&self.transcript_path)?;
        self.engine
            .set_stream_warning_count(batch.warnings.len() as u64);

        let cursor = self.engine.events_processed();
        let available = batch.events.len() as u64;
        if cursor > available {
            return Err(FacadeError::StreamTruncated { cursor, available });
        }

        let fresh = &batch.events[cursor as usize..];
        let outcome = self.engine.process_batch(fresh);
        let indexed: Vec<(u64, TestimonyEvent)> = fresh
            .iter()
            .enumerate()
            .map(|(offset, event)| (cursor + offset as u64, event.clone()))
            .collect();

        self.flush(&indexed, false)?;

        Ok(IngestReport {
            processed: outcome.processed,
            rejected: outcome.rejected,
            stream_warnings: batch.warnings.len() as u64,
            actions: outcome.actions,
            changes: outcome.changes,
            status: self.engine.status(),
        })
    }

    /// Final flush on shutdown: save the document and force an archive
    /// snapshot so nothing is processed only in memory.
    pub fn flush_now(&mut self) -> Result<(), FacadeError> {
        self.flush(&[], true)
    }

    /// Flip a contradiction's `exploited` flag and persist. Returns false
    /// when the id is unknown.
    pub fn mark_contradiction_exploited(&mut self, id: &str) -> Result<bool, FacadeError> {
        if !self.engine.mark_contradiction_exploited(id) {
            return Ok(false);
        }
        self.flush(&[], false)?;
        Ok(true)
    }

    /// The persisted snapshot, for concurrent readers. Dashboards read
    /// this, never the live in-memory state.
    pub fn load_persisted_state(&self) -> Result<Option<TrialState>, FacadeError> {
        let Some(store) = self.store.as_ref() else {
            return Err(FacadeError::StoreNotAttached);
        };
        Ok(store.load()?)
    }

    /// Audit replay: the archived state at or before a cursor.
    pub fn replay_at(&self, cursor: u64) -> Result<Option<TrialState>, FacadeError> {
        let Some(archive) = self.archive.as_ref() else {
            return Err(FacadeError::ArchiveNotAttached);
        };
        Ok(archive
            .store
            .load_snapshot_at_or_before(&self.engine.state().session_id, cursor)?)
    }

    pub fn session_id(&self) -> &str {
        &self.engine.config().session_id
    }

    pub fn config(&self) -> &SessionConfig {
        self.engine.config()
    }

    pub fn status(&self) -> SessionStatus {
        self.engine.status()
    }

    pub fn state(&self) -> &TrialState {
        self.engine.state()
    }

    pub fn pending_actions(&self) -> &[TrialAction] {
        &self.engine.state().pending_actions
    }

    pub fn contradictions(&self) -> &[Contradiction] {
        &self.engine.state().contradictions
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    fn flush(
        &mut self,
        new_events: &[(u64, TestimonyEvent)],
        force_snapshot: bool,
    ) -> Result<(), FacadeError> {
        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.save(self.engine.state()) {
                self.last_persistence_error = Some(err.to_string());
                return Err(FacadeError::Store(err));
            }
        }

        if let Some(archive_state) = self.archive.as_mut() {
            let state = self.engine.state();
            let pending = &state.pending_actions;
            let already = archive_state.persisted_action_count.min(pending.len());
            let new_actions = &pending[already..];

            let cursor = state.events_processed;
            let cadence = self.engine.config().snapshot_every_events.max(1);
            let snapshot_due = match archive_state.last_snapshot_cursor {
                _ if force_snapshot => archive_state.last_snapshot_cursor != Some(cursor),
                None => true,
                Some(last) => cursor >= last + cadence,
            };
            let snapshot = snapshot_due.then_some(state);

            if let Err(err) = archive_state.store.persist_delta(
                self.engine.config(),
                new_events,
                new_actions,
                snapshot,
            ) {
                self.last_persistence_error = Some(err.to_string());
                return Err(FacadeError::Archive(err));
            }

            archive_state.persisted_action_count = pending.len();
            if snapshot_due {
                archive_state.last_snapshot_cursor = Some(cursor);
            }
        }

        self.last_persistence_error = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str, extension: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("second_chair_api_{name}_{nanos}.{extension}"))
    }

    fn transcript_line(minute: u32, phase: &str, signal: &str) -> String {
        format!(
            concat!(
                "{{\"timestamp\":\"2026-03-02T10:{:02}:00Z\",\"speaker_role\":\"witness\",",
                "\"speaker_name\":\"dana.w\",\"phase\":\"{}\",",
                "\"text\":\"statement at minute {}\",\"topic_tags\":[\"contract\"],",
                "\"credibility_signal\":\"{}\"}}"
            ),
            minute, phase, minute, signal
        )
    }

    fn write_transcript(path: &Path, lines: &[String]) {
        let mut file = std::fs::File::create(path).expect("create transcript");
        for line in lines {
            writeln!(file, "{line}").expect("write line");
        }
    }

    #[test]
    fn ingest_pass_processes_persists_and_reports() {
        let transcript = temp_path("ingest", "jsonl");
        let state_path = temp_path("ingest_state", "json");
        write_transcript(
            &transcript,
            &[
                transcript_line(1, "direct", "helpful"),
                transcript_line(2, "cross", "harmful"),
            ],
        );

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        api.attach_state_store(&state_path).expect("attach store");

        let report = api.ingest_pass().expect("ingest");
        assert_eq!(report.processed, 2);
        assert_eq!(report.status.contradiction_count, 1);
        assert!(!report.actions.is_empty());

        let persisted = api
            .load_persisted_state()
            .expect("load persisted")
            .expect("present");
        assert_eq!(persisted.events_processed, 2);

        let _ = std::fs::remove_file(&transcript);
        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn resume_continues_from_the_cursor_without_reprocessing() {
        let transcript = temp_path("resume", "jsonl");
        let state_path = temp_path("resume_state", "json");
        write_transcript(&transcript, &[transcript_line(1, "direct", "helpful")]);

        let mut first = EngineApi::from_config(SessionConfig::default(), &transcript);
        first.attach_state_store(&state_path).expect("attach");
        first.ingest_pass().expect("first pass");
        let after_first = first.state().clone();
        drop(first);

        // Append one line, then bring up a fresh facade against the same store.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&transcript)
            .expect("reopen");
        writeln!(file, "{}", transcript_line(2, "cross", "harmful")).expect("append");

        let mut second = EngineApi::from_config(SessionConfig::default(), &transcript);
        let resumed = second.attach_state_store(&state_path).expect("attach");
        assert!(resumed);
        assert_eq!(second.state(), &after_first);

        let report = second.ingest_pass().expect("second pass");
        assert_eq!(report.processed, 1);
        assert_eq!(second.state().events_processed, 2);

        // Nothing new: the pass is a no-op and the state is unchanged.
        let before = second.state().clone();
        let idle = second.ingest_pass().expect("idle pass");
        assert_eq!(idle.processed, 0);
        assert_eq!(second.state(), &before);

        let _ = std::fs::remove_file(&transcript);
        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn corrupt_state_document_refuses_to_attach() {
        let transcript = temp_path("corrupt", "jsonl");
        let state_path = temp_path("corrupt_state", "json");
        std::fs::write(&state_path, "{not json").expect("write garbage");

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        match api.attach_state_store(&state_path) {
            Err(StoreError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }

        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn state_document_from_another_session_is_rejected() {
        let transcript = temp_path("mismatch", "jsonl");
        let state_path = temp_path("mismatch_state", "json");

        let mut other_config = SessionConfig::default();
        other_config.session_id = "session_other".to_string();
        StateStore::new(&state_path)
            .save(&TrialState::fresh(&other_config))
            .expect("seed store");

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        match api.attach_state_store(&state_path) {
            Err(StoreError::SessionMismatch { expected, found }) => {
                assert_eq!(expected, "session_local_001");
                assert_eq!(found, "session_other");
            }
            other => panic!("expected SessionMismatch, got {other:?}"),
        }

        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn truncated_stream_is_fatal_not_reprocessed() {
        let transcript = temp_path("truncated", "jsonl");
        let state_path = temp_path("truncated_state", "json");
        write_transcript(
            &transcript,
            &[
                transcript_line(1, "direct", "helpful"),
                transcript_line(2, "direct", "neutral"),
            ],
        );

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        api.attach_state_store(&state_path).expect("attach");
        api.ingest_pass().expect("ingest");

        write_transcript(&transcript, &[transcript_line(1, "direct", "helpful")]);
        match api.ingest_pass() {
            Err(FacadeError::StreamTruncated { cursor, available }) => {
                assert_eq!(cursor, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected StreamTruncated, got {other:?}"),
        }

        let _ = std::fs::remove_file(&transcript);
        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn exploit_flips_the_flag_and_persists() {
        let transcript = temp_path("exploit", "jsonl");
        let state_path = temp_path("exploit_state", "json");
        write_transcript(
            &transcript,
            &[
                transcript_line(1, "direct", "helpful"),
                transcript_line(2, "cross", "harmful"),
            ],
        );

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        api.attach_state_store(&state_path).expect("attach");
        api.ingest_pass().expect("ingest");

        let id = api.contradictions()[0].contradiction_id.clone();
        assert!(api.mark_contradiction_exploited(&id).expect("exploit"));
        assert!(!api
            .mark_contradiction_exploited("contradiction_9999")
            .expect("unknown id"));

        let persisted = api
            .load_persisted_state()
            .expect("load")
            .expect("present");
        assert!(persisted.contradictions[0].exploited);

        let _ = std::fs::remove_file(&transcript);
        let _ = std::fs::remove_file(&state_path);
    }

    #[test]
    fn archive_receives_events_actions_and_snapshots() {
        let transcript = temp_path("archive", "jsonl");
        let state_path = temp_path("archive_state", "json");
        let archive_path = temp_path("archive_db", "sqlite");
        write_transcript(
            &transcript,
            &[
                transcript_line(1, "direct", "helpful"),
                transcript_line(2, "cross", "harmful"),
            ],
        );

        let mut api = EngineApi::from_config(SessionConfig::default(), &transcript);
        api.attach_state_store(&state_path).expect("attach store");
        api.attach_archive(&archive_path).expect("attach archive");
        api.ingest_pass().expect("ingest");
        api.flush_now().expect("final flush");

        let replayed = api.replay_at(u64::MAX).expect("replay").expect("snapshot");
        assert_eq!(replayed.events_processed, 2);

        let _ = std::fs::remove_file(&transcript);
        let _ = std::fs::remove_file(&state_path);
        let _ = std::fs::remove_file(&archive_path);
        let _ = std::fs::remove_file(archive_path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(archive_path.with_extension("sqlite-shm"));
    }
}
