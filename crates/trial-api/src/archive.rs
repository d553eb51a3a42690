use std::fmt;
use std::path::Path;

use contracts::{SessionConfig, TestimonyEvent, TrialAction, TrialState};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum ArchiveError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "archive sqlite error: {err}"),
            Self::Serde(err) => write!(f, "archive serde error: {err}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<rusqlite::Error> for ArchiveError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Append-only audit history of a session: the raw testimony that was
/// accepted, the actions emitted, and periodic state snapshots keyed by
/// the resume cursor. The live state document lives in `StateStore`; this
/// exists so an audit can replay what the engine saw and decided.
#[derive(Debug)]
pub struct SqliteSessionArchive {
    conn: Connection,
}

impl SqliteSessionArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        let mut archive = Self { conn };
        archive.configure()?;
        archive.migrate()?;
        Ok(archive)
    }

    /// Transactionally append one ingest pass worth of history.
    /// `events` pairs each accepted event with its stream index.
    pub fn persist_delta(
        &mut self,
        config: &SessionConfig,
        events: &[(u64, TestimonyEvent)],
        actions: &[TrialAction],
        snapshot: Option<&TrialState>,
    ) -> Result<(), ArchiveError> {
        let tx = self.conn.transaction()?;

        let config_json = serde_json::to_string(config)?;
        tx.execute(
            "INSERT INTO sessions (session_id, schema_version, case_name, config_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                case_name = excluded.case_name,
                config_json = excluded.config_json",
            params![
                config.session_id.as_str(),
                config.schema_version.as_str(),
                config.case_name.as_str(),
                config_json,
                cursor_stamp(0),
            ],
        )?;

        for (stream_index, event) in events {
            let payload_json = serde_json::to_string(event)?;
            tx.execute(
                "INSERT OR IGNORE INTO testimony_events (
                    session_id,
                    stream_index,
                    speaker_name,
                    phase,
                    credibility_signal,
                    payload_json,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    config.session_id.as_str(),
                    i64::try_from(*stream_index).unwrap_or(i64::MAX),
                    event.speaker_name.as_str(),
                    event.phase.as_str(),
                    format!("{:?}", event.credibility_signal).to_lowercase(),
                    payload_json,
                    event.timestamp.as_str(),
                ],
            )?;
        }

        for action in actions {
            let payload_json = serde_json::to_string(action)?;
            tx.execute(
                "INSERT OR IGNORE INTO actions (
                    session_id,
                    action_id,
                    priority,
                    action_type,
                    target,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    config.session_id.as_str(),
                    action.action_id.as_str(),
                    format!("{:?}", action.priority),
                    action.action_type.as_str(),
                    action.target.as_str(),
                    payload_json,
                ],
            )?;
        }

        if let Some(state) = snapshot {
            let payload_json = serde_json::to_string(state)?;
            tx.execute(
                "INSERT OR IGNORE INTO state_snapshots (
                    session_id,
                    cursor,
                    momentum_score,
                    payload_json,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    state.session_id.as_str(),
                    i64::try_from(state.events_processed).unwrap_or(i64::MAX),
                    state.momentum_score,
                    payload_json,
                    cursor_stamp(state.events_processed),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_events_range(
        &self,
        session_id: &str,
        from_index: u64,
        to_index: u64,
    ) -> Result<Vec<TestimonyEvent>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM testimony_events
             WHERE session_id = ?1 AND stream_index >= ?2 AND stream_index <= ?3
             ORDER BY stream_index ASC",
        )?;

        let rows = stmt.query_map(
            params![
                session_id,
                i64::try_from(from_index).unwrap_or(i64::MAX),
                i64::try_from(to_index).unwrap_or(i64::MAX)
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<TestimonyEvent>(&payload)?);
        }
        Ok(events)
    }

    /// Latest archived state at or before the cursor, for audit replay.
    pub fn load_snapshot_at_or_before(
        &self,
        session_id: &str,
        cursor: u64,
    ) -> Result<Option<TrialState>, ArchiveError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json
                 FROM state_snapshots
                 WHERE session_id = ?1 AND cursor <= ?2
                 ORDER BY cursor DESC
                 LIMIT 1",
                params![session_id, i64::try_from(cursor).unwrap_or(i64::MAX)],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<TrialState>(&raw)?)),
            None => Ok(None),
        }
    }

    fn configure(&mut self) -> Result<(), ArchiveError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                case_name TEXT NOT NULL,
                config_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS testimony_events (
                session_id TEXT NOT NULL,
                stream_index INTEGER NOT NULL,
                speaker_name TEXT NOT NULL,
                phase TEXT NOT NULL,
                credibility_signal TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, stream_index)
            );

            CREATE TABLE IF NOT EXISTS actions (
                session_id TEXT NOT NULL,
                action_id TEXT NOT NULL,
                priority TEXT NOT NULL,
                action_type TEXT NOT NULL,
                target TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                PRIMARY KEY (session_id, action_id)
            );

            CREATE TABLE IF NOT EXISTS state_snapshots (
                session_id TEXT NOT NULL,
                cursor INTEGER NOT NULL,
                momentum_score INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, cursor)
            );

            CREATE INDEX IF NOT EXISTS idx_events_session_index
                ON testimony_events(session_id, stream_index);
            CREATE INDEX IF NOT EXISTS idx_actions_session_priority
                ON actions(session_id, priority);
            CREATE INDEX IF NOT EXISTS idx_snapshots_session_cursor
                ON state_snapshots(session_id, cursor);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'event-000000')",
            [],
        )?;

        Ok(())
    }
}

fn cursor_stamp(cursor: u64) -> String {
    format!("event-{cursor:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CredibilitySignal, SpeakerRole, TrialPhase};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("second_chair_archive_{name}_{nanos}.sqlite"))
    }

    fn event(minute: u32) -> TestimonyEvent {
        TestimonyEvent {
            timestamp: format!("2026-03-02T10:{minute:02}:00Z"),
            speaker_role: SpeakerRole::Witness,
            speaker_name: "dana.w".to_string(),
            phase: TrialPhase::Direct,
            text: format!("archived line {minute}"),
            exhibit_refs: BTreeSet::new(),
            topic_tags: ["contract".to_string()].into_iter().collect(),
            credibility_signal: CredibilitySignal::Helpful,
            objection_flags: Vec::new(),
            prejudice_risk: false,
        }
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    #[test]
    fn persists_and_reloads_events_and_snapshots() {
        let path = temp_db_path("roundtrip");
        let mut archive = SqliteSessionArchive::open(&path).expect("open archive");

        let config = SessionConfig::default();
        let mut state = TrialState::fresh(&config);
        state.events_processed = 2;

        archive
            .persist_delta(
                &config,
                &[(0, event(1)), (1, event(2))],
                &[],
                Some(&state),
            )
            .expect("persist");

        let events = archive
            .load_events_range(&config.session_id, 0, 10)
            .expect("load events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "archived line 1");

        let snapshot = archive
            .load_snapshot_at_or_before(&config.session_id, 5)
            .expect("load snapshot")
            .expect("snapshot present");
        assert_eq!(snapshot.events_processed, 2);

        cleanup(&path);
    }

    #[test]
    fn replayed_deltas_do_not_duplicate_rows() {
        let path = temp_db_path("idempotent");
        let mut archive = SqliteSessionArchive::open(&path).expect("open archive");
        let config = SessionConfig::default();

        for _ in 0..2 {
            archive
                .persist_delta(&config, &[(0, event(1))], &[], None)
                .expect("persist");
        }

        let events = archive
            .load_events_range(&config.session_id, 0, 10)
            .expect("load events");
        assert_eq!(events.len(), 1);

        cleanup(&path);
    }

    #[test]
    fn snapshot_lookup_respects_the_cursor_bound() {
        let path = temp_db_path("bounds");
        let mut archive = SqliteSessionArchive::open(&path).expect("open archive");
        let config = SessionConfig::default();

        for cursor in [3_u64, 9] {
            let mut state = TrialState::fresh(&config);
            state.events_processed = cursor;
            archive
                .persist_delta(&config, &[], &[], Some(&state))
                .expect("persist");
        }

        let early = archive
            .load_snapshot_at_or_before(&config.session_id, 5)
            .expect("load")
            .expect("present");
        assert_eq!(early.events_processed, 3);

        let none = archive
            .load_snapshot_at_or_before(&config.session_id, 2)
            .expect("load");
        assert!(none.is_none());

        cleanup(&path);
    }
}
