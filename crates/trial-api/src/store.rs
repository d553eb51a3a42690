use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use contracts::TrialState;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    /// File present but not a readable `TrialState`. Never treated as a
    /// fresh session: that would silently erase audit history.
    Corrupt { path: PathBuf, detail: String },
    SessionMismatch { expected: String, found: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "state store io error: {err}"),
            Self::Serde(err) => write!(f, "state store serde error: {err}"),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupt state file {}: {detail}", path.display())
            }
            Self::SessionMismatch { expected, found } => write!(
                f,
                "state file belongs to session {found}, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Durable home of the `TrialState` document. Saves go through a sibling
/// temp file and a rename, so a crash mid-write can never leave a partial
/// document where `load` would find it.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absent file is a fresh session; unreadable content is fatal.
    pub fn load(&self) -> Result<Option<TrialState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<TrialState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                detail: err.to_string(),
            }),
        }
    }

    pub fn save(&self, state: &TrialState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec_pretty(state)?;
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SessionConfig;

    fn temp_state_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("second_chair_store_{name}_{nanos}.json"))
    }

    #[test]
    fn absent_store_loads_as_none() {
        let store = StateStore::new(temp_state_path("absent"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_state_path("roundtrip");
        let store = StateStore::new(&path);
        let mut state = TrialState::fresh(&SessionConfig::default());
        state.events_processed = 17;
        state.momentum_score = 63;

        store.save(&state).expect("save");
        let loaded = store.load().expect("load").expect("state present");
        assert_eq!(loaded, state);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_replaces_without_leaving_the_temp_file() {
        let path = temp_state_path("replace");
        let store = StateStore::new(&path);
        let state = TrialState::fresh(&SessionConfig::default());

        store.save(&state).expect("first save");
        store.save(&state).expect("second save");
        assert!(!store.temp_path().exists());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_store_is_an_error_not_a_fresh_session() {
        let path = temp_state_path("corrupt");
        fs::write(&path, "{\"events_processed\": } nope").expect("write garbage");

        let store = StateStore::new(&path);
        match store.load() {
            Err(StoreError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }

        let _ = fs::remove_file(&path);
    }
}
