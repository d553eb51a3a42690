use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use contracts::TestimonyEvent;

/// A line that failed to parse or validate, reported but never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineWarning {
    pub line_number: usize,
    pub reason: String,
}

/// Everything present in the stream at call time, in file order. The
/// caller slices `events` at its resume cursor; invalid lines appear only
/// in `warnings` and never shift valid-event indices between re-reads of
/// an append-only stream.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBatch {
    pub events: Vec<TestimonyEvent>,
    pub warnings: Vec<LineWarning>,
}

#[derive(Debug)]
pub enum SourceError {
    /// The stream file is not there yet; retry on the next poll.
    Unavailable(PathBuf),
    Io(std::io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(path) => write!(f, "transcript not available: {}", path.display()),
            Self::Io(err) => write!(f, "transcript io error: {err}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Read the full current transcript. One JSON object per line; blank lines
/// are ignored; lines that do not parse as a valid `TestimonyEvent` are
/// skipped with a line-numbered warning. File order is preserved and no
/// timestamp monotonicity is assumed.
pub fn read_transcript(path: impl AsRef<Path>) -> Result<TranscriptBatch, SourceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SourceError::Unavailable(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut batch = TranscriptBatch::default();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TestimonyEvent>(&line) {
            Ok(event) => match validate_event(&event) {
                Ok(()) => batch.events.push(event),
                Err(reason) => push_warning(&mut batch, path, line_number, reason),
            },
            Err(err) => push_warning(&mut batch, path, line_number, err.to_string()),
        }
    }

    Ok(batch)
}

/// Required-field and enum membership are enforced by deserialization;
/// this covers the remaining validity invariants.
pub fn validate_event(event: &TestimonyEvent) -> Result<(), String> {
    if event.speaker_name.trim().is_empty() {
        return Err("speaker_name is blank".to_string());
    }
    if event.text.trim().is_empty() {
        return Err("text is blank".to_string());
    }
    if DateTime::parse_from_rfc3339(&event.timestamp).is_err() {
        return Err(format!("timestamp is not ISO-8601: {}", event.timestamp));
    }
    Ok(())
}

fn push_warning(batch: &mut TranscriptBatch, path: &Path, line_number: usize, reason: String) {
    log::warn!(
        "skipping line {} of {}: {}",
        line_number,
        path.display(),
        reason
    );
    batch.warnings.push(LineWarning {
        line_number,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_transcript(name: &str, contents: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("second_chair_{name}_{nanos}.jsonl"));
        let mut file = File::create(&path).expect("create transcript");
        file.write_all(contents.as_bytes()).expect("write transcript");
        path
    }

    fn valid_line(speaker: &str, minute: u32) -> String {
        format!(
            concat!(
                "{{\"timestamp\":\"2026-03-02T10:{:02}:00Z\",",
                "\"speaker_role\":\"witness\",\"speaker_name\":\"{}\",",
                "\"phase\":\"direct\",\"text\":\"the shipment left on time\",",
                "\"topic_tags\":[\"shipping\"],\"credibility_signal\":\"helpful\"}}"
            ),
            minute, speaker
        )
    }

    #[test]
    fn missing_file_is_unavailable_not_fatal() {
        let path = std::env::temp_dir().join("second_chair_never_written.jsonl");
        match read_transcript(&path) {
            Err(SourceError::Unavailable(reported)) => assert_eq!(reported, path),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn malformed_line_between_valid_lines_warns_and_continues() {
        let contents = format!(
            "{}\nnot json at all\n{}\n",
            valid_line("dana.w", 1),
            valid_line("omar.k", 2)
        );
        let path = temp_transcript("malformed", &contents);
        let batch = read_transcript(&path).expect("batch");
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].line_number, 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_fields_are_ignored_missing_fields_warn() {
        let extra = concat!(
            "{\"timestamp\":\"2026-03-02T10:05:00Z\",\"speaker_role\":\"witness\",",
            "\"speaker_name\":\"dana.w\",\"phase\":\"cross\",\"text\":\"yes\",",
            "\"credibility_signal\":\"neutral\",\"intake_build\":\"7.2.1\"}"
        );
        let missing = "{\"timestamp\":\"2026-03-02T10:06:00Z\",\"speaker_role\":\"witness\"}";
        let path = temp_transcript("fields", &format!("{extra}\n{missing}\n"));
        let batch = read_transcript(&path).expect("batch");
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].line_number, 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn blank_speaker_or_bad_timestamp_is_invalid() {
        let blank_speaker = concat!(
            "{\"timestamp\":\"2026-03-02T10:07:00Z\",\"speaker_role\":\"witness\",",
            "\"speaker_name\":\"  \",\"phase\":\"direct\",\"text\":\"yes\",",
            "\"credibility_signal\":\"neutral\"}"
        );
        let bad_timestamp = concat!(
            "{\"timestamp\":\"yesterday\",\"speaker_role\":\"witness\",",
            "\"speaker_name\":\"dana.w\",\"phase\":\"direct\",\"text\":\"yes\",",
            "\"credibility_signal\":\"neutral\"}"
        );
        let path = temp_transcript("invalid", &format!("{blank_speaker}\n{bad_timestamp}\n"));
        let batch = read_transcript(&path).expect("batch");
        assert!(batch.events.is_empty());
        assert_eq!(batch.warnings.len(), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reread_after_append_returns_full_sequence() {
        let path = temp_transcript("append", &format!("{}\n", valid_line("dana.w", 1)));
        assert_eq!(read_transcript(&path).expect("batch").events.len(), 1);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("reopen");
        writeln!(file, "{}", valid_line("omar.k", 2)).expect("append");

        let batch = read_transcript(&path).expect("batch");
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].speaker_name, "dana.w");
        let _ = std::fs::remove_file(&path);
    }
}
