//! Tolerant event log reader.

use std::fs;
use std::path::Path;

use sl_core::Event;

use crate::LogError;

/// Result of reading one events file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    pub events: Vec<Event>,
    /// Complete lines that were not valid events.
    pub skipped: usize,
    /// The file ended in an unterminated line, which was ignored.
    pub partial_tail: bool,
}

/// Reads every event from `path`, in file order.
///
/// A missing file reads as empty: the recorder creates it on rotation and a
/// summary may be requested before the first line lands.
pub fn read_events(path: &Path) -> Result<ReadOutcome, LogError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadOutcome::default()),
        Err(e) => return Err(LogError::io("read", path)(e)),
    };
    let outcome = parse_events(&bytes);
    tracing::debug!(
        path = %path.display(),
        events = outcome.events.len(),
        skipped = outcome.skipped,
        partial_tail = outcome.partial_tail,
        "read event log"
    );
    Ok(outcome)
}

/// Parses NDJSON bytes.
///
/// Blank lines are ignored; malformed lines (bad JSON, unknown kind, invalid
/// UTF-8 that no longer parses) are counted in [`ReadOutcome::skipped`].
pub fn parse_events(bytes: &[u8]) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();

    let complete = match bytes.iter().rposition(|&b| b == b'\n') {
        Some(last_newline) => {
            outcome.partial_tail = last_newline + 1 < bytes.len();
            &bytes[..=last_newline]
        }
        None => {
            outcome.partial_tail = !bytes.is_empty();
            &bytes[..0]
        }
    };

    for (line_num, raw) in complete.split(|&b| b == b'\n').enumerate() {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Event::from_json_line(line) {
            Ok(event) => outcome.events.push(event),
            Err(e) => {
                outcome.skipped += 1;
                tracing::trace!(line = line_num + 1, error = %e, "skipping malformed event line");
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_core::EventKind;

    const START: &str = r#"{"ts":"2026-03-01T10:00:00.000Z","event":"session_start","session_type":"PRACTICE","track":"monza","sector_count":3,"car_model":null}"#;
    const END: &str = r#"{"ts":"2026-03-01T10:05:00.000Z","event":"session_end"}"#;

    #[test]
    fn test_reads_complete_lines() {
        let outcome = parse_events(format!("{START}\n{END}\n").as_bytes());
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[1].kind, EventKind::SessionEnd);
        assert_eq!(outcome.skipped, 0);
        assert!(!outcome.partial_tail);
    }

    #[test]
    fn test_ignores_unterminated_last_line() {
        let outcome = parse_events(format!("{START}\n{{\"ts\":\"2026-03-01T1").as_bytes());
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.skipped, 0);
        assert!(outcome.partial_tail);

        let only_partial = parse_events(END.as_bytes());
        assert!(only_partial.events.is_empty());
        assert!(only_partial.partial_tail);
    }

    #[test]
    fn test_counts_malformed_lines() {
        let text = format!(
            "{START}\n{{malformed\n\n{{\"event\":\"teleport\"}}\n\u{fffd}\u{0}\n{END}\r\n"
        );
        let outcome = parse_events(text.as_bytes());
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.skipped, 3);
    }

    #[test]
    fn test_invalid_utf8_is_a_skipped_line() {
        let mut bytes = format!("{START}\n").into_bytes();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(format!("{END}\n").as_bytes());

        let outcome = parse_events(&bytes);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = read_events(&dir.path().join("absent.ndjson")).unwrap();
        assert_eq!(outcome, ReadOutcome::default());
    }

    #[test]
    fn test_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.ndjson");
        fs::write(&path, format!("{START}\n{END}\n")).unwrap();

        let outcome = read_events(&path).unwrap();
        assert_eq!(outcome.events.len(), 2);
    }
}
