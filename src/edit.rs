use crate::locator::{AnchorDescriptor, TargetDescriptor};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// One step of a patch request.
///
/// Edits are applied strictly in order; each one resolves its target or
/// anchor against the source as it stands after the previous edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until it is applied"]
pub enum Edit {
    /// Replace a resolved region after checking its current text.
    Replace {
        target: TargetDescriptor,
        before: String,
        after: String,
    },
    /// Splice new lines in at a resolved anchor. No before-text check.
    Insert {
        anchor: AnchorDescriptor,
        content: String,
    },
}

impl Edit {
    pub fn replace(target: TargetDescriptor, before: impl Into<String>, after: impl Into<String>) -> Self {
        Edit::Replace {
            target,
            before: before.into(),
            after: after.into(),
        }
    }

    pub fn insert(anchor: AnchorDescriptor, content: impl Into<String>) -> Self {
        Edit::Insert {
            anchor,
            content: content.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Edit::Replace { .. } => "replace",
            Edit::Insert { .. } => "insert",
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{what} not found{}", suggestion_suffix(.suggestion))]
    TargetNotFound {
        what: String,
        suggestion: Option<String>,
    },

    #[error("anchor {what} not found{}", suggestion_suffix(.suggestion))]
    AnchorNotFound {
        what: String,
        suggestion: Option<String>,
    },

    #[error("{kind} target requires a non-empty name")]
    MissingName { kind: &'static str },

    #[error("invalid range {start_line}-{end_line} in a file of {line_count} lines")]
    InvalidRange {
        start_line: usize,
        end_line: usize,
        line_count: usize,
    },

    #[error("before-text mismatch at {label} (lines {start_line}-{end_line})")]
    PreconditionFailed {
        label: String,
        start_line: usize,
        end_line: usize,
        expected: String,
        found: String,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

/// Whether the current text of a region satisfies the caller's snapshot.
///
/// Line endings are normalized and a single trailing newline on either side
/// is ignored; everything else must match exactly.
pub fn segment_matches(current: &str, expected: &str) -> bool {
    normalize_snapshot(current) == normalize_snapshot(expected)
}

fn normalize_snapshot(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    match unified.strip_suffix('\n') {
        Some(stripped) => stripped.to_string(),
        None => unified,
    }
}

/// The source as a list of lines, each keeping its own terminator.
///
/// Line numbers taken by the accessors are 1-based and inclusive; splice
/// points are 0-based (the number of lines before the insertion).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(String::from).collect(),
        }
    }

    pub fn text(&self) -> String {
        self.lines.concat()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Verbatim text of lines `[start, end]`.
    pub fn segment(&self, start: usize, end: usize) -> String {
        let from = start.saturating_sub(1).min(self.lines.len());
        let to = end.min(self.lines.len()).max(from);
        self.lines[from..to].concat()
    }

    /// Replace lines `[start, end]` with the lines of `after`.
    ///
    /// When `after` drops the trailing newline of a region that had one, the
    /// region's own terminator is put back so the next line is not joined.
    pub fn replace(&mut self, start: usize, end: usize, after: &str) {
        let from = start.saturating_sub(1).min(self.lines.len());
        let to = end.min(self.lines.len()).max(from);

        let mut replacement: Vec<String> = after.split_inclusive('\n').map(String::from).collect();
        if let (Some(last_new), Some(last_old)) = (replacement.last_mut(), self.lines[from..to].last()) {
            if !last_new.ends_with('\n') {
                last_new.push_str(terminator(last_old));
            }
        }

        self.lines.splice(from..to, replacement);
    }

    /// Insert `content` so that it starts after the first `at` lines.
    pub fn insert(&mut self, at: usize, content: &str) {
        if content.is_empty() {
            return;
        }
        let at = at.min(self.lines.len());

        let mut content = content.to_string();
        if at < self.lines.len() && !content.ends_with('\n') {
            content.push('\n');
        }
        if at == self.lines.len() {
            if let Some(last) = self.lines.last_mut() {
                if !last.ends_with('\n') {
                    last.push('\n');
                }
            }
        }

        let new_lines: Vec<String> = content.split_inclusive('\n').map(String::from).collect();
        self.lines.splice(at..at, new_lines);
    }
}

fn terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the file is left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn snapshot_tolerates_one_trailing_newline_and_crlf() {
        assert!(segment_matches("x = 1\n", "x = 1"));
        assert!(segment_matches("x = 1", "x = 1\n"));
        assert!(segment_matches("a\r\nb\r\n", "a\nb\n"));
        assert!(!segment_matches("x = 1\n\n", "x = 1"));
        assert!(!segment_matches("x = 1\n", "x = 2\n"));
        assert!(!segment_matches("  x = 1\n", "x = 1\n"));
    }

    #[test]
    fn segment_is_inclusive_and_clamped() {
        let buffer = LineBuffer::new("a\nb\nc\n");
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.segment(2, 3), "b\nc\n");
        assert_eq!(buffer.segment(3, 10), "c\n");
        assert_eq!(buffer.segment(5, 6), "");
    }

    #[test]
    fn replace_splices_lines() {
        let mut buffer = LineBuffer::new("a\nb\nc\n");
        buffer.replace(2, 2, "x\ny\n");
        assert_eq!(buffer.text(), "a\nx\ny\nc\n");
        assert_eq!(buffer.line_count(), 4);
    }

    #[test]
    fn replace_restores_dropped_terminator() {
        let mut buffer = LineBuffer::new("a\r\nb\r\nc\r\n");
        buffer.replace(2, 2, "x");
        assert_eq!(buffer.text(), "a\r\nx\r\nc\r\n");

        let mut unterminated = LineBuffer::new("a\nb");
        unterminated.replace(2, 2, "x");
        assert_eq!(unterminated.text(), "a\nx");
    }

    #[test]
    fn replace_with_empty_text_deletes() {
        let mut buffer = LineBuffer::new("a\nb\nc\n");
        buffer.replace(1, 2, "");
        assert_eq!(buffer.text(), "c\n");
    }

    #[test]
    fn insert_terminates_content_before_existing_lines() {
        let mut buffer = LineBuffer::new("a\nb\n");
        buffer.insert(1, "x");
        assert_eq!(buffer.text(), "a\nx\nb\n");

        buffer.insert(0, "top\n");
        assert_eq!(buffer.text(), "top\na\nx\nb\n");
    }

    #[test]
    fn insert_at_end_terminates_last_line() {
        let mut buffer = LineBuffer::new("a\nb");
        buffer.insert(2, "c");
        assert_eq!(buffer.text(), "a\nb\nc");

        let mut empty = LineBuffer::new("");
        empty.insert(0, "x = 1\n");
        assert_eq!(empty.text(), "x = 1\n");
    }

    #[test]
    fn empty_insert_is_noop() {
        let mut buffer = LineBuffer::new("a\n");
        buffer.insert(0, "");
        assert_eq!(buffer.text(), "a\n");
    }

    #[test]
    fn not_found_messages_carry_suggestion() {
        let err = EditError::TargetNotFound {
            what: "function 'populate_indicator'".into(),
            suggestion: Some("populate_indicators".into()),
        };
        assert_eq!(
            err.to_string(),
            "function 'populate_indicator' not found (did you mean 'populate_indicators'?)"
        );
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strategy.py");
        fs::write(&path, "old\n").unwrap();

        atomic_write(&path, b"new\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }
}
