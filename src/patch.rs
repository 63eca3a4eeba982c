//! Patch application: ordered edits over a line buffer, re-indexed per edit.
//!
//! Every edit resolves against a fresh index of the buffer as it stands
//! after the previous edit. Any failure aborts the whole request; the file
//! is only written once every edit has succeeded and the result parses.

use crate::config::EngineConfig;
use crate::diff::unified_diff;
use crate::edit::{atomic_write, segment_matches, Edit, EditError, LineBuffer};
use crate::index::build_index;
use crate::locator::{resolve_anchor, resolve_target, AnchorDescriptor, TargetDescriptor};
use crate::ts::{validate_syntax, TreeSitterError};
use crate::validate::{validate_attr_change, validate_param_change, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Stable failure categories, reported to callers as kebab-case codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    TargetNotFound,
    AnchorNotFound,
    PreconditionFailed,
    InvalidEdit,
    UnsafeEdit,
    InvalidTarget,
    InvalidAnchor,
    Io,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax-error",
            ErrorKind::TargetNotFound => "target-not-found",
            ErrorKind::AnchorNotFound => "anchor-not-found",
            ErrorKind::PreconditionFailed => "precondition-failed",
            ErrorKind::InvalidEdit => "invalid-edit",
            ErrorKind::UnsafeEdit => "unsafe-edit",
            ErrorKind::InvalidTarget => "invalid-target",
            ErrorKind::InvalidAnchor => "invalid-anchor",
            ErrorKind::Io => "io-error",
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("source does not parse: {0}")]
    Syntax(#[from] TreeSitterError),

    #[error("patched source would not parse: {source}")]
    BrokenResult {
        #[source]
        source: TreeSitterError,
    },

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid request: {0}")]
    InvalidPayload(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::Syntax(_) | PatchError::BrokenResult { .. } => ErrorKind::SyntaxError,
            PatchError::Edit(err) => match err {
                EditError::TargetNotFound { .. } | EditError::InvalidRange { .. } => {
                    ErrorKind::TargetNotFound
                }
                EditError::AnchorNotFound { .. } => ErrorKind::AnchorNotFound,
                EditError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
                EditError::MissingName { .. } => ErrorKind::InvalidEdit,
                EditError::Io(_) => ErrorKind::Io,
            },
            PatchError::Validation(err) if err.is_unsafe() => ErrorKind::UnsafeEdit,
            PatchError::Validation(_) | PatchError::InvalidPayload(_) => ErrorKind::InvalidEdit,
            PatchError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            PatchError::InvalidAnchor(_) => ErrorKind::InvalidAnchor,
            PatchError::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Where an edit landed, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedEdit {
    Replace {
        target: TargetDescriptor,
        #[serde(rename = "startLine")]
        start_line: usize,
        #[serde(rename = "endLine")]
        end_line: usize,
        label: String,
    },
    Insert {
        anchor: AnchorDescriptor,
        /// 1-based line of the first inserted line
        line: usize,
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub content: String,
    pub applied: Vec<AppliedEdit>,
}

/// Apply `edits` to `source` in order, entirely in memory.
pub fn apply_edits(source: &str, edits: &[Edit], config: &EngineConfig) -> Result<PatchOutcome, PatchError> {
    let mut buffer = LineBuffer::new(source);
    let mut applied = Vec::with_capacity(edits.len());

    for (position, edit) in edits.iter().enumerate() {
        let index = build_index(&buffer.text(), config)?;

        let record = match edit {
            Edit::Replace {
                target,
                before,
                after,
            } => {
                let region = resolve_target(target, &index, &buffer)?;
                debug!(
                    position,
                    label = %region.label,
                    start_line = region.start_line,
                    end_line = region.end_line,
                    "resolved target"
                );

                if !segment_matches(&region.current_text, before) {
                    return Err(EditError::PreconditionFailed {
                        label: region.label,
                        start_line: region.start_line,
                        end_line: region.end_line,
                        expected: before.clone(),
                        found: region.current_text,
                    }
                    .into());
                }

                match target {
                    TargetDescriptor::Param { .. } => {
                        validate_param_change(&region.current_text, after, config)?
                    }
                    TargetDescriptor::Attr { .. } => {
                        validate_attr_change(&region.current_text, after, config)?
                    }
                    _ => {}
                }

                buffer.replace(region.start_line, region.end_line, after);
                AppliedEdit::Replace {
                    target: target.clone(),
                    start_line: region.start_line,
                    end_line: region.end_line,
                    label: region.label,
                }
            }
            Edit::Insert { anchor, content } => {
                let resolved = resolve_anchor(anchor, &index, &buffer, config)?;
                debug!(
                    position,
                    label = %resolved.label,
                    insert_at = resolved.insert_at,
                    "resolved anchor"
                );

                buffer.insert(resolved.insert_at, content);
                AppliedEdit::Insert {
                    anchor: anchor.clone(),
                    line: resolved.insert_at + 1,
                    label: resolved.label,
                }
            }
        };

        info!(position, kind = edit.kind(), "applied edit");
        applied.push(record);
    }

    let content = buffer.text();
    if let Err(source) = validate_syntax(&content) {
        if applied.is_empty() {
            return Err(PatchError::Syntax(source));
        }
        warn!(edits = applied.len(), error = %source, "patched source does not parse");
        return Err(PatchError::BrokenResult { source });
    }

    Ok(PatchOutcome { content, applied })
}

/// Turn one JSON edit object into an [`Edit`].
pub fn parse_edit(value: &Value) -> Result<Edit, PatchError> {
    let Some(object) = value.as_object() else {
        return Err(PatchError::InvalidPayload("each edit must be an object".into()));
    };
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or("").trim();

    match kind {
        "replace" => {
            let target = match object.get("target") {
                Some(target @ Value::Object(_)) => TargetDescriptor::deserialize(target)
                    .map_err(|err| PatchError::InvalidTarget(err.to_string()))?,
                _ => {
                    return Err(PatchError::InvalidTarget(
                        "replace edits require a target object".into(),
                    ))
                }
            };
            let text = |field: &str| {
                object
                    .get(field)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PatchError::InvalidPayload(format!("replace edits require a '{field}' string"))
                    })
            };
            Ok(Edit::Replace {
                target,
                before: text("before")?,
                after: text("after")?,
            })
        }
        "insert" => {
            let anchor = match object.get("anchor") {
                Some(anchor @ Value::Object(_)) => AnchorDescriptor::deserialize(anchor)
                    .map_err(|err| PatchError::InvalidAnchor(err.to_string()))?,
                _ => {
                    return Err(PatchError::InvalidAnchor(
                        "insert edits require an anchor object".into(),
                    ))
                }
            };
            let content = object
                .get("after")
                .and_then(Value::as_str)
                .or_else(|| object.get("content").and_then(Value::as_str))
                .ok_or_else(|| PatchError::InvalidPayload("insert edits require content".into()))?;
            Ok(Edit::insert(anchor, content))
        }
        other => Err(PatchError::InvalidPayload(format!(
            "unknown edit kind '{other}'"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct EditsRequest {
    edits: Vec<Value>,
    #[serde(default, rename = "dryRun")]
    dry_run: bool,
}

/// A named value change for the `params apply` / `attrs apply` modes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Change {
    pub name: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Deserialize)]
struct ChangesRequest {
    changes: Vec<Change>,
    #[serde(default, rename = "dryRun")]
    dry_run: bool,
}

/// Which kind of target a list of changes addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    Params,
    Attrs,
}

/// Each change becomes a guarded replace on its param or attr.
pub fn changes_to_edits(mode: ChangeMode, changes: &[Change]) -> Vec<Edit> {
    changes
        .iter()
        .map(|change| {
            let target = match mode {
                ChangeMode::Params => TargetDescriptor::param(&change.name),
                ChangeMode::Attrs => TargetDescriptor::attr(&change.name),
            };
            Edit::replace(target, &change.before, &change.after)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub success: bool,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub diff: String,
    pub content: String,
    pub applied: Vec<AppliedEdit>,
    #[serde(skip)]
    pub original: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangesReport {
    pub success: bool,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub applied: Vec<AppliedEdit>,
}

pub fn read_source(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn persist(path: &Path, original: &str, content: &str, dry_run: bool) -> Result<(), PatchError> {
    if dry_run || original == content {
        debug!(path = %path.display(), dry_run, "nothing written");
        return Ok(());
    }
    atomic_write(path, content.as_bytes())?;
    info!(path = %path.display(), bytes = content.len(), "wrote patched source");
    Ok(())
}

/// `apply` mode: `{edits, dryRun}` against the file at `path`.
pub fn run_apply(path: &Path, payload: Value, config: &EngineConfig) -> Result<ApplyReport, PatchError> {
    let request: EditsRequest =
        serde_json::from_value(payload).map_err(|err| PatchError::InvalidPayload(err.to_string()))?;
    let edits = request
        .edits
        .iter()
        .map(parse_edit)
        .collect::<Result<Vec<_>, _>>()?;

    let original = read_source(path)?;
    let outcome = apply_edits(&original, &edits, config)?;
    persist(path, &original, &outcome.content, request.dry_run)?;

    Ok(ApplyReport {
        success: true,
        dry_run: request.dry_run,
        diff: unified_diff(&original, &outcome.content),
        content: outcome.content,
        applied: outcome.applied,
        original,
    })
}

/// `params apply` / `attrs apply` mode: `{changes, dryRun}`.
pub fn run_changes(
    path: &Path,
    mode: ChangeMode,
    payload: Value,
    config: &EngineConfig,
) -> Result<ChangesReport, PatchError> {
    let request: ChangesRequest =
        serde_json::from_value(payload).map_err(|err| PatchError::InvalidPayload(err.to_string()))?;
    let edits = changes_to_edits(mode, &request.changes);

    let original = read_source(path)?;
    let outcome = apply_edits(&original, &edits, config)?;
    persist(path, &original, &outcome.content, request.dry_run)?;

    Ok(ChangesReport {
        success: true,
        dry_run: request.dry_run,
        applied: outcome.applied,
    })
}
