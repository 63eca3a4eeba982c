//! Resolution of edit descriptors to concrete line coordinates.
//!
//! Targets resolve to an inclusive `[start, end]` span plus its current
//! text; anchors resolve to a single 0-based splice point.

pub mod anchor;
pub mod target;

pub use anchor::{resolve_anchor, AnchorDescriptor, ResolvedAnchor};
pub use target::{resolve_target, ResolvedRegion, TargetDescriptor};

use crate::edit::EditError;

/// Closest candidate to `name` by edit distance, if any is close enough.
pub(crate) fn suggest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let wanted = name.to_lowercase();
    let max_dist = (name.len() / 4).max(2);
    candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .map(|candidate| (strsim::levenshtein(&wanted, &candidate.to_lowercase()), candidate))
        .filter(|(dist, _)| *dist <= max_dist)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, candidate)| candidate.to_string())
}

/// Trimmed name, or a `MissingName` error when nothing is left.
pub(crate) fn required_name<'a>(name: &'a str, kind: &'static str) -> Result<&'a str, EditError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(EditError::MissingName { kind })
    } else {
        Ok(trimmed)
    }
}
