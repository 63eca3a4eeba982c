use colored::Colorize;
use similar::{ChangeTag, DiffOp, TextDiff};
use std::ops::Range;

const CONTEXT_LINES: usize = 3;

/// Unified diff between two texts, `--- before` / `+++ after`.
///
/// Lines are compared without their terminators and the result is joined
/// with `\n`, with no trailing newline. Identical inputs give an empty string.
pub fn unified_diff(before: &str, after: &str) -> String {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();
    let diff = TextDiff::from_slices(&old, &new);

    let groups = diff.grouped_ops(CONTEXT_LINES);
    if groups.is_empty() {
        return String::new();
    }

    let mut out = vec!["--- before".to_string(), "+++ after".to_string()];
    for group in &groups {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push(format!(
            "@@ -{} +{} @@",
            hunk_range(first.old_range().start..last.old_range().end),
            hunk_range(first.new_range().start..last.new_range().end),
        ));
        for op in group {
            push_changes(&diff, op, &mut out);
        }
    }
    out.join("\n")
}

fn push_changes(diff: &TextDiff<'_, '_, '_, str>, op: &DiffOp, out: &mut Vec<String>) {
    for change in diff.iter_changes(op) {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        out.push(format!("{sign}{}", change.value()));
    }
}

/// `start,len` with 1-based start; an empty range names the line before it.
fn hunk_range(range: Range<usize>) -> String {
    let len = range.end - range.start;
    match len {
        0 => format!("{},0", range.start),
        1 => format!("{}", range.start + 1),
        _ => format!("{},{}", range.start + 1, len),
    }
}

/// Print a colored line diff to stderr.
pub fn display_diff(label: &str, original: &str, modified: &str) {
    eprintln!("{}", format!("--- {label} (original)").dimmed());
    eprintln!("{}", format!("+++ {label} (patched)").dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for group in diff.grouped_ops(CONTEXT_LINES) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = change.value().trim_end_matches(['\r', '\n']);
                let rendered = match change.tag() {
                    ChangeTag::Delete => format!("-{line}").red(),
                    ChangeTag::Insert => format!("+{line}").green(),
                    ChangeTag::Equal => format!(" {line}").normal(),
                };
                eprintln!("{rendered}");
            }
        }
    }
}
