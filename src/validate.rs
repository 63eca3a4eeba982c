//! Safety validation for replace edits on parameters and attributes.
//!
//! Both snippets are parsed as single assignment statements and reduced to a
//! signature: a map from named slots (`value`, `callee`, `arg[0]`,
//! `kw:default`, ...) to a structural serialization that ignores layout and
//! comments. An edit is safe when the only slots that differ are the ones the
//! mode allows.
//!
//! # Modes
//!
//! - **Attribute**: only `value` may change, and both values must be literal
//!   constants.
//! - **Parameter**: only the configured keywords (default `default=`) may
//!   change; callee and positional arguments are fixed.
//!
//! In both modes the first code line keeps its exact leading whitespace.

use crate::config::EngineConfig;
use crate::index::{call_arguments, split_assignment, statement_assignment, terminal_name};
use crate::literal;
use crate::pool;
use crate::ts::parser::statements_of;
use crate::ts::{dedent, ParsedSource, TreeSitterError};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tree_sitter::Node;

/// Which snippet of a before/after pair an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Before => write!(f, "before"),
            Side::After => write!(f, "after"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{side} snippet does not parse: {source}")]
    Unparseable {
        side: Side,
        #[source]
        source: TreeSitterError,
    },

    #[error("{side} snippet must be exactly one statement, found {count}")]
    NotSingleStatement { side: Side, count: usize },

    #[error("{side} snippet must be an assignment, found {kind}")]
    NotAnAssignment { side: Side, kind: String },

    #[error("{side} snippet must assign exactly one bare name")]
    TargetNotSingleName { side: Side },

    #[error("{side} snippet assigns no value")]
    MissingValue { side: Side },

    #[error("assignment target changed from '{before}' to '{after}'")]
    TargetChanged { before: String, after: String },

    #[error("attribute '{name}' is not whitelisted")]
    NotWhitelisted { name: String },

    #[error("{side} value is not a literal constant")]
    NonLiteralValue { side: Side },

    #[error("{side} value is not a parameter constructor call")]
    NotParameterCall { side: Side },

    #[error("protected parts changed: {}", .slots.join(", "))]
    SignatureChanged { slots: Vec<String> },

    #[error("indentation changed from {before:?} to {after:?}")]
    IndentationChanged { before: String, after: String },
}

impl ValidationError {
    /// Whether the snippets were well-formed but the change is not allowed.
    ///
    /// `false` means the snippets themselves are malformed.
    pub fn is_unsafe(&self) -> bool {
        matches!(
            self,
            ValidationError::TargetChanged { .. }
                | ValidationError::NotWhitelisted { .. }
                | ValidationError::NonLiteralValue { .. }
                | ValidationError::NotParameterCall { .. }
                | ValidationError::SignatureChanged { .. }
                | ValidationError::IndentationChanged { .. }
        )
    }
}

/// Slot name to structural serialization.
pub type Signature = BTreeMap<String, String>;

/// Slots whose serialization differs, excluding `allowed`.
///
/// A slot present on one side only counts as differing.
pub fn compare_signatures(before: &Signature, after: &Signature, allowed: &[String]) -> Vec<String> {
    let mut changed: Vec<String> = before
        .keys()
        .chain(after.keys())
        .filter(|slot| before.get(*slot) != after.get(*slot))
        .filter(|slot| !allowed.contains(slot))
        .cloned()
        .collect();
    changed.sort();
    changed.dedup();
    changed
}

fn ensure_same(before: &Signature, after: &Signature, allowed: &[String]) -> Result<(), ValidationError> {
    let slots = compare_signatures(before, after, allowed);
    if slots.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::SignatureChanged { slots })
    }
}

/// Leading whitespace of the first line holding code.
fn indentation(snippet: &str) -> &str {
    snippet
        .lines()
        .map(|line| (line, line.trim_start()))
        .find(|(_, code)| !code.is_empty() && !code.starts_with('#'))
        .map(|(line, code)| &line[..line.len() - code.len()])
        .unwrap_or("")
}

fn ensure_same_indentation(before: &str, after: &str) -> Result<(), ValidationError> {
    let (old, new) = (indentation(before), indentation(after));
    if old == new {
        Ok(())
    } else {
        Err(ValidationError::IndentationChanged {
            before: old.to_string(),
            after: new.to_string(),
        })
    }
}

struct AttrShape {
    name: String,
    constant: bool,
    signature: Signature,
}

struct ParamShape {
    name: String,
    constructor_call: bool,
    signature: Signature,
}

/// Check that an attribute edit only swaps one literal constant for another.
pub fn validate_attr_change(before: &str, after: &str, config: &EngineConfig) -> Result<(), ValidationError> {
    let old = with_assignment(before, Side::Before, |node, parsed| attr_shape(node, parsed, Side::Before))?;
    let new = with_assignment(after, Side::After, |node, parsed| attr_shape(node, parsed, Side::After))?;

    if old.name != new.name {
        return Err(ValidationError::TargetChanged {
            before: old.name,
            after: new.name,
        });
    }
    ensure_same_indentation(before, after)?;
    if !config.is_whitelisted(&old.name) {
        return Err(ValidationError::NotWhitelisted { name: old.name });
    }
    for (side, shape) in [(Side::Before, &old), (Side::After, &new)] {
        if !shape.constant {
            return Err(ValidationError::NonLiteralValue { side });
        }
    }

    ensure_same(&old.signature, &new.signature, &["value".to_string()])
}

/// Check that a parameter edit only touches the mutable keywords.
pub fn validate_param_change(before: &str, after: &str, config: &EngineConfig) -> Result<(), ValidationError> {
    let old = with_assignment(before, Side::Before, |node, parsed| {
        param_shape(node, parsed, config, Side::Before)
    })?;
    let new = with_assignment(after, Side::After, |node, parsed| {
        param_shape(node, parsed, config, Side::After)
    })?;

    if old.name != new.name {
        return Err(ValidationError::TargetChanged {
            before: old.name,
            after: new.name,
        });
    }
    ensure_same_indentation(before, after)?;
    for (side, shape) in [(Side::Before, &old), (Side::After, &new)] {
        if !shape.constructor_call {
            return Err(ValidationError::NotParameterCall { side });
        }
    }

    let allowed: Vec<String> = config
        .params
        .mutable_keywords
        .iter()
        .map(|keyword| format!("kw:{keyword}"))
        .collect();
    ensure_same(&old.signature, &new.signature, &allowed)
}

/// Parse `snippet` (dedented) and hand its single assignment to `f`.
fn with_assignment<T>(
    snippet: &str,
    side: Side,
    f: impl FnOnce(Node<'_>, &ParsedSource<'_>) -> Result<T, ValidationError>,
) -> Result<T, ValidationError> {
    let source = dedent(snippet);
    pool::with_parser(|parser| {
        let parsed = parser
            .parse_with_source(&source)
            .map_err(|source| ValidationError::Unparseable { side, source })?;
        parsed
            .ensure_valid()
            .map_err(|source| ValidationError::Unparseable { side, source })?;

        let statements = parsed.statements();
        let [statement] = statements.as_slice() else {
            return Err(ValidationError::NotSingleStatement {
                side,
                count: statements.len(),
            });
        };
        let assignment = statement_assignment(*statement).ok_or_else(|| ValidationError::NotAnAssignment {
            side,
            kind: statement.kind().to_string(),
        })?;
        f(assignment, &parsed)
    })
    .map_err(|source| ValidationError::Unparseable { side, source })?
}

fn attr_shape(assignment: Node<'_>, parsed: &ParsedSource<'_>, side: Side) -> Result<AttrShape, ValidationError> {
    let parts = split_assignment(assignment);
    let [target] = parts.targets.as_slice() else {
        return Err(ValidationError::TargetNotSingleName { side });
    };
    if target.kind() != "identifier" {
        return Err(ValidationError::TargetNotSingleName { side });
    }
    let value = parts.value.ok_or(ValidationError::MissingValue { side })?;

    let mut signature = Signature::new();
    if let Some(annotation) = annotation_of(assignment) {
        signature.insert("annotation".into(), structural(annotation, parsed.source));
    }
    signature.insert("value".into(), structural(value, parsed.source));

    Ok(AttrShape {
        name: parsed.node_text(*target).to_string(),
        constant: literal::is_constant(value, parsed.source),
        signature,
    })
}

fn param_shape(
    assignment: Node<'_>,
    parsed: &ParsedSource<'_>,
    config: &EngineConfig,
    side: Side,
) -> Result<ParamShape, ValidationError> {
    let parts = split_assignment(assignment);
    let names: Vec<&str> = parts
        .targets
        .iter()
        .filter(|target| target.kind() == "identifier")
        .map(|target| parsed.node_text(*target))
        .collect();
    let [name] = names.as_slice() else {
        return Err(ValidationError::TargetNotSingleName { side });
    };
    let value = parts.value.ok_or(ValidationError::MissingValue { side })?;

    let mut signature = Signature::new();
    if let Some(annotation) = annotation_of(assignment) {
        signature.insert("annotation".into(), structural(annotation, parsed.source));
    }

    let callee = (value.kind() == "call")
        .then(|| value.child_by_field_name("function"))
        .flatten()
        .and_then(|function| terminal_name(function, parsed));
    let Some(callee) = callee else {
        return Ok(ParamShape {
            name: name.to_string(),
            constructor_call: false,
            signature,
        });
    };

    signature.insert("callee".into(), callee.to_string());
    let arguments = call_arguments(value, parsed);
    for (idx, arg) in arguments.positional.iter().enumerate() {
        signature.insert(format!("arg[{idx}]"), structural(*arg, parsed.source));
    }
    for (keyword, arg) in &arguments.keywords {
        signature.insert(format!("kw:{keyword}"), structural(*arg, parsed.source));
    }
    for (idx, splat) in arguments.unpacked_keywords.iter().enumerate() {
        signature.insert(format!("**[{idx}]"), structural(*splat, parsed.source));
    }

    Ok(ParamShape {
        name: name.to_string(),
        constructor_call: config.is_param_constructor(callee),
        signature,
    })
}

fn annotation_of(assignment: Node<'_>) -> Option<Node<'_>> {
    assignment.child_by_field_name("type")
}

/// Layout-independent serialization of an expression.
///
/// Scalar literals serialize by value, so `0x10` equals `16` and `'a'`
/// equals `"a"`. Comments, commas and redundant parentheses are dropped.
pub fn structural(node: Node<'_>, source: &str) -> String {
    let mut out = String::new();
    write_structure(node, source, &mut out);
    out
}

fn write_structure(node: Node<'_>, source: &str, out: &mut String) {
    if node.kind() == "parenthesized_expression" {
        if let [inner] = statements_of(node).as_slice() {
            return write_structure(*inner, source, out);
        }
    }

    if matches!(
        node.kind(),
        "integer" | "float" | "string" | "concatenated_string" | "true" | "false" | "none"
    ) {
        if let Some(value) = literal::evaluate(node, source) {
            out.push_str("(const ");
            out.push_str(&value.to_string());
            out.push(')');
            return;
        }
    }

    if node.child_count() == 0 {
        out.push_str(&source[node.byte_range()]);
        return;
    }

    out.push('(');
    out.push_str(node.kind());
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node
        .children(&mut cursor)
        .filter(|child| !child.is_extra() && child.kind() != ",")
        .collect();
    for child in children {
        out.push(' ');
        write_structure(child, source, out);
    }
    out.push(')');
}
