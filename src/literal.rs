//! Python literal evaluation over tree-sitter nodes.
//!
//! Mirrors what a literal-only evaluator accepts: strings, numbers, booleans,
//! `None`, signed numbers and containers built from those. Anything else
//! (names, calls, f-strings, arithmetic) evaluates to `None`.

use serde_json::{Map, Number, Value};
use tree_sitter::Node;

/// Evaluate a literal expression into its JSON form.
///
/// Returns `None` when the node is not a literal or has no JSON
/// representation (complex numbers, non-finite floats, out-of-range ints).
pub fn evaluate(node: Node<'_>, source: &str) -> Option<Value> {
    match node.kind() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "none" => Some(Value::Null),
        "integer" => parse_integer(text(node, source)).map(Value::Number),
        "float" => parse_float(text(node, source)).map(Value::Number),
        "string" => string_value(node, source).map(Value::String),
        "concatenated_string" => {
            let mut out = String::new();
            for part in named_children(node) {
                out.push_str(&string_value(part, source)?);
            }
            Some(Value::String(out))
        }
        "unary_operator" => {
            let operand = node.child_by_field_name("argument")?;
            let op = node.child_by_field_name("operator")?;
            if !matches!(operand.kind(), "integer" | "float") {
                return None;
            }
            let value = evaluate(operand, source)?;
            match text(op, source) {
                "+" => Some(value),
                "-" => negate(value),
                _ => None,
            }
        }
        "parenthesized_expression" => {
            let inner = named_children(node).into_iter().next()?;
            evaluate(inner, source)
        }
        "tuple" | "list" | "set" => named_children(node)
            .into_iter()
            .map(|child| evaluate(child, source))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        "dictionary" => {
            let mut map = Map::new();
            for pair in named_children(node) {
                if pair.kind() != "pair" {
                    return None;
                }
                let key = evaluate(pair.child_by_field_name("key")?, source)?;
                let value = evaluate(pair.child_by_field_name("value")?, source)?;
                map.insert(json_key(key), value);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

/// Whether a node is a single constant: a string, number, boolean, `None`,
/// `...`, or a sign applied to a number.
pub fn is_constant(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "true" | "false" | "none" | "ellipsis" | "integer" | "float" => true,
        "string" => !is_interpolated(node, source),
        "concatenated_string" => named_children(node)
            .into_iter()
            .all(|part| part.kind() == "string" && !is_interpolated(part, source)),
        "unary_operator" => {
            let sign_ok = node
                .child_by_field_name("operator")
                .is_some_and(|op| matches!(text(op, source), "-" | "+"));
            let numeric = node
                .child_by_field_name("argument")
                .is_some_and(|arg| matches!(arg.kind(), "integer" | "float"));
            sign_ok && numeric
        }
        _ => false,
    }
}

fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

fn negate(value: Value) -> Option<Value> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(i) = number.as_i64() {
        return i.checked_neg().map(|n| Value::Number(n.into()));
    }
    if let Some(u) = number.as_u64() {
        // 2**63 is the only u64 whose negation fits in i64
        return (u == 1 << 63).then(|| Value::Number(i64::MIN.into()));
    }
    number
        .as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
}

fn json_key(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn parse_integer(raw: &str) -> Option<Number> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    if lower.ends_with('j') || lower.ends_with('l') {
        return None;
    }
    let (digits, radix) = match lower.get(..2) {
        Some("0x") => (&lower[2..], 16),
        Some("0o") => (&lower[2..], 8),
        Some("0b") => (&lower[2..], 2),
        _ => (lower.as_str(), 10),
    };
    u64::from_str_radix(digits, radix).ok().map(Number::from)
}

fn parse_float(raw: &str) -> Option<Number> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    if cleaned.ends_with(['j', 'J']) {
        return None;
    }
    cleaned.parse::<f64>().ok().and_then(Number::from_f64)
}

fn string_prefix<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    let raw = text(node, source);
    let quote = raw.find(['"', '\'']).unwrap_or(0);
    &raw[..quote]
}

fn is_interpolated(node: Node<'_>, source: &str) -> bool {
    string_prefix(node, source).to_ascii_lowercase().contains('f')
}

/// Decode a single `string` node. Bytes and f-strings are not text literals.
fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let prefix = string_prefix(node, source).to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }
    let raw_mode = prefix.contains('r');

    let raw = text(node, source);
    let body = &raw[prefix.len()..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < quote_len * 2 {
        return None;
    }
    let inner = &body[quote_len..body.len() - quote_len];

    if raw_mode {
        Some(inner.to_string())
    } else {
        unescape(inner)
    }
}

fn unescape(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0B}'),
            '0'..='7' => {
                let mut digits = String::from(escaped);
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                let code = u32::from_str_radix(&digits, 8).ok()?;
                out.push(char::from_u32(code)?);
            }
            'x' => out.push(hex_escape(&mut chars, 2)?),
            'u' => out.push(hex_escape(&mut chars, 4)?),
            'U' => out.push(hex_escape(&mut chars, 8)?),
            // \N{NAME} needs the unicode name table; not evaluated
            'N' => return None,
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Some(out)
}

fn hex_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, len: usize) -> Option<char> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return None;
    }
    char::from_u32(u32::from_str_radix(&digits, 16).ok()?)
}
