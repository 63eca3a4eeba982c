use crate::pool;
use crate::ts::errors::TreeSitterError;

/// Validate that Python source code has no syntax errors.
///
/// Returns Ok(()) if the code parses without ERROR or MISSING nodes.
pub fn validate_syntax(source: &str) -> Result<(), TreeSitterError> {
    pool::with_parser(|parser| {
        let parsed = parser.parse_with_source(source)?;
        parsed.ensure_valid()
    })?
}

/// Remove the whitespace prefix shared by every non-blank line.
///
/// Lines made only of whitespace are normalized to their line terminator and
/// do not take part in computing the common prefix.
pub fn dedent(text: &str) -> String {
    let margin = text
        .split_inclusive('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
            &line[..indent_len]
        })
        .reduce(common_prefix);

    let margin = margin.unwrap_or("");
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.trim_start_matches(|c: char| c.is_whitespace() && c != '\n' && c != '\r')
            } else {
                &line[margin.len()..]
            }
        })
        .collect()
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_valid_syntax() {
        let source = r#"
def main():
    print("hello")
"#;
        assert!(validate_syntax(source).is_ok());
    }

    #[test]
    fn validate_invalid_syntax() {
        let result = validate_syntax("def main(:\n    pass\n");
        assert!(result.is_err());
    }

    #[test]
    fn dedent_class_body_statement() {
        assert_eq!(dedent("    x = 1\n"), "x = 1\n");
        assert_eq!(
            dedent("    x = f(\n        1,\n    )\n"),
            "x = f(\n    1,\n)\n"
        );
    }

    #[test]
    fn dedent_ignores_blank_lines() {
        assert_eq!(dedent("    a = 1\n\n    b = 2"), "a = 1\n\nb = 2");
        assert_eq!(dedent("  \n    a = 1\n"), "\na = 1\n");
    }

    #[test]
    fn dedent_mixed_margins_keeps_common_part() {
        assert_eq!(dedent("\tx = 1\n    y = 2\n"), "\tx = 1\n    y = 2\n");
        assert_eq!(dedent("  x = 1\n    y = 2\n"), "x = 1\n  y = 2\n");
    }
}
