//! Thread-local parser pooling.
//!
//! Every edit in a patch request re-parses the buffer, so a request with N
//! edits parses N + 1 times. Parsers are created once per thread and reused.

use crate::ts::{PythonParser, TreeSitterError};
use std::cell::RefCell;

thread_local! {
    static PYTHON_PARSER: RefCell<Option<PythonParser>> = const { RefCell::new(None) };
}

/// Execute function with pooled parser instance.
///
/// On first call per thread, creates new parser. Subsequent calls reuse
/// the same parser instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use strategy_patcher::pool::with_parser;
///
/// let has_errors = with_parser(|parser| {
///     parser.parse_with_source("x = 1\n").map(|parsed| parsed.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut PythonParser) -> R,
{
    PYTHON_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let mut parser = match slot.take() {
            Some(parser) => parser,
            None => PythonParser::new()?,
        };
        let result = f(&mut parser);
        *slot = Some(parser);
        Ok(result)
    })
}
