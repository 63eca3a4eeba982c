//! Tree-sitter integration for structural Python code queries.
//!
//! This module provides CST-based parsing of Python sources using the
//! grammar shipped with ast-grep-language, with line-exact span helpers
//! that mirror the statement boundaries the Python compiler reports.

pub mod errors;
pub mod parser;
pub mod query;
pub mod validator;

pub use errors::TreeSitterError;
pub use parser::{ParsedSource, PythonParser};
pub use query::{QueryEngine, QueryMatch};
pub use validator::{dedent, validate_syntax};
