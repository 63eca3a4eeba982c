use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSitterError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("invalid tree-sitter query: {message}")]
    InvalidQuery { message: String },

    #[error("syntax error at line {line}, column {column}")]
    SyntaxError { line: usize, column: usize },

    #[error("{count} syntax errors, first at line {line}, column {column}")]
    MultipleSyntaxErrors {
        count: usize,
        line: usize,
        column: usize,
    },
}
