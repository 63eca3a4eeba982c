use crate::ts::errors::TreeSitterError;
use crate::ts::parser::ParsedSource;
use ast_grep_language::{LanguageExt, SupportLang};
use std::collections::HashMap;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

/// A match from a tree-sitter query with captured nodes.
#[derive(Debug, Clone)]
pub struct QueryMatch<'tree> {
    /// Named captures: capture_name -> node
    pub captures: HashMap<String, Node<'tree>>,
}

impl<'tree> QueryMatch<'tree> {
    /// Get a captured node by name.
    pub fn capture(&self, name: &str) -> Option<Node<'tree>> {
        self.captures.get(name).copied()
    }
}

/// Engine for executing tree-sitter queries against parsed Python source.
pub struct QueryEngine {
    query: Query,
    capture_names: Vec<String>,
}

impl QueryEngine {
    /// Create a new query engine from a tree-sitter query string.
    ///
    /// # Query Syntax
    ///
    /// Tree-sitter queries use S-expression syntax:
    /// ```text
    /// (expression_statement
    ///   (assignment
    ///     left: (identifier) @name
    ///     right: (call) @value))
    /// ```
    ///
    /// Captures are prefixed with `@` and can be referenced by name.
    pub fn new(query_str: &str) -> Result<Self, TreeSitterError> {
        let language = SupportLang::Python.get_ts_language();
        let query = Query::new(&language, query_str).map_err(|e| TreeSitterError::InvalidQuery {
            message: e.to_string(),
        })?;

        let capture_names = query.capture_names().iter().map(|s| s.to_string()).collect();

        Ok(Self {
            query,
            capture_names,
        })
    }

    /// Execute the query against parsed source and return all matches in document order.
    pub fn find_all<'tree>(&self, parsed: &'tree ParsedSource<'_>) -> Vec<QueryMatch<'tree>> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, parsed.root_node(), parsed.source.as_bytes());

        let mut results = Vec::new();

        // tree-sitter 0.25+ uses StreamingIterator
        while let Some(m) = matches.next() {
            let captures: HashMap<String, Node<'tree>> = m
                .captures
                .iter()
                .map(|capture| {
                    let name = &self.capture_names[capture.index as usize];
                    (name.clone(), capture.node)
                })
                .collect();

            if !captures.is_empty() {
                results.push(QueryMatch { captures });
            }
        }

        results
    }
}

/// Common tree-sitter queries for Python constructs.
pub mod queries {
    /// Every assignment statement in the file, at any depth.
    ///
    /// Chained assignments (`a = b = x`) nest in the `right` field, so only
    /// the outermost assignment of a statement is captured.
    pub const ASSIGNMENT_STATEMENTS: &str = r#"(expression_statement
        (assignment) @assignment
    ) @statement"#;
}
