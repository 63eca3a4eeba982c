use crate::ts::errors::TreeSitterError;
use ast_grep_language::{LanguageExt, SupportLang};
use tree_sitter::{Node, Parser, Tree};

/// Tree-sitter parser wrapper for Python source code.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    /// Create a new Python parser.
    pub fn new() -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        // The grammar comes from ast-grep-language so tree-sitter versions stay in lockstep
        let ts_lang = SupportLang::Python.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TreeSitterError::LanguageSet)?;

        Ok(Self { parser })
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, TreeSitterError> {
        self.parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed)
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    /// Get the root node of the tree.
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes, or Python 2 statements.
    pub fn has_errors(&self) -> bool {
        !self.error_nodes().is_empty()
    }

    /// Get all ERROR and MISSING nodes in the tree, plus Python 2 statements.
    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), &mut errors);
        errors
    }

    /// Extract text for a node's byte range.
    pub fn node_text(&self, node: Node<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }

    /// Fail with the first syntax error if the tree has any.
    pub fn ensure_valid(&self) -> Result<(), TreeSitterError> {
        let errors = self.error_nodes();
        let Some(first) = errors.first() else {
            return Ok(());
        };
        let (line, column) = (first.start_point.row + 1, first.start_point.column + 1);
        match errors.len() {
            1 => Err(TreeSitterError::SyntaxError { line, column }),
            count => Err(TreeSitterError::MultipleSyntaxErrors {
                count,
                line,
                column,
            }),
        }
    }

    /// Top-level statements of the module, comments excluded.
    pub fn statements(&self) -> Vec<Node<'_>> {
        statements_of(self.tree.root_node())
    }
}

/// Information about an invalid node in the parse tree.
#[derive(Debug, Clone)]
pub struct ErrorNode {
    pub start_point: tree_sitter::Point,
}

/// Python 2 statement forms the grammar still accepts.
const LEGACY_STATEMENTS: &[&str] = &["print_statement", "exec_statement"];

fn collect_error_nodes(node: Node<'_>, errors: &mut Vec<ErrorNode>) {
    if node.is_error() || node.is_missing() || LEGACY_STATEMENTS.contains(&node.kind()) {
        errors.push(ErrorNode {
            start_point: node.start_position(),
        });
    }

    // legacy statements parse cleanly, so clean subtrees are walked too
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, errors);
    }
}

/// Named, non-extra children of a module or block.
pub fn statements_of(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

/// 1-based line on which a node starts.
pub fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// 1-based line of the last token of a node, ignoring trailing comments.
///
/// tree-sitter-python attaches comments that follow a block to that block, so
/// the raw end position can run past the last real statement.
pub fn end_line(node: Node<'_>) -> usize {
    let mut current = node;
    loop {
        let mut cursor = current.walk();
        let last = current
            .children(&mut cursor)
            .filter(|child| !child.is_extra())
            .last();
        match last {
            Some(child) => current = child,
            None => break,
        }
    }

    let end = current.end_position();
    if end.column == 0 && end.row > current.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

/// Unwrap a `decorated_definition` to its class or function definition.
pub fn definition_of(node: Node<'_>) -> Node<'_> {
    if node.kind() == "decorated_definition" {
        if let Some(definition) = node.child_by_field_name("definition") {
            return definition;
        }
    }
    node
}
