//! Structural index of a Python source file.
//!
//! The index is derived data: it is rebuilt from text whenever the text
//! changes and is never patched in place. All line numbers are 1-based and
//! inclusive on both ends.

use crate::cache;
use crate::config::EngineConfig;
use crate::edit::LineBuffer;
use crate::literal;
use crate::pool;
use crate::ts::parser::{definition_of, end_line, start_line, statements_of};
use crate::ts::query::queries;
use crate::ts::{ParsedSource, TreeSitterError};
use serde::Serialize;
use serde_json::Value;
use tree_sitter::Node;

/// A class defined at module level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(rename = "line")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    pub bases: Vec<String>,
    pub methods: Vec<FunctionInfo>,
}

/// A module-level function or a method directly inside a class body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    #[serde(rename = "line")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
}

/// An assignment whose value is a parameter constructor call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamAssignment {
    pub name: String,
    #[serde(rename = "type")]
    pub constructor: String,
    #[serde(rename = "line")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    /// Literal values of the first two positional arguments.
    pub args: [Value; 2],
    pub default: Value,
    pub space: Value,
    pub optimize: Value,
    #[serde(rename = "before")]
    pub raw_text: String,
}

/// A whitelisted attribute assigned directly in the primary class body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrAssignment {
    pub name: String,
    #[serde(rename = "line")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    pub value: Value,
    #[serde(rename = "before")]
    pub raw_text: String,
}

/// End lines of the module docstring and of the leading import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModulePreamble {
    pub docstring_end: Option<usize>,
    pub imports_end: Option<usize>,
}

impl ModulePreamble {
    /// Line after which module code starts; 0 when there is no preamble.
    pub fn end_line(&self) -> usize {
        self.docstring_end
            .unwrap_or(0)
            .max(self.imports_end.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceIndex {
    pub classes: Vec<ClassInfo>,
    pub functions: Vec<FunctionInfo>,
    pub params: Vec<ParamAssignment>,
    #[serde(skip)]
    pub attrs: Vec<AttrAssignment>,
    #[serde(skip)]
    pub preamble: ModulePreamble,
    #[serde(skip)]
    primary: Option<usize>,
}

/// A function lookup hit; `class_name` is set for methods.
#[derive(Debug, Clone, Copy)]
pub struct FunctionMatch<'a> {
    pub function: &'a FunctionInfo,
    pub class_name: Option<&'a str>,
}

impl SourceIndex {
    /// The first class deriving from a configured base name, else the first class.
    pub fn primary_class(&self) -> Option<&ClassInfo> {
        self.primary.and_then(|idx| self.classes.get(idx))
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|cls| cls.name == name)
    }

    pub fn find_param(&self, name: &str) -> Option<&ParamAssignment> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn find_attr(&self, name: &str) -> Option<&AttrAssignment> {
        self.attrs.iter().find(|attr| attr.name == name)
    }

    /// Look up a function by name.
    ///
    /// Methods of the primary class win over methods of other classes, which
    /// win over module-level functions.
    pub fn find_function(&self, name: &str) -> Option<FunctionMatch<'_>> {
        let method = self
            .primary_class()
            .and_then(|cls| method_named(cls, name))
            .or_else(|| self.classes.iter().find_map(|cls| method_named(cls, name)));
        if let Some((function, class_name)) = method {
            return Some(FunctionMatch {
                function,
                class_name: Some(class_name),
            });
        }

        self.functions
            .iter()
            .find(|function| function.name == name)
            .map(|function| FunctionMatch {
                function,
                class_name: None,
            })
    }

    /// Every name a target or anchor could refer to, for suggestions.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .flat_map(|cls| cls.methods.iter())
            .chain(self.functions.iter())
            .map(|function| function.name.as_str())
    }
}

fn method_named<'a>(cls: &'a ClassInfo, name: &str) -> Option<(&'a FunctionInfo, &'a str)> {
    cls.methods
        .iter()
        .find(|method| method.name == name)
        .map(|function| (function, cls.name.as_str()))
}

/// Parse `source` and build its index.
///
/// Fails with a syntax error when the source is not valid Python.
pub fn build_index(source: &str, config: &EngineConfig) -> Result<SourceIndex, TreeSitterError> {
    pool::with_parser(|parser| {
        let parsed = parser.parse_with_source(source)?;
        parsed.ensure_valid()?;
        index_parsed(&parsed, config)
    })?
}

/// Build the index from an already-parsed, error-free tree.
pub fn index_parsed(
    parsed: &ParsedSource<'_>,
    config: &EngineConfig,
) -> Result<SourceIndex, TreeSitterError> {
    let lines = LineBuffer::new(parsed.source);

    let statements = parsed.statements();
    let preamble = module_preamble(&statements, parsed);

    let mut classes = Vec::new();
    let mut class_nodes = Vec::new();
    let mut functions = Vec::new();

    for &statement in &statements {
        let definition = definition_of(statement);
        match definition.kind() {
            "class_definition" => {
                if let Some(info) = class_info(definition, parsed) {
                    classes.push(info);
                    class_nodes.push(definition);
                }
            }
            "function_definition" => {
                if let Some(info) = function_info(definition, parsed) {
                    functions.push(info);
                }
            }
            _ => {}
        }
    }

    let primary = classes
        .iter()
        .position(|cls| {
            cls.bases
                .iter()
                .any(|base| config.strategy.base_classes.contains(base))
        })
        .or_else(|| (!classes.is_empty()).then_some(0));

    let mut params = extract_params(parsed, &lines, config)?;
    params.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut attrs = match primary {
        Some(idx) => extract_attrs(class_nodes[idx], parsed, &lines, config),
        None => Vec::new(),
    };
    attrs.sort_by_key(|attr| attr.start_line);

    tracing::trace!(
        classes = classes.len(),
        functions = functions.len(),
        params = params.len(),
        attrs = attrs.len(),
        "indexed source"
    );

    Ok(SourceIndex {
        classes,
        functions,
        params,
        attrs,
        preamble,
        primary,
    })
}

fn module_preamble(statements: &[Node<'_>], parsed: &ParsedSource<'_>) -> ModulePreamble {
    let docstring_end = statements
        .first()
        .filter(|first| is_docstring(**first, parsed))
        .map(|first| end_line(*first));

    // the first run of imports counts, even when other statements precede it
    let mut imports_end = None;
    for statement in statements {
        if matches!(
            statement.kind(),
            "import_statement" | "import_from_statement" | "future_import_statement"
        ) {
            imports_end = Some(end_line(*statement));
            continue;
        }
        if imports_end.is_some() {
            break;
        }
    }

    ModulePreamble {
        docstring_end,
        imports_end,
    }
}

fn is_docstring(statement: Node<'_>, parsed: &ParsedSource<'_>) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    match statements_of(statement).as_slice() {
        [only] if matches!(only.kind(), "string" | "concatenated_string") => {
            matches!(literal::evaluate(*only, parsed.source), Some(Value::String(_)))
        }
        _ => false,
    }
}

fn name_of<'a>(node: Node<'_>, parsed: &ParsedSource<'a>) -> Option<&'a str> {
    node.child_by_field_name("name")
        .map(|name| parsed.node_text(name))
}

fn function_info(node: Node<'_>, parsed: &ParsedSource<'_>) -> Option<FunctionInfo> {
    Some(FunctionInfo {
        name: name_of(node, parsed)?.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
    })
}

fn class_info(node: Node<'_>, parsed: &ParsedSource<'_>) -> Option<ClassInfo> {
    let name = name_of(node, parsed)?.to_string();

    let bases = node
        .child_by_field_name("superclasses")
        .map(|list| {
            statements_of(list)
                .into_iter()
                .filter_map(|base| terminal_name(base, parsed))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let methods = node
        .child_by_field_name("body")
        .map(|body| {
            statements_of(body)
                .into_iter()
                .map(definition_of)
                .filter(|child| child.kind() == "function_definition")
                .filter_map(|child| function_info(child, parsed))
                .collect()
        })
        .unwrap_or_default();

    Some(ClassInfo {
        name,
        start_line: start_line(node),
        end_line: end_line(node),
        bases,
        methods,
    })
}

/// `Name` for a bare identifier, `attr` for `a.b.attr`, `None` otherwise.
pub(crate) fn terminal_name<'a>(node: Node<'_>, parsed: &ParsedSource<'a>) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(parsed.node_text(node)),
        "attribute" => node
            .child_by_field_name("attribute")
            .map(|attr| parsed.node_text(attr)),
        _ => None,
    }
}

/// The pieces of an assignment statement, with chained targets flattened.
pub(crate) struct AssignmentParts<'tree> {
    pub targets: Vec<Node<'tree>>,
    pub value: Option<Node<'tree>>,
}

/// Split `a = b = value` / `a: T = value` into its targets and value.
pub(crate) fn split_assignment(assignment: Node<'_>) -> AssignmentParts<'_> {
    let mut targets = Vec::new();
    let mut current = assignment;
    loop {
        if let Some(left) = current.child_by_field_name("left") {
            targets.push(left);
        }
        match current.child_by_field_name("right") {
            Some(right) if right.kind() == "assignment" => current = right,
            value => return AssignmentParts { targets, value },
        }
    }
}

/// The single assignment inside an expression statement, if that is all it holds.
pub(crate) fn statement_assignment(statement: Node<'_>) -> Option<Node<'_>> {
    if statement.kind() != "expression_statement" {
        return None;
    }
    let children = statements_of(statement);
    match children.as_slice() {
        [only] if only.kind() == "assignment" => Some(*only),
        _ => None,
    }
}

/// Name and call node of a parameter assignment, if `assignment` is one.
pub(crate) fn param_parts<'tree>(
    assignment: Node<'tree>,
    parsed: &ParsedSource<'_>,
    config: &EngineConfig,
) -> Option<(String, Node<'tree>)> {
    let parts = split_assignment(assignment);
    let call = parts.value.filter(|value| value.kind() == "call")?;
    let callee = call
        .child_by_field_name("function")
        .and_then(|function| terminal_name(function, parsed))?;
    if !config.is_param_constructor(callee) {
        return None;
    }

    let mut names = parts
        .targets
        .iter()
        .filter(|target| target.kind() == "identifier")
        .map(|target| parsed.node_text(*target));
    match (names.next(), names.next()) {
        (Some(name), None) => Some((name.to_string(), call)),
        _ => None,
    }
}

/// Positional and keyword arguments of a call.
pub(crate) struct CallArguments<'tree> {
    pub positional: Vec<Node<'tree>>,
    pub keywords: Vec<(String, Node<'tree>)>,
    pub unpacked_keywords: Vec<Node<'tree>>,
}

pub(crate) fn call_arguments<'tree>(
    call: Node<'tree>,
    parsed: &ParsedSource<'_>,
) -> CallArguments<'tree> {
    let mut arguments = CallArguments {
        positional: Vec::new(),
        keywords: Vec::new(),
        unpacked_keywords: Vec::new(),
    };
    let Some(list) = call.child_by_field_name("arguments") else {
        return arguments;
    };
    if list.kind() == "generator_expression" {
        arguments.positional.push(list);
        return arguments;
    }

    for child in statements_of(list) {
        match child.kind() {
            "keyword_argument" => {
                let name = child.child_by_field_name("name");
                let value = child.child_by_field_name("value");
                if let (Some(name), Some(value)) = (name, value) {
                    arguments
                        .keywords
                        .push((parsed.node_text(name).to_string(), value));
                }
            }
            "dictionary_splat" => arguments.unpacked_keywords.push(child),
            _ => arguments.positional.push(child),
        }
    }
    arguments
}

fn extract_params(
    parsed: &ParsedSource<'_>,
    lines: &LineBuffer,
    config: &EngineConfig,
) -> Result<Vec<ParamAssignment>, TreeSitterError> {
    let engine = cache::get_or_compile_query(queries::ASSIGNMENT_STATEMENTS)?;
    let mut out = Vec::new();

    for m in engine.find_all(parsed) {
        let (Some(statement), Some(assignment)) = (m.capture("statement"), m.capture("assignment"))
        else {
            continue;
        };
        if statement_assignment(statement) != Some(assignment) {
            continue;
        }
        let Some((name, call)) = param_parts(assignment, parsed, config) else {
            continue;
        };

        let constructor = call
            .child_by_field_name("function")
            .and_then(|function| terminal_name(function, parsed))
            .unwrap_or_default()
            .to_string();
        let arguments = call_arguments(call, parsed);
        let literal_at = |idx: usize| {
            arguments
                .positional
                .get(idx)
                .and_then(|node| literal::evaluate(*node, parsed.source))
                .unwrap_or(Value::Null)
        };
        let keyword = |key: &str| {
            arguments
                .keywords
                .iter()
                .rev()
                .find(|(name, _)| name == key)
                .and_then(|(_, node)| literal::evaluate(*node, parsed.source))
                .unwrap_or(Value::Null)
        };

        let start = start_line(statement);
        let end = end_line(statement);
        out.push(ParamAssignment {
            name,
            constructor,
            start_line: start,
            end_line: end,
            args: [literal_at(0), literal_at(1)],
            default: keyword("default"),
            space: keyword("space"),
            optimize: keyword("optimize"),
            raw_text: lines.segment(start, end),
        });
    }

    Ok(out)
}

fn extract_attrs(
    class: Node<'_>,
    parsed: &ParsedSource<'_>,
    lines: &LineBuffer,
    config: &EngineConfig,
) -> Vec<AttrAssignment> {
    let Some(body) = class.child_by_field_name("body") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for statement in statements_of(body) {
        let Some(assignment) = statement_assignment(statement) else {
            continue;
        };
        let parts = split_assignment(assignment);
        let ([target], Some(value)) = (parts.targets.as_slice(), parts.value) else {
            continue;
        };
        if target.kind() != "identifier" {
            continue;
        }
        let name = parsed.node_text(*target);
        if !config.is_whitelisted(name) {
            continue;
        }

        let start = start_line(statement);
        let end = end_line(statement);
        out.push(AttrAssignment {
            name: name.to_string(),
            start_line: start,
            end_line: end,
            value: literal::evaluate(value, parsed.source).unwrap_or(Value::Null),
            raw_text: lines.segment(start, end),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STRATEGY: &str = r#"# header comment
from freqtrade.strategy import IStrategy, IntParameter, DecimalParameter
import talib.abstract as ta


def helper(x):
    return x


class Mixin:
    def populate_indicators(self, dataframe, metadata):
        return dataframe


class MyStrategy(IStrategy):
    stoploss = -0.10
    trailing_stop: bool = False
    timeframe = "5m"
    buy_rsi = IntParameter(10, 40, default=30, space="buy")
    sell_rsi = ta.IntParameter(
        60,
        90,
        default=70,
        space="sell",
        optimize=True,
    )

    @property
    def plot_config(self):
        return {}

    def populate_indicators(self, dataframe, metadata):
        window: int = DecimalParameter(0.1, 0.5, default=0.2)
        return dataframe
"#;

    fn index(source: &str) -> SourceIndex {
        build_index(source, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn classes_and_functions_in_source_order() {
        let idx = index(STRATEGY);

        let names: Vec<_> = idx.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Mixin", "MyStrategy"]);
        assert_eq!(idx.functions.len(), 1);
        assert_eq!(idx.functions[0].name, "helper");
        assert_eq!((idx.functions[0].start_line, idx.functions[0].end_line), (6, 7));

        let strategy = &idx.classes[1];
        assert_eq!(strategy.bases, vec!["IStrategy".to_string()]);
        assert_eq!(strategy.start_line, 15);
        assert_eq!(strategy.end_line, 34);

        let methods: Vec<_> = strategy.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["plot_config", "populate_indicators"]);
        // decorators are not part of the method span
        assert_eq!(strategy.methods[0].start_line, 29);
    }

    #[test]
    fn primary_class_prefers_configured_base() {
        let idx = index(STRATEGY);
        assert_eq!(idx.primary_class().unwrap().name, "MyStrategy");

        let found = idx.find_function("populate_indicators").unwrap();
        assert_eq!(found.class_name, Some("MyStrategy"));
        assert_eq!(found.function.start_line, 32);
    }

    #[test]
    fn primary_class_falls_back_to_first() {
        let idx = index("class A:\n    pass\n\nclass B(Base):\n    pass\n");
        assert_eq!(idx.primary_class().unwrap().name, "A");
    }

    #[test]
    fn params_are_found_anywhere_and_sorted() {
        let idx = index(STRATEGY);
        let names: Vec<_> = idx.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["buy_rsi", "sell_rsi", "window"]);

        let buy = &idx.params[0];
        assert_eq!(buy.constructor, "IntParameter");
        assert_eq!(buy.args, [json!(10), json!(40)]);
        assert_eq!(buy.default, json!(30));
        assert_eq!(buy.space, json!("buy"));
        assert_eq!(buy.optimize, Value::Null);
        assert_eq!(buy.raw_text, "    buy_rsi = IntParameter(10, 40, default=30, space=\"buy\")\n");

        let sell = &idx.params[1];
        assert_eq!(sell.constructor, "IntParameter");
        assert_eq!((sell.start_line, sell.end_line), (20, 26));
        assert_eq!(sell.optimize, json!(true));

        assert_eq!(idx.params[2].default, json!(0.2));
    }

    #[test]
    fn attrs_come_from_primary_class_body() {
        let idx = index(STRATEGY);
        let names: Vec<_> = idx.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["stoploss", "trailing_stop"]);
        assert_eq!(idx.attrs[0].value, json!(-0.10));
        assert_eq!(idx.attrs[1].value, json!(false));
        assert_eq!(idx.attrs[1].raw_text, "    trailing_stop: bool = False\n");
    }

    #[test]
    fn multiple_targets_are_not_indexed() {
        let source = "class S:\n    stoploss = trailing_stop = -0.1\n    a = b = IntParameter(1, 2)\n    x.y = c = IntParameter(1, 2)\n";
        let idx = index(source);
        assert!(idx.attrs.is_empty());
        let names: Vec<_> = idx.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn empty_module_is_empty_index() {
        let idx = index("");
        assert!(idx.classes.is_empty());
        assert!(idx.functions.is_empty());
        assert!(idx.params.is_empty());
        assert!(idx.attrs.is_empty());
        assert!(idx.primary_class().is_none());
    }

    #[test]
    fn syntax_errors_fail() {
        let result = build_index("class A(:\n    pass\n", &EngineConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn index_serializes_with_wire_names() {
        let idx = index("def f():\n    pass\n");
        let json = serde_json::to_value(&idx).unwrap();
        assert_eq!(
            json,
            json!({
                "classes": [],
                "functions": [{"name": "f", "line": 1, "endLine": 2}],
                "params": [],
            })
        );
    }

    #[test]
    fn preamble_covers_docstring_and_imports() {
        let source = "\"\"\"Module doc.\n\nMore.\n\"\"\"\nimport os\nfrom a import (\n    b,\n)\n\nx = 1\nimport late\n";
        let idx = index(source);
        assert_eq!(idx.preamble.docstring_end, Some(4));
        assert_eq!(idx.preamble.imports_end, Some(8));
        assert_eq!(idx.preamble.end_line(), 8);
    }

    #[test]
    fn preamble_without_imports_or_docstring() {
        assert_eq!(index("x = 1\n").preamble.end_line(), 0);
        assert_eq!(index("'doc'\nx = 1\n").preamble.end_line(), 1);
        assert_eq!(index("# comment\nimport os\n").preamble.end_line(), 2);
        assert_eq!(index("f'doc'\nx = 1\n").preamble.docstring_end, None);
    }

    #[test]
    fn python2_source_does_not_index() {
        let err = build_index("print \"hello\"\nexec \"x = 1\"\n", &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, TreeSitterError::MultipleSyntaxErrors { line: 1, column: 1, .. }));
    }

    #[test]
    fn raw_text_keeps_terminators_verbatim() {
        let idx = index("class S(IStrategy):\r\n    stoploss = -0.05\r\n    buy = IntParameter(1, 5, default=2)");
        assert_eq!(idx.attrs[0].raw_text, "    stoploss = -0.05\r\n");
        assert_eq!(idx.params[0].raw_text, "    buy = IntParameter(1, 5, default=2)");
    }
}
