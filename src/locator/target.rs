use crate::edit::{EditError, LineBuffer};
use crate::index::SourceIndex;
use crate::locator::{required_name, suggest};
use serde::{Deserialize, Serialize};

/// A region of source text that a replace edit addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// A method (primary class first) or module-level function
    Function { name: String },
    Class { name: String },
    Param { name: String },
    /// A whitelisted attribute of the primary class
    Attr { name: String },
    /// Raw inclusive line range, no syntax lookup
    Range {
        #[serde(rename = "startLine")]
        start_line: usize,
        #[serde(rename = "endLine")]
        end_line: usize,
    },
}

impl TargetDescriptor {
    pub fn function(name: impl Into<String>) -> Self {
        TargetDescriptor::Function { name: name.into() }
    }

    pub fn class(name: impl Into<String>) -> Self {
        TargetDescriptor::Class { name: name.into() }
    }

    pub fn param(name: impl Into<String>) -> Self {
        TargetDescriptor::Param { name: name.into() }
    }

    pub fn attr(name: impl Into<String>) -> Self {
        TargetDescriptor::Attr { name: name.into() }
    }
}

/// A resolved target: coordinates, the text currently there, and a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub start_line: usize,
    pub end_line: usize,
    pub current_text: String,
    pub label: String,
}

pub fn resolve_target(
    target: &TargetDescriptor,
    index: &SourceIndex,
    buffer: &LineBuffer,
) -> Result<ResolvedRegion, EditError> {
    let (start_line, end_line, label) = match target {
        TargetDescriptor::Function { name } => {
            let name = required_name(name, "function")?;
            let found = index
                .find_function(name)
                .ok_or_else(|| EditError::TargetNotFound {
                    what: format!("function '{name}'"),
                    suggestion: suggest(name, index.function_names()),
                })?;
            let label = match found.class_name {
                Some(class_name) => format!("method {class_name}.{name}"),
                None => format!("function {name}"),
            };
            (found.function.start_line, found.function.end_line, label)
        }
        TargetDescriptor::Class { name } => {
            let name = required_name(name, "class")?;
            let cls = index
                .find_class(name)
                .ok_or_else(|| EditError::TargetNotFound {
                    what: format!("class '{name}'"),
                    suggestion: suggest(name, index.classes.iter().map(|c| c.name.as_str())),
                })?;
            (cls.start_line, cls.end_line, format!("class {name}"))
        }
        TargetDescriptor::Param { name } => {
            let name = required_name(name, "param")?;
            let param = index
                .find_param(name)
                .ok_or_else(|| EditError::TargetNotFound {
                    what: format!("param '{name}'"),
                    suggestion: suggest(name, index.params.iter().map(|p| p.name.as_str())),
                })?;
            (param.start_line, param.end_line, format!("param {name}"))
        }
        TargetDescriptor::Attr { name } => {
            let name = required_name(name, "attr")?;
            let attr = index
                .find_attr(name)
                .ok_or_else(|| EditError::TargetNotFound {
                    what: format!("attr '{name}'"),
                    suggestion: suggest(name, index.attrs.iter().map(|a| a.name.as_str())),
                })?;
            (attr.start_line, attr.end_line, format!("attr {name}"))
        }
        TargetDescriptor::Range {
            start_line,
            end_line,
        } => {
            let line_count = buffer.line_count();
            if *start_line < 1 || end_line < start_line || *end_line > line_count {
                return Err(EditError::InvalidRange {
                    start_line: *start_line,
                    end_line: *end_line,
                    line_count,
                });
            }
            (
                *start_line,
                *end_line,
                format!("range {start_line}-{end_line}"),
            )
        }
    };

    Ok(ResolvedRegion {
        start_line,
        end_line,
        current_text: buffer.segment(start_line, end_line),
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::index::build_index;
    use serde_json::json;

    const SOURCE: &str = "\
import os


def helper():
    return 1


class Base:
    def populate_indicators(self):
        pass


class Strat(IStrategy):
    stoploss = -0.1
    buy_rsi = IntParameter(1, 9, default=3)

    def populate_indicators(self):
        # body
        return 2
";

    fn resolve(target: TargetDescriptor) -> Result<ResolvedRegion, EditError> {
        let index = build_index(SOURCE, &EngineConfig::default()).unwrap();
        resolve_target(&target, &index, &LineBuffer::new(SOURCE))
    }

    #[test]
    fn methods_of_primary_class_win() {
        let region = resolve(TargetDescriptor::function("populate_indicators")).unwrap();
        assert_eq!(region.label, "method Strat.populate_indicators");
        assert_eq!((region.start_line, region.end_line), (17, 19));
        assert_eq!(
            region.current_text,
            "    def populate_indicators(self):\n        # body\n        return 2\n"
        );
    }

    #[test]
    fn module_functions_resolve() {
        let region = resolve(TargetDescriptor::function("helper")).unwrap();
        assert_eq!(region.label, "function helper");
        assert_eq!((region.start_line, region.end_line), (4, 5));
    }

    #[test]
    fn classes_params_and_attrs_resolve() {
        let cls = resolve(TargetDescriptor::class("Base")).unwrap();
        assert_eq!((cls.start_line, cls.end_line, cls.label.as_str()), (8, 10, "class Base"));

        let param = resolve(TargetDescriptor::param("buy_rsi")).unwrap();
        assert_eq!(param.current_text, "    buy_rsi = IntParameter(1, 9, default=3)\n");
        assert_eq!(param.label, "param buy_rsi");

        let attr = resolve(TargetDescriptor::attr("stoploss")).unwrap();
        assert_eq!((attr.start_line, attr.end_line), (14, 14));
    }

    #[test]
    fn ranges_are_bounds_checked() {
        let region = resolve(TargetDescriptor::Range {
            start_line: 1,
            end_line: 2,
        })
        .unwrap();
        assert_eq!(region.current_text, "import os\n\n");
        assert_eq!(region.label, "range 1-2");

        for (start_line, end_line) in [(0, 1), (3, 2), (1, 100)] {
            let err = resolve(TargetDescriptor::Range {
                start_line,
                end_line,
            })
            .unwrap_err();
            assert!(matches!(err, EditError::InvalidRange { .. }));
        }
    }

    #[test]
    fn missing_targets_fail_with_suggestion() {
        let err = resolve(TargetDescriptor::function("helpr")).unwrap_err();
        match err {
            EditError::TargetNotFound { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("helper"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            resolve(TargetDescriptor::param("nope_nope_nope")),
            Err(EditError::TargetNotFound { suggestion: None, .. })
        ));
    }

    #[test]
    fn empty_names_are_invalid() {
        assert!(matches!(
            resolve(TargetDescriptor::class(" ")),
            Err(EditError::MissingName { kind: "class" })
        ));
    }

    #[test]
    fn descriptors_use_wire_shape() {
        let target: TargetDescriptor =
            serde_json::from_value(json!({"kind": "range", "startLine": 2, "endLine": 4})).unwrap();
        assert_eq!(
            target,
            TargetDescriptor::Range {
                start_line: 2,
                end_line: 4
            }
        );
        let param: TargetDescriptor =
            serde_json::from_value(json!({"kind": "param", "name": "buy_rsi"})).unwrap();
        assert_eq!(param, TargetDescriptor::param("buy_rsi"));
        assert!(serde_json::from_value::<TargetDescriptor>(json!({"kind": "module"})).is_err());
    }
}
