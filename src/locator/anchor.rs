use crate::config::EngineConfig;
use crate::edit::{EditError, LineBuffer};
use crate::index::SourceIndex;
use crate::locator::{required_name, suggest};
use serde::{Deserialize, Serialize};

/// A point at which an insert edit splices new lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorDescriptor {
    AfterFunction {
        name: String,
    },
    /// After the module docstring and the leading import block
    AfterImports,
    /// End of the named class, or of the primary class when unnamed
    ClassEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ModuleEnd,
    /// End of the indicator method, degrading to class end then module end
    #[serde(rename = "heuristic_indicators")]
    HeuristicIndicatorsEnd,
}

/// A resolved anchor: the number of lines that precede the inserted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnchor {
    pub insert_at: usize,
    pub label: String,
}

impl ResolvedAnchor {
    fn new(insert_at: usize, label: impl Into<String>) -> Self {
        Self {
            insert_at,
            label: label.into(),
        }
    }
}

pub fn resolve_anchor(
    anchor: &AnchorDescriptor,
    index: &SourceIndex,
    buffer: &LineBuffer,
    config: &EngineConfig,
) -> Result<ResolvedAnchor, EditError> {
    match anchor {
        AnchorDescriptor::AfterFunction { name } => {
            let name = required_name(name, "after_function")?;
            let found = index
                .find_function(name)
                .ok_or_else(|| EditError::AnchorNotFound {
                    what: format!("function '{name}'"),
                    suggestion: suggest(name, index.function_names()),
                })?;
            Ok(ResolvedAnchor::new(
                found.function.end_line,
                format!("after function {name}"),
            ))
        }
        AnchorDescriptor::AfterImports => {
            Ok(ResolvedAnchor::new(index.preamble.end_line(), "after imports"))
        }
        AnchorDescriptor::ClassEnd { name } => {
            let name = name.as_deref().map(str::trim).filter(|name| !name.is_empty());
            let cls = match name {
                Some(name) => index.find_class(name),
                None => index.primary_class(),
            };
            let cls = cls.ok_or_else(|| EditError::AnchorNotFound {
                what: match name {
                    Some(name) => format!("class '{name}'"),
                    None => "class".to_string(),
                },
                suggestion: name.and_then(|name| {
                    suggest(name, index.classes.iter().map(|c| c.name.as_str()))
                }),
            })?;
            Ok(ResolvedAnchor::new(
                cls.end_line,
                format!("end of class {}", cls.name),
            ))
        }
        AnchorDescriptor::ModuleEnd => Ok(ResolvedAnchor::new(buffer.line_count(), "end of module")),
        AnchorDescriptor::HeuristicIndicatorsEnd => {
            let method_name = config.strategy.indicators_method.as_str();
            let Some(cls) = index.primary_class() else {
                return Ok(ResolvedAnchor::new(buffer.line_count(), "end of module"));
            };
            match cls.methods.iter().find(|method| method.name == method_name) {
                Some(method) => Ok(ResolvedAnchor::new(
                    method.end_line,
                    format!("after {method_name}"),
                )),
                None => Ok(ResolvedAnchor::new(
                    cls.end_line,
                    format!("end of class {}", cls.name),
                )),
            }
        }
    }
}
