use serde::Deserialize;
use std::fmt;

/// Engine policy: which class is primary, what counts as a parameter,
/// which attributes and keywords may be patched.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub params: ParamSettings,
    #[serde(default)]
    pub attrs: AttrSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StrategySettings {
    /// A class deriving from any of these names is the primary class.
    #[serde(default = "default_base_classes")]
    pub base_classes: Vec<String>,
    /// Method whose end anchors `heuristic_indicators` inserts.
    #[serde(default = "default_indicators_method")]
    pub indicators_method: String,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            base_classes: default_base_classes(),
            indicators_method: default_indicators_method(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ParamSettings {
    /// Substring the callee's terminal name must contain.
    #[serde(default = "default_constructor_marker")]
    pub constructor_marker: String,
    /// Keywords whose value may differ between before and after.
    #[serde(default = "default_mutable_keywords")]
    pub mutable_keywords: Vec<String>,
}

impl Default for ParamSettings {
    fn default() -> Self {
        Self {
            constructor_marker: default_constructor_marker(),
            mutable_keywords: default_mutable_keywords(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AttrSettings {
    #[serde(default = "default_attr_whitelist")]
    pub whitelist: Vec<String>,
}

impl Default for AttrSettings {
    fn default() -> Self {
        Self {
            whitelist: default_attr_whitelist(),
        }
    }
}

fn default_base_classes() -> Vec<String> {
    vec!["IStrategy".to_string()]
}

fn default_indicators_method() -> String {
    "populate_indicators".to_string()
}

fn default_constructor_marker() -> String {
    "Parameter".to_string()
}

fn default_mutable_keywords() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_attr_whitelist() -> Vec<String> {
    [
        "stoploss",
        "trailing_stop",
        "trailing_stop_positive",
        "trailing_stop_positive_offset",
        "trailing_only_offset_is_reached",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for name in &self.strategy.base_classes {
            if !is_identifier(name) {
                issues.push(ValidationIssue::NotAnIdentifier {
                    field: "strategy.base_classes",
                    value: name.clone(),
                });
            }
        }
        if !is_identifier(&self.strategy.indicators_method) {
            issues.push(ValidationIssue::NotAnIdentifier {
                field: "strategy.indicators_method",
                value: self.strategy.indicators_method.clone(),
            });
        }

        if self.params.constructor_marker.trim().is_empty() {
            issues.push(ValidationIssue::EmptyField {
                field: "params.constructor_marker",
            });
        }
        for keyword in &self.params.mutable_keywords {
            if !is_identifier(keyword) {
                issues.push(ValidationIssue::NotAnIdentifier {
                    field: "params.mutable_keywords",
                    value: keyword.clone(),
                });
            }
        }

        if self.attrs.whitelist.is_empty() {
            issues.push(ValidationIssue::EmptyField {
                field: "attrs.whitelist",
            });
        }
        for name in &self.attrs.whitelist {
            if !is_identifier(name) {
                issues.push(ValidationIssue::NotAnIdentifier {
                    field: "attrs.whitelist",
                    value: name.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Whether an attribute name may be indexed and patched.
    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.attrs.whitelist.iter().any(|allowed| allowed == name)
    }

    /// Whether a callee's terminal name marks a parameter constructor.
    pub fn is_param_constructor(&self, callee: &str) -> bool {
        !callee.is_empty() && callee.contains(self.params.constructor_marker.as_str())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyField {
        field: &'static str,
    },
    NotAnIdentifier {
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyField { field } => write!(f, "'{field}' must not be empty"),
            ValidationIssue::NotAnIdentifier { field, value } => {
                write!(f, "'{field}' entry '{value}' is not a Python identifier")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_whitelisted("stoploss"));
        assert!(!config.is_whitelisted("minimal_roi"));
        assert!(config.is_param_constructor("IntParameter"));
        assert!(!config.is_param_constructor("DataFrame"));
        assert!(!config.is_param_constructor(""));
    }

    #[test]
    fn collects_every_issue() {
        let mut config = EngineConfig::default();
        config.attrs.whitelist = vec!["ok".into(), "not ok".into()];
        config.params.constructor_marker = " ".into();
        config.strategy.base_classes = vec!["1Strategy".into()];

        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.to_string().contains("'not ok'"));
    }
}
