pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, resolve, ConfigError, CONFIG_ENV_VAR};
pub use schema::{
    AttrSettings, EngineConfig, ParamSettings, StrategySettings, ValidationError, ValidationIssue,
};
