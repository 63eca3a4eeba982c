//! Strategy Patcher: structural, verified edits to Python source files
//!
//! Regions of a Python file (classes, methods, parameter and attribute
//! assignments, raw line ranges) are located through a tree-sitter index and
//! patched line-exactly. Every replace checks the caller's snapshot of the
//! region first; replaces on parameters and attributes must also pass a
//! safety check that only lets a literal value or a whitelisted keyword
//! change.
//!
//! # Architecture
//!
//! All operations compile down to an ordered list of [`Edit`]s applied by
//! [`apply_edits`]. The buffer is re-parsed and re-indexed before each edit,
//! so every edit sees line numbers that reflect the edits before it.
//!
//! # Safety
//!
//! - Before-text verification on every replace
//! - Literal-only / default-only validation for params and attrs
//! - The patched result must parse, or nothing is written
//! - Atomic file writes (tempfile + fsync + rename)
//!
//! # Example
//!
//! ```no_run
//! use strategy_patcher::{apply_edits, Edit, EngineConfig, TargetDescriptor};
//!
//! let source = "class S(IStrategy):\n    stoploss = -0.05\n";
//! let edit = Edit::replace(
//!     TargetDescriptor::attr("stoploss"),
//!     "    stoploss = -0.05\n",
//!     "    stoploss = -0.10\n",
//! );
//!
//! match apply_edits(source, &[edit], &EngineConfig::default()) {
//!     Ok(outcome) => print!("{}", outcome.content),
//!     Err(e) => eprintln!("{}: {}", e.kind().code(), e),
//! }
//! ```

pub mod cache;
pub mod config;
pub mod diff;
pub mod edit;
pub mod index;
pub mod literal;
pub mod locator;
pub mod patch;
pub mod pool;
pub mod ts;
pub mod validate;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, EngineConfig};
pub use diff::unified_diff;
pub use edit::{Edit, EditError, LineBuffer};
pub use index::{build_index, SourceIndex};
pub use locator::{AnchorDescriptor, TargetDescriptor};
pub use patch::{
    apply_edits, AppliedEdit, ChangeMode, ErrorKind, PatchError, PatchOutcome,
};
pub use ts::{PythonParser, TreeSitterError};
pub use validate::{validate_attr_change, validate_param_change, ValidationError};
