//! Workflow definitions: types, context paths and the YAML parser.

pub mod parser;
pub mod path;
pub mod types;

pub use parser::{parse_workflow, validate_graph, validate_workflow};
pub use path::{ContextPath, PathError};
pub use types::*;
