//! Namespace aggregation: name prefixing and reverse parsing (spec.md §3
//! "Name prefixing").

mod sanitize;

pub use sanitize::{parse_prefixed_name, prefix_tool_name, sanitize};
