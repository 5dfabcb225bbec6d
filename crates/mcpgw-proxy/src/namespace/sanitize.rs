//! Backend name sanitization and prefixed-tool-name encoding (spec.md §3
//! "Name prefixing").
//!
//! A tool named `T` exported by a backend with sanitized name `S` is
//! exposed to clients as `S__T`. `sanitize` replaces any character
//! outside `[A-Za-z0-9_-]` with `_`; reverse parsing splits on the
//! *first* `__`, so the tail may itself contain underscores.

use crate::error::GatewayError;

/// Replaces any character outside `[A-Za-z0-9_-]` with `_`. Idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(backend_name: &str) -> String {
    backend_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Joins a sanitized backend name and a tool name with the `__` separator.
#[must_use]
pub fn prefix_tool_name(sanitized_backend: &str, tool_name: &str) -> String {
    format!("{sanitized_backend}__{tool_name}")
}

/// Splits a prefixed name on the *first* `__`, returning
/// `(sanitized_backend, tool_name)`. Rejects inputs with no `__` or where
/// the backend half is empty (a leading `__`), per spec.md §8.
pub fn parse_prefixed_name(prefixed: &str) -> Result<(String, String), GatewayError> {
    match prefixed.find("__") {
        Some(0) | None => Err(GatewayError::invalid_tool_name("Invalid tool name format")),
        Some(pos) => {
            let backend = &prefixed[..pos];
            let tool = &prefixed[pos + 2..];
            if tool.is_empty() {
                return Err(GatewayError::invalid_tool_name("Invalid tool name format"));
            }
            Ok((backend.to_string(), tool.to_string()))
        }
    }
}
