//! REST virtual-server adapter (spec.md §4.9).
//!
//! Wraps a plain HTTP API as a virtual MCP server: a `tools/call` on a
//! virtual tool expands its [`RestCallSpec`] into an outbound HTTP
//! request and wraps the response back into an MCP `tools/call` result.

use crate::adapters::ssrf;
use crate::config::BackendValidationConfig;
use crate::error::GatewayError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Hard cap on REST adapter call timeouts regardless of what the spec
/// allows per-tool (spec.md §4.9 step 3 "hard cap 60 s").
const MAX_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// How the outbound REST call authenticates (spec.md §4.9 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestAuth {
    None,
    Bearer { token: String },
    Basic { user: String, pass: String },
}

/// Fully determines how a `tools/call` on a REST-adapted virtual tool
/// translates into an outbound HTTP call (spec.md §3 `VirtualToolSpec`,
/// §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestCallSpec {
    pub method: HttpMethod,
    /// URL template with `{placeholder}` substitutions, e.g.
    /// `https://api.example.com/users/{user_id}`.
    pub url_template: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_auth")]
    pub auth: RestAuth,
    /// MCP argument name -> outbound body field name. Arguments not
    /// consumed by the URL template or listed here are dropped.
    #[serde(default)]
    pub body_map: Option<HashMap<String, String>>,
    pub timeout_sec: u64,
}

fn default_auth() -> RestAuth {
    RestAuth::None
}

/// Resolves `${SECRET:NAME}` placeholders in header values (spec.md §4.9
/// step 1 "`${SECRET:NAME}` substitution via the secret store").
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SecretString>;
}

/// In-process secret store backed by a plain map; production deployments
/// are expected to supply a `SecretStore` backed by their own vault.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, SecretString>,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), SecretString::from(value.into()));
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, name: &str) -> Option<SecretString> {
        self.secrets.get(name).cloned()
    }
}

fn substitute_secret(value: &str, secrets: &dyn SecretStore) -> Result<String, GatewayError> {
    if let Some(rest) = value.strip_prefix("${SECRET:").and_then(|s| s.strip_suffix('}')) {
        let secret = secrets
            .get(rest)
            .ok_or_else(|| GatewayError::configuration(format!("unknown secret {rest}")))?;
        Ok(secret.expose_secret().to_string())
    } else {
        Ok(value.to_string())
    }
}

/// Expands `{placeholder}` tokens in `template` from `args`, returning the
/// expanded URL and the arguments that were *not* consumed (spec.md §4.9
/// step 2).
fn expand_url(
    template: &str,
    args: &HashMap<String, serde_json::Value>,
) -> (String, HashMap<String, serde_json::Value>) {
    let mut remaining = args.clone();
    let mut url = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        url.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            url.push_str(&rest[start..]);
            break;
        };
        let name = &after[..end];
        if let Some(value) = remaining.remove(name) {
            url.push_str(&value_as_path_segment(&value));
        } else {
            url.push('{');
            url.push_str(name);
            url.push('}');
        }
        rest = &after[end + 1..];
    }
    url.push_str(rest);
    (url, remaining)
}

fn value_as_path_segment(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of a REST adapter call, already shaped as an MCP `tools/call`
/// content block (spec.md §4.9 step 4).
#[derive(Debug, Clone, Serialize)]
pub struct RestCallResult {
    pub text: String,
    pub is_error: bool,
}

/// Executes `spec` against `arguments`, validating the target URL through
/// `ssrf::validate_url` before dispatch (spec.md §4.9, §7 "SSRF
/// protection").
pub async fn execute(
    client: &reqwest::Client,
    spec: &RestCallSpec,
    arguments: HashMap<String, serde_json::Value>,
    secrets: &dyn SecretStore,
    backend_validation: &BackendValidationConfig,
) -> Result<RestCallResult, GatewayError> {
    let (url, remaining_args) = expand_url(&spec.url_template, &arguments);
    ssrf::validate_url(&url, backend_validation)?;

    let timeout = Duration::from_secs(spec.timeout_sec).min(MAX_TIMEOUT);
    let mut builder = client.request(spec.method.as_reqwest(), &url).timeout(timeout);

    for (name, value) in &spec.headers {
        builder = builder.header(name, substitute_secret(value, secrets)?);
    }

    builder = match &spec.auth {
        RestAuth::None => builder,
        RestAuth::Bearer { token } => builder.bearer_auth(substitute_secret(token, secrets)?),
        RestAuth::Basic { user, pass } => {
            builder.basic_auth(user, Some(substitute_secret(pass, secrets)?))
        }
    };

    if matches!(spec.method, HttpMethod::Get) {
        let query: Vec<(String, String)> =
            remaining_args.iter().map(|(k, v)| (k.clone(), value_as_path_segment(v))).collect();
        builder = builder.query(&query);
    } else {
        let body = match &spec.body_map {
            Some(map) => {
                let mut mapped = serde_json::Map::new();
                for (arg_name, field_name) in map {
                    if let Some(v) = remaining_args.get(arg_name) {
                        mapped.insert(field_name.clone(), v.clone());
                    }
                }
                serde_json::Value::Object(mapped)
            }
            None => serde_json::to_value(&remaining_args).unwrap_or(serde_json::Value::Null),
        };
        builder = builder.json(&body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| GatewayError::timeout(format!("REST call to {url}: {e}"), timeout.as_millis() as u64))?;

    let status = response.status();
    let body_text = response.text().await.unwrap_or_default();

    if status.as_u16() >= 400 {
        return Err(GatewayError::upstream_http(status.as_u16(), truncate(&body_text, 500)));
    }

    Ok(RestCallResult { text: body_text, is_error: false })
}

/// Truncates `s` to at most `max` bytes, rounding down to the nearest char
/// boundary so multi-byte UTF-8 sequences are never split.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut boundary = max;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &s[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expand_url_substitutes_placeholder_and_leaves_remainder() {
        let mut args = HashMap::new();
        args.insert("user_id".to_string(), json!("u-1"));
        args.insert("limit".to_string(), json!(10));
        let (url, remaining) = expand_url("https://api.example.com/users/{user_id}", &args);
        assert_eq!(url, "https://api.example.com/users/u-1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.get("limit"), Some(&json!(10)));
    }

    #[test]
    fn expand_url_leaves_unmatched_placeholder_untouched() {
        let args = HashMap::new();
        let (url, _) = expand_url("https://api.example.com/{missing}", &args);
        assert_eq!(url, "https://api.example.com/{missing}");
    }

    #[test]
    fn substitute_secret_resolves_known_secret() {
        let mut store = InMemorySecretStore::new();
        store.insert("API_KEY", "sekrit");
        let resolved = substitute_secret("${SECRET:API_KEY}", &store).unwrap();
        assert_eq!(resolved, "sekrit");
    }

    #[test]
    fn substitute_secret_passes_through_plain_values() {
        let store = InMemorySecretStore::new();
        assert_eq!(substitute_secret("application/json", &store).unwrap(), "application/json");
    }

    #[test]
    fn substitute_secret_errors_on_unknown_name() {
        let store = InMemorySecretStore::new();
        assert!(substitute_secret("${SECRET:MISSING}", &store).is_err());
    }

    #[test]
    fn truncate_does_not_split_a_multibyte_char() {
        // "é" is 2 bytes; cutting at byte 1 would split it.
        let s = "é日本語";
        let truncated = truncate(s, 1);
        assert!(truncated.is_char_boundary(truncated.len() - 3));
    }

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("short", 100), "short");
    }
}
