//! Expansion of `$functions(reference)` templates.
//!
//! Templates may reference the resource's current path (`$(path)`), the
//! whole request body (`$(body)`), or a node inside it
//! (`$(body.links.next)`). A dotted function chain ahead of the parentheses
//! transforms the substituted value left to right
//! (`$url_path.trim_path(body.links.next)`); an empty chain falls back to
//! the expansion context's default. Values substituted for `path` are never
//! transformed.

use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::error::{CoreError, Result};
use crate::query;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([\w\.]*)\(([\w.]+)\)").expect("token pattern is valid"));

/// Percent-encoding set for `escape`: everything outside RFC 3986
/// unreserved plus `$&+:=@?` is encoded, notably `/`, `;`, and `,`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@')
    .remove(b'?');

/// Percent-encoding set for `query_escape`: only unreserved characters
/// pass through; the space is rendered as `+` afterwards.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Escape,
    Unescape,
    QueryEscape,
    QueryUnescape,
    Base,
    UrlPath,
    TrimPath,
}

impl Function {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "escape" => Function::Escape,
            "unescape" => Function::Unescape,
            "query_escape" => Function::QueryEscape,
            "query_unescape" => Function::QueryUnescape,
            "base" => Function::Base,
            "url_path" => Function::UrlPath,
            "trim_path" => Function::TrimPath,
            other => {
                return Err(CoreError::UnknownFunction {
                    name: other.to_string(),
                })
            }
        })
    }
}

/// Template expander bound to an optional current path and request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expander<'a> {
    current_path: Option<&'a str>,
    body: Option<&'a Value>,
}

impl<'a> Expander<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the resource's current path, resolvable via `$(path)` and
    /// required by `trim_path`.
    #[must_use]
    pub fn with_current_path(mut self, path: &'a str) -> Self {
        self.current_path = Some(path);
        self
    }

    /// Binds the request body, resolvable via `$(body)` and `$(body.<path>)`.
    #[must_use]
    pub fn with_body(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Expands a URL path template; bare references default to `escape`.
    pub fn expand_path(&self, template: &str) -> Result<String> {
        self.expand_with(template, &[Function::Escape])
    }

    /// Expands a query-string value; bare references default to `escape`.
    pub fn expand_query_value(&self, template: &str) -> Result<String> {
        self.expand_with(template, &[Function::Escape])
    }

    /// Expands a header value; bare references are substituted verbatim.
    pub fn expand_header_value(&self, template: &str) -> Result<String> {
        self.expand_with(template, &[])
    }

    /// Expands with no default function chain.
    pub fn expand(&self, template: &str) -> Result<String> {
        self.expand_with(template, &[])
    }

    fn expand_with(&self, template: &str, default_chain: &[Function]) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in TOKEN.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 is the whole match");
            out.push_str(&template[last..whole.start()]);

            let chain = caps.get(1).map_or("", |m| m.as_str());
            let reference = caps.get(2).map_or("", |m| m.as_str());
            let mut value = self.resolve(template, reference)?;
            if reference != "path" {
                let functions = if chain.is_empty() {
                    default_chain.to_vec()
                } else {
                    chain
                        .split('.')
                        .map(Function::parse)
                        .collect::<Result<Vec<_>>>()?
                };
                for function in functions {
                    value = self.apply(template, function, value)?;
                }
            }
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn resolve(&self, template: &str, reference: &str) -> Result<String> {
        if reference == "path" {
            return self
                .current_path
                .map(str::to_string)
                .ok_or_else(|| CoreError::InvalidExpression {
                    template: template.to_string(),
                    reason: "no current path to reference".to_string(),
                });
        }
        if reference == "body" {
            return Ok(query::stringify(self.require_body("@this")?));
        }
        if let Some(path) = reference.strip_prefix("body.") {
            let body = self.require_body(path)?;
            let found = query::find(body, path).ok_or_else(|| CoreError::MissingBodyPath {
                path: path.to_string(),
            })?;
            return Ok(query::stringify(found));
        }
        Err(CoreError::InvalidExpression {
            template: template.to_string(),
            reason: format!("unknown reference {reference:?}"),
        })
    }

    fn require_body(&self, path: &str) -> Result<&'a Value> {
        self.body.ok_or_else(|| CoreError::MissingBodyPath {
            path: path.to_string(),
        })
    }

    fn apply(&self, template: &str, function: Function, value: String) -> Result<String> {
        let invalid = |reason: String| CoreError::InvalidExpression {
            template: template.to_string(),
            reason,
        };
        Ok(match function {
            Function::Escape => utf8_percent_encode(&value, PATH_SEGMENT).to_string(),
            Function::Unescape => percent_decode_str(&value)
                .decode_utf8()
                .map_err(|e| invalid(format!("unescape produced invalid utf-8: {e}")))?
                .into_owned(),
            Function::QueryEscape => utf8_percent_encode(&value, QUERY)
                .to_string()
                .replace("%20", "+"),
            Function::QueryUnescape => percent_decode_str(&value.replace('+', " "))
                .decode_utf8()
                .map_err(|e| invalid(format!("query_unescape produced invalid utf-8: {e}")))?
                .into_owned(),
            Function::Base => base_segment(&value),
            Function::UrlPath => url_path(&value).map_err(invalid)?,
            Function::TrimPath => {
                let current = self
                    .current_path
                    .ok_or_else(|| invalid("trim_path needs a current path".to_string()))?;
                let stripped = value.strip_prefix(current).ok_or_else(|| {
                    invalid(format!("value {value:?} is not under path {current:?}"))
                })?;
                stripped.trim_start_matches('/').to_string()
            }
        })
    }
}

/// Last segment of a slash-separated path, ignoring trailing slashes.
fn base_segment(value: &str) -> String {
    let trimmed = value.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, last)) => last.to_string(),
        None => trimmed.to_string(),
    }
}

/// Path component of an absolute or scheme-relative URL.
fn url_path(value: &str) -> std::result::Result<String, String> {
    match Url::parse(value) {
        Ok(url) => Ok(url.path().to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let end = value.find(['?', '#']).unwrap_or(value.len());
            Ok(value[..end].to_string())
        }
        Err(e) => Err(format!("url_path could not parse {value:?}: {e}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn templates_without_tokens_pass_through() {
        let out = Expander::new().expand_path("/things/42").unwrap();
        assert_eq!(out, "/things/42");
    }

    #[test]
    fn path_reference_substitutes_verbatim() {
        let out = Expander::new()
            .with_current_path("/v2/things/42")
            .expand_path("$(path)/status")
            .unwrap();
        assert_eq!(out, "/v2/things/42/status");
    }

    #[test]
    fn path_reference_without_current_path_fails() {
        let err = Expander::new().expand_path("$(path)").unwrap_err();
        assert!(matches!(err, CoreError::InvalidExpression { .. }), "{err:?}");
    }

    #[test]
    fn body_reference_defaults_to_escape_in_paths() {
        let body = json!({"name": "a/b"});
        let out = Expander::new()
            .with_body(&body)
            .expand_path("/things/$(body.name)")
            .unwrap();
        assert_eq!(out, "/things/a%2Fb");
    }

    #[test]
    fn escape_keeps_path_segment_safe_characters() {
        let body = json!({"v": "a-b_c.~$&+:=@?d e müh"});
        let out = Expander::new()
            .with_body(&body)
            .expand_path("$(body.v)")
            .unwrap();
        assert_eq!(out, "a-b_c.~$&+:=@?d%20e%20m%C3%BCh");
    }

    #[test]
    fn explicit_chain_replaces_default() {
        let body = json!({"name": "a%2Fb"});
        let out = Expander::new()
            .with_body(&body)
            .expand_path("$unescape(body.name)")
            .unwrap();
        assert_eq!(out, "a/b");
    }

    #[test]
    fn header_values_are_not_escaped_by_default() {
        let body = json!({"etag": "a/b \"c\""});
        let out = Expander::new()
            .with_body(&body)
            .expand_header_value("$(body.etag)")
            .unwrap();
        assert_eq!(out, "a/b \"c\"");
    }

    #[test]
    fn query_escape_renders_spaces_as_plus() {
        let body = json!({"q": "a b+c"});
        let out = Expander::new()
            .with_body(&body)
            .expand("$query_escape(body.q)")
            .unwrap();
        assert_eq!(out, "a+b%2Bc");
    }

    #[test]
    fn query_unescape_inverts_query_escape() {
        let body = json!({"q": "a+b%2Bc"});
        let out = Expander::new()
            .with_body(&body)
            .expand("$query_unescape(body.q)")
            .unwrap();
        assert_eq!(out, "a b+c");
    }

    #[test]
    fn base_takes_the_last_segment() {
        let body = json!({"id": "/things/42/"});
        let out = Expander::new()
            .with_body(&body)
            .expand("$base(body.id)")
            .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn url_path_then_trim_path_yields_relative_remainder() {
        let body = json!({"links": {"next": "https://api.example.com/v2/foo/bar?page=2"}});
        let out = Expander::new()
            .with_current_path("/v2")
            .with_body(&body)
            .expand("$url_path.trim_path(body.links.next)")
            .unwrap();
        assert_eq!(out, "foo/bar");
    }

    #[test]
    fn trim_path_rejects_values_outside_the_current_path() {
        let body = json!({"next": "/other/foo"});
        let err = Expander::new()
            .with_current_path("/v2")
            .with_body(&body)
            .expand("$trim_path(body.next)")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidExpression { .. }), "{err:?}");
    }

    #[test]
    fn whole_body_reference_renders_compact_json() {
        let body = json!({"a": 1});
        let out = Expander::new()
            .with_body(&body)
            .expand("$(body)")
            .unwrap();
        assert_eq!(out, r#"{"a":1}"#);
    }

    #[test]
    fn missing_body_property_is_an_error() {
        let body = json!({"a": 1});
        let err = Expander::new()
            .with_body(&body)
            .expand_path("/x/$(body.missing)")
            .unwrap_err();
        match err {
            CoreError::MissingBodyPath { path } => assert_eq!(path, "missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_function_is_fatal() {
        let body = json!({"a": 1});
        let err = Expander::new()
            .with_body(&body)
            .expand("$frobnicate(body.a)")
            .unwrap_err();
        match err {
            CoreError::UnknownFunction { name } => assert_eq!(name, "frobnicate"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_reference_is_fatal() {
        let err = Expander::new().expand("$(settings.x)").unwrap_err();
        assert!(matches!(err, CoreError::InvalidExpression { .. }), "{err:?}");
    }

    #[test]
    fn multiple_tokens_expand_in_place() {
        let body = json!({"a": "x", "b": "y"});
        let out = Expander::new()
            .with_body(&body)
            .expand_path("/$(body.a)/mid/$(body.b)")
            .unwrap();
        assert_eq!(out, "/x/mid/y");
    }
}
