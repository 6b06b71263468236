//! Locating values inside captured responses.

use std::fmt;
use std::str::FromStr;

use declarest_client::Response;
use declarest_core::query;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, Result};

/// Where to find a value in (or about) an HTTP response.
///
/// Written in configuration as `exact.<literal>`, `header.<name>`,
/// `body.<query-path>`, or `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueLocator {
    /// A literal, independent of the response.
    Exact(String),
    /// First value of the named response header.
    Header(String),
    /// A node inside the JSON response body.
    Body(String),
    /// The response status code in decimal.
    Code,
}

impl ValueLocator {
    /// Extracts the value; anything absent comes back as the empty string.
    #[must_use]
    pub fn locate(&self, response: &Response) -> String {
        match self {
            ValueLocator::Exact(literal) => literal.clone(),
            ValueLocator::Header(name) => response
                .header_value(name)
                .unwrap_or_default()
                .to_string(),
            ValueLocator::Body(path) => response
                .json()
                .ok()
                .and_then(|body| query::find(&body, path).map(query::stringify))
                .unwrap_or_default(),
            ValueLocator::Code => response.status().to_string(),
        }
    }
}

impl FromStr for ValueLocator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "code" {
            return Ok(ValueLocator::Code);
        }
        for (prefix, build) in [
            ("exact.", ValueLocator::Exact as fn(String) -> ValueLocator),
            ("header.", ValueLocator::Header),
            ("body.", ValueLocator::Body),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                if rest.is_empty() {
                    break;
                }
                return Ok(build(rest.to_string()));
            }
        }
        Err(EngineError::InvalidConfig(format!(
            "invalid locator {s:?}: expected exact.<value>, header.<name>, body.<path>, or code"
        )))
    }
}

impl fmt::Display for ValueLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueLocator::Exact(literal) => write!(f, "exact.{literal}"),
            ValueLocator::Header(name) => write!(f, "header.{name}"),
            ValueLocator::Body(path) => write!(f, "body.{path}"),
            ValueLocator::Code => f.write_str("code"),
        }
    }
}

impl Serialize for ValueLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ValueLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        Response::from_parts(status, map, body.as_bytes().to_vec())
    }

    #[test]
    fn parse_and_display_are_inverses() {
        for form in ["exact.done", "header.Operation-Location", "body.status.state", "code"] {
            let locator: ValueLocator = form.parse().unwrap();
            assert_eq!(locator.to_string(), form);
        }
    }

    #[test]
    fn parse_rejects_malformed_forms() {
        for bad in ["", "status", "exact.", "header.", "body.", "code.x"] {
            assert!(bad.parse::<ValueLocator>().is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn exact_ignores_the_response() {
        let locator: ValueLocator = "exact.succeeded".parse().unwrap();
        assert_eq!(locator.locate(&response(500, &[], "")), "succeeded");
    }

    #[test]
    fn header_takes_first_value_or_empty() {
        let locator: ValueLocator = "header.Operation-Location".parse().unwrap();
        let found = response(202, &[("operation-location", "/ops/9")], "");
        assert_eq!(locator.locate(&found), "/ops/9");
        assert_eq!(locator.locate(&response(202, &[], "")), "");
    }

    #[test]
    fn body_queries_the_json_payload() {
        let locator: ValueLocator = "body.status.state".parse().unwrap();
        let found = response(200, &[], r#"{"status": {"state": "Running"}}"#);
        assert_eq!(locator.locate(&found), "Running");
        assert_eq!(locator.locate(&response(200, &[], "{}")), "");
        assert_eq!(locator.locate(&response(200, &[], "not json")), "");
    }

    #[test]
    fn code_renders_the_status() {
        let locator: ValueLocator = "code".parse().unwrap();
        assert_eq!(locator.locate(&response(202, &[], "")), "202");
    }

    #[test]
    fn serde_round_trips_the_string_form() {
        let locator: ValueLocator = serde_json::from_str("\"body.state\"").unwrap();
        assert_eq!(locator, ValueLocator::Body("state".to_string()));
        assert_eq!(serde_json::to_string(&locator).unwrap(), "\"body.state\"");
    }
}
