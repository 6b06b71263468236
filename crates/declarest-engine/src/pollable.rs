//! Following long-running operations to completion.
//!
//! Many APIs answer a mutation with 202 and a status endpoint; the
//! pollable keeps GETting that endpoint until its status value hits the
//! success sentinel, sleeping between attempts as `Retry-After` or the
//! configured delay dictates.

use std::collections::BTreeMap;
use std::time::Duration;

use declarest_client::{Client, RequestSpec, Response};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{EngineError, Result};
use crate::locator::ValueLocator;

fn default_delay_secs() -> u64 {
    10
}

/// Sentinel status values, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSentinels {
    /// The value that means the operation finished successfully.
    pub success: String,
    /// Values that mean the operation is still running.
    #[serde(default)]
    pub pending: Vec<String>,
}

/// Declarative description of how to follow an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSpec {
    /// Locator yielding the URL to poll, applied to the trigger response.
    /// Absent means the trigger's own URL is polled.
    #[serde(default)]
    pub url_locator: Option<ValueLocator>,

    /// Locator yielding the operation status on each poll response.
    pub status_locator: ValueLocator,

    /// Sentinels the located status is compared against.
    pub status: StatusSentinels,

    /// Extra headers on every poll request.
    #[serde(default)]
    pub header: BTreeMap<String, String>,

    /// Extra query parameters on every poll request.
    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    /// Wait between polls when a response carries no usable Retry-After.
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,
}

impl PollSpec {
    pub fn validate(&self) -> Result<()> {
        if self.status.success.is_empty() {
            return Err(EngineError::InvalidConfig(
                "poll status.success must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A poll bound to a concrete URL, ready to run.
#[derive(Debug, Clone)]
pub struct Pollable {
    spec: PollSpec,
    url: String,
    query: BTreeMap<String, Vec<String>>,
    initial_delay: Duration,
}

impl Pollable {
    /// Binds a poll to the response that triggered it.
    ///
    /// The first wait comes from the trigger's `Retry-After` header; a
    /// present but non-integer value is an error. The poll URL comes from
    /// the spec's URL locator (its query string, if any, is folded into
    /// the poll query), or from the trigger's own path and query when no
    /// locator is configured.
    pub fn from_response(
        spec: &PollSpec,
        trigger_path: &str,
        trigger_query: &BTreeMap<String, Vec<String>>,
        trigger: &Response,
    ) -> Result<Self> {
        spec.validate()?;
        let initial_delay = match trigger.header_value("retry-after") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    EngineError::InvalidRetryAfter {
                        value: raw.to_string(),
                    }
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::ZERO,
        };

        let mut query = spec.query.clone();
        let url = match &spec.url_locator {
            Some(locator) => {
                let located = locator.locate(trigger);
                if located.is_empty() {
                    return Err(EngineError::InvalidConfig(format!(
                        "poll url locator {locator} found nothing in the trigger response"
                    )));
                }
                split_query_into(&located, &mut query)
            }
            None => {
                for (name, values) in trigger_query {
                    query.entry(name.clone()).or_insert_with(|| values.clone());
                }
                trigger_path.to_string()
            }
        };

        Ok(Self {
            spec: spec.clone(),
            url,
            query,
            initial_delay,
        })
    }

    /// Binds a poll to an explicit URL, with no trigger and no initial
    /// wait. Used by poll prechecks.
    pub fn for_precheck(spec: &PollSpec, url: &str) -> Result<Self> {
        spec.validate()?;
        let mut query = spec.query.clone();
        let url = split_query_into(url, &mut query);
        Ok(Self {
            spec: spec.clone(),
            url,
            query,
            initial_delay: Duration::ZERO,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, Vec<String>> {
        &self.query
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Runs the poll loop until success, a fatal status, or cancellation.
    #[instrument(skip(self, client, cancel), fields(url = %self.url))]
    pub async fn poll(&self, client: &Client, cancel: &CancellationToken) -> Result<()> {
        let mut delay = self.initial_delay;
        loop {
            sleep_cancellable(cancel, delay).await?;

            let spec = RequestSpec {
                query: self.query.clone(),
                headers: self.spec.header.clone(),
                body: None,
            };
            let response = client.read(cancel, &self.url, &spec).await?;

            // When the status lives in the response rather than being the
            // status code itself, a failed GET has no status to offer.
            if !matches!(self.spec.status_locator, ValueLocator::Code) && !response.is_success() {
                return Err(EngineError::PollFailedStatus {
                    url: self.url.clone(),
                    status: response.status(),
                });
            }

            let status = self.spec.status_locator.locate(&response);
            if status.is_empty() {
                return Err(EngineError::PollUnexpectedStatus {
                    url: self.url.clone(),
                    status,
                });
            }
            if status.eq_ignore_ascii_case(&self.spec.status.success) {
                debug!(status = %status, "operation completed");
                return Ok(());
            }
            if self
                .spec
                .status
                .pending
                .iter()
                .any(|pending| status.eq_ignore_ascii_case(pending))
            {
                delay = response
                    .header_value("retry-after")
                    .and_then(|raw| raw.trim().parse::<u64>().ok())
                    .map_or(Duration::from_secs(self.spec.default_delay_secs), Duration::from_secs);
                debug!(status = %status, wait_secs = delay.as_secs(), "operation still pending");
                continue;
            }
            return Err(EngineError::PollUnexpectedStatus {
                url: self.url.clone(),
                status,
            });
        }
    }
}

/// Splits a `?query` suffix off a URL or path, folding its pairs into
/// `query`. Pair values stay exactly as written; they are already encoded.
pub(crate) fn split_query_into(url: &str, query: &mut BTreeMap<String, Vec<String>>) -> String {
    let Some((base, raw_query)) = url.split_once('?') else {
        return url.to_string();
    };
    for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        query
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
    base.to_string()
}

async fn sleep_cancellable(cancel: &CancellationToken, wait: Duration) -> Result<()> {
    if wait.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = cancel.cancelled() => Err(EngineError::Cancelled),
        () = tokio::time::sleep(wait) => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn spec(url_locator: Option<&str>) -> PollSpec {
        PollSpec {
            url_locator: url_locator.map(|s| s.parse().unwrap()),
            status_locator: "body.status".parse().unwrap(),
            status: StatusSentinels {
                success: "Succeeded".to_string(),
                pending: vec!["Running".to_string()],
            },
            header: BTreeMap::new(),
            query: BTreeMap::new(),
            default_delay_secs: 0,
        }
    }

    fn trigger(headers: &[(&str, &str)]) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        Response::from_parts(202, map, Vec::new())
    }

    #[test]
    fn retry_after_sets_the_initial_delay() {
        let pollable = Pollable::from_response(
            &spec(Some("header.Operation-Location")),
            "/things",
            &BTreeMap::new(),
            &trigger(&[("operation-location", "/ops/1"), ("retry-after", "2")]),
        )
        .unwrap();
        assert_eq!(pollable.initial_delay(), Duration::from_secs(2));
        assert_eq!(pollable.url(), "/ops/1");
    }

    #[test]
    fn missing_retry_after_means_no_initial_delay() {
        let pollable = Pollable::from_response(
            &spec(Some("header.Operation-Location")),
            "/things",
            &BTreeMap::new(),
            &trigger(&[("operation-location", "/ops/1")]),
        )
        .unwrap();
        assert_eq!(pollable.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn unparseable_retry_after_is_fatal() {
        let err = Pollable::from_response(
            &spec(None),
            "/things",
            &BTreeMap::new(),
            &trigger(&[("retry-after", "soon")]),
        )
        .unwrap_err();
        match err {
            EngineError::InvalidRetryAfter { value } => assert_eq!(value, "soon"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn locator_url_query_folds_into_the_poll_query() {
        let pollable = Pollable::from_response(
            &spec(Some("header.Operation-Location")),
            "/things",
            &BTreeMap::new(),
            &trigger(&[(
                "operation-location",
                "https://api.example.com/ops/1?api-version=2&x=a%2Fb",
            )]),
        )
        .unwrap();
        assert_eq!(pollable.url(), "https://api.example.com/ops/1");
        assert_eq!(pollable.query()["api-version"], vec!["2"]);
        assert_eq!(pollable.query()["x"], vec!["a%2Fb"]);
    }

    #[test]
    fn missing_locator_value_is_an_error() {
        let err = Pollable::from_response(
            &spec(Some("header.Operation-Location")),
            "/things",
            &BTreeMap::new(),
            &trigger(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)), "{err:?}");
    }

    #[test]
    fn without_a_locator_the_trigger_url_is_polled() {
        let mut trigger_query = BTreeMap::new();
        trigger_query.insert("api-version".to_string(), vec!["2".to_string()]);
        let pollable = Pollable::from_response(
            &spec(None),
            "/things/42",
            &trigger_query,
            &trigger(&[]),
        )
        .unwrap();
        assert_eq!(pollable.url(), "/things/42");
        assert_eq!(pollable.query()["api-version"], vec!["2"]);
    }

    #[test]
    fn precheck_pollables_take_an_explicit_url() {
        let pollable = Pollable::for_precheck(&spec(None), "/health?deep=1").unwrap();
        assert_eq!(pollable.url(), "/health");
        assert_eq!(pollable.query()["deep"], vec!["1"]);
        assert_eq!(pollable.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn empty_success_sentinel_is_rejected() {
        let mut bad = spec(None);
        bad.status.success = String::new();
        assert!(bad.validate().is_err());
    }
}
