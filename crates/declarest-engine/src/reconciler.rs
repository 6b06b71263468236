//! The reconciler: declarative CRUD against a remote REST API.

use std::collections::BTreeMap;
use std::sync::Arc;

use declarest_client::{Client, HttpMethod, RequestSpec, Response};
use declarest_core::{body, jsonset, query, AttrPath, CoreError, Expander};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{EngineError, Result};
use crate::mutex::MutexRegistry;
use crate::pollable::{split_query_into, PollSpec, Pollable};
use crate::precheck::{run_prechecks, PrecheckStep};
use crate::state::ResourceState;

fn default_create_method() -> HttpMethod {
    HttpMethod::Post
}

fn default_update_method() -> HttpMethod {
    HttpMethod::Put
}

fn default_delete_method() -> HttpMethod {
    HttpMethod::Delete
}

fn default_id_path() -> String {
    "id".to_string()
}

/// How to create a resource.
///
/// `path`, query values, and header values are templates; `$(body...)`
/// references resolve against the desired body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Path template the create request is sent to.
    pub path: String,

    /// POST appends under `path`; PUT writes to `path` itself.
    #[serde(default = "default_create_method")]
    pub method: HttpMethod,

    /// Desired resource body.
    pub body: Value,

    /// Where the new resource's identifier lives in a POST response.
    #[serde(default = "default_id_path")]
    pub id_path: String,

    /// Template overriding id derivation, expanded against the create
    /// path and the create response body.
    #[serde(default)]
    pub read_path: Option<String>,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,

    #[serde(default)]
    pub prechecks: Vec<PrecheckStep>,

    #[serde(default)]
    pub poll: Option<PollSpec>,

    /// Paths pruned from server responses during normalization.
    #[serde(default)]
    pub ignore_paths: Vec<AttrPath>,

    /// Paths the server accepts but never echoes back.
    #[serde(default)]
    pub write_only_paths: Vec<AttrPath>,
}

/// How to read a resource back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Path template; absent means the persisted id.
    #[serde(default)]
    pub path: Option<String>,

    /// Query path picking the resource out of a collection response.
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,

    #[serde(default)]
    pub ignore_paths: Vec<AttrPath>,

    #[serde(default)]
    pub write_only_paths: Vec<AttrPath>,
}

/// How to update a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Path template; absent means the persisted id.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_update_method")]
    pub method: HttpMethod,

    /// The next desired body.
    pub body: Value,

    /// PATCH sends only the difference against the last known output
    /// unless this disables it, forcing the full body.
    #[serde(default)]
    pub merge_patch_disabled: bool,

    /// Send explicit nulls for attributes the next body no longer declares.
    #[serde(default)]
    pub null_removed_attrs: bool,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,

    #[serde(default)]
    pub prechecks: Vec<PrecheckStep>,

    #[serde(default)]
    pub poll: Option<PollSpec>,

    #[serde(default)]
    pub ignore_paths: Vec<AttrPath>,

    #[serde(default)]
    pub write_only_paths: Vec<AttrPath>,
}

/// How to delete a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Path template; absent means the persisted id.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_delete_method")]
    pub method: HttpMethod,

    /// Payload some APIs require on delete.
    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,

    #[serde(default)]
    pub prechecks: Vec<PrecheckStep>,

    #[serde(default)]
    pub poll: Option<PollSpec>,
}

impl Default for DeleteRequest {
    fn default() -> Self {
        Self {
            path: None,
            method: default_delete_method(),
            body: None,
            query: BTreeMap::new(),
            header: BTreeMap::new(),
            prechecks: Vec::new(),
            poll: None,
        }
    }
}

/// A one-shot invocation outside the resource lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Path template.
    pub path: String,

    pub method: HttpMethod,

    #[serde(default)]
    pub body: Option<Value>,

    /// Teardown path template; `$(path)` resolves against the expanded
    /// forward path. Absent means the operation has nothing to tear down.
    #[serde(default)]
    pub delete_path: Option<String>,

    #[serde(default = "default_delete_method")]
    pub delete_method: HttpMethod,

    #[serde(default)]
    pub delete_body: Option<Value>,

    /// Poll block for the teardown response.
    #[serde(default)]
    pub delete_poll: Option<PollSpec>,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,

    #[serde(default)]
    pub prechecks: Vec<PrecheckStep>,

    #[serde(default)]
    pub poll: Option<PollSpec>,
}

/// Drives declarative resources against one remote API.
///
/// Cheap to clone; operations may run concurrently. Mutex prechecks go
/// through the registry, which defaults to the process-wide one so
/// reconcilers for the same API serialize where their resources demand it.
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: Arc<Client>,
    registry: Arc<MutexRegistry>,
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            registry: MutexRegistry::global(),
        }
    }

    /// Swaps in a private mutex registry. Tests and hosts embedding
    /// several isolated engines use this.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<MutexRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Creates the resource and returns its initial state.
    ///
    /// With POST, the new id is the create path joined with the value at
    /// `id_path` in the response body. With PUT, the expanded path already
    /// is the id, and a resource answering the existence probe makes the
    /// create fail instead of silently overwriting it.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        request: &CreateRequest,
    ) -> Result<ResourceState> {
        let expander = Expander::new().with_body(&request.body);
        let path = expander.expand_path(&request.path)?;
        let spec = build_spec(&expander, &request.query, &request.header, Some(request.body.clone()))?;

        let _lease = run_prechecks(&request.prechecks, &self.client, &self.registry, cancel).await?;

        if request.method == HttpMethod::Put {
            let probe_spec = RequestSpec {
                query: spec.query.clone(),
                headers: spec.headers.clone(),
                body: None,
            };
            let probe = self.client.read(cancel, &path, &probe_spec).await?;
            if probe.is_success() {
                return Err(EngineError::AlreadyExists { url: path });
            }
            if probe.status() != 404 {
                return Err(unexpected_status("existence check", &path, &probe));
            }
        }

        let response = self.client.create(cancel, request.method, &path, &spec).await?;
        if !response.is_success() {
            return Err(unexpected_status("create", &path, &response));
        }

        let response_body = response.json()?;
        let id = match &request.read_path {
            Some(template) => Expander::new()
                .with_current_path(&path)
                .with_body(&response_body)
                .expand_path(template)?,
            None => match request.method {
                HttpMethod::Put => path.clone(),
                _ => {
                    let located = query::find(&response_body, &request.id_path).ok_or_else(|| {
                        CoreError::MissingBodyPath {
                            path: request.id_path.clone(),
                        }
                    })?;
                    join_path(&path, &query::stringify(located))
                }
            },
        };
        debug!(id = %id, "created resource");

        if let Some(poll_spec) = &request.poll {
            Pollable::from_response(poll_spec, &path, &spec.query, &response)?
                .poll(&self.client, cancel)
                .await?;
        }

        let (normalized, output) = self
            .refresh(
                cancel,
                &id,
                &spec,
                &request.body,
                &request.ignore_paths,
                &request.write_only_paths,
            )
            .await?;

        Ok(ResourceState {
            id,
            path,
            body: normalized,
            output,
            query: spec.query,
            header: spec.headers,
        })
    }

    /// Reads the resource back. `Ok(None)` means it no longer exists.
    #[instrument(skip_all, fields(id = %state.id))]
    pub async fn read(
        &self,
        cancel: &CancellationToken,
        request: &ReadRequest,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>> {
        let expander = Expander::new()
            .with_current_path(&state.path)
            .with_body(&state.body);
        let path = match &request.path {
            Some(template) => expander.expand_path(template)?,
            None => state.id.clone(),
        };
        let mut spec = build_spec(&expander, &request.query, &request.header, None)?;
        overlay_state(&mut spec, state);

        let response = self.client.read(cancel, &path, &spec).await?;
        if response.status() == 404 {
            debug!(url = %path, "resource is gone");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(unexpected_status("read", &path, &response));
        }

        let mut output = response.json()?;
        if let Some(selector) = &request.selector {
            match query::find(&output, selector) {
                Some(node) => output = node.clone(),
                None => {
                    debug!(url = %path, selector = %selector, "selector matched nothing");
                    return Ok(None);
                }
            }
        }

        let normalized = body::normalize(
            &state.body,
            &output,
            &request.ignore_paths,
            &request.write_only_paths,
        );
        let mut next = state.clone();
        next.body = normalized;
        next.output = output;
        Ok(Some(next))
    }

    /// Pushes the next desired body to the remote and returns the updated
    /// state.
    #[instrument(skip_all, fields(id = %state.id))]
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        request: &UpdateRequest,
        state: &ResourceState,
    ) -> Result<ResourceState> {
        let expander = Expander::new()
            .with_current_path(&state.path)
            .with_body(&request.body);
        let path = match &request.path {
            Some(template) => expander.expand_path(template)?,
            None => state.id.clone(),
        };

        let _lease = run_prechecks(&request.prechecks, &self.client, &self.registry, cancel).await?;

        let mut payload = if request.method == HttpMethod::Patch && !request.merge_patch_disabled {
            jsonset::difference(&request.body, &state.output)
        } else {
            request.body.clone()
        };
        if request.null_removed_attrs {
            // Null out everything that changed or vanished, then lay the
            // payload back on top: surviving keys regain their values and
            // removed keys stay null.
            let mut base = jsonset::nullify(&jsonset::difference(&state.body, &request.body));
            merge_into(&mut base, &payload);
            payload = base;
        }

        let mut spec = build_spec(&expander, &request.query, &request.header, Some(payload))?;
        overlay_state(&mut spec, state);

        let response = self.client.update(cancel, request.method, &path, &spec).await?;
        if !response.is_success() {
            return Err(unexpected_status("update", &path, &response));
        }

        if let Some(poll_spec) = &request.poll {
            Pollable::from_response(poll_spec, &path, &spec.query, &response)?
                .poll(&self.client, cancel)
                .await?;
        }

        let (normalized, output) = self
            .refresh(
                cancel,
                &state.id,
                &spec,
                &request.body,
                &request.ignore_paths,
                &request.write_only_paths,
            )
            .await?;

        let mut next = state.clone();
        next.body = normalized;
        next.output = output;
        Ok(next)
    }

    /// Deletes the resource. A 404 means it was already gone and is not an
    /// error.
    #[instrument(skip_all, fields(id = %state.id))]
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        request: &DeleteRequest,
        state: &ResourceState,
    ) -> Result<()> {
        let expander = Expander::new()
            .with_current_path(&state.path)
            .with_body(&state.body);
        let path = match &request.path {
            Some(template) => expander.expand_path(template)?,
            None => state.id.clone(),
        };

        let _lease = run_prechecks(&request.prechecks, &self.client, &self.registry, cancel).await?;

        let mut spec = build_spec(&expander, &request.query, &request.header, request.body.clone())?;
        overlay_state(&mut spec, state);

        let response = self.client.delete(cancel, request.method, &path, &spec).await?;
        if response.status() == 404 {
            debug!(url = %path, "resource already gone");
            return Ok(());
        }
        if !response.is_success() {
            return Err(unexpected_status("delete", &path, &response));
        }

        if let Some(poll_spec) = &request.poll {
            Pollable::from_response(poll_spec, &path, &spec.query, &response)?
                .poll(&self.client, cancel)
                .await?;
        }
        Ok(())
    }

    /// Invokes a one-shot endpoint and returns its response body.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn operation(
        &self,
        cancel: &CancellationToken,
        request: &OperationRequest,
    ) -> Result<Value> {
        let mut expander = Expander::new();
        if let Some(body) = &request.body {
            expander = expander.with_body(body);
        }
        let path = expander.expand_path(&request.path)?;

        let _lease = run_prechecks(&request.prechecks, &self.client, &self.registry, cancel).await?;

        let spec = build_spec(&expander, &request.query, &request.header, request.body.clone())?;
        let response = self.client.operation(cancel, request.method, &path, &spec).await?;
        if !response.is_success() {
            return Err(unexpected_status("operation", &path, &response));
        }

        if let Some(poll_spec) = &request.poll {
            Pollable::from_response(poll_spec, &path, &spec.query, &response)?
                .poll(&self.client, cancel)
                .await?;
        }
        Ok(response.json()?)
    }

    /// Runs the operation's teardown counterpart. Without a `delete_path`
    /// there is nothing to undo and this returns immediately.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn operation_delete(
        &self,
        cancel: &CancellationToken,
        request: &OperationRequest,
    ) -> Result<()> {
        let Some(template) = &request.delete_path else {
            debug!("operation has no teardown configured");
            return Ok(());
        };

        let mut forward = Expander::new();
        if let Some(body) = &request.body {
            forward = forward.with_body(body);
        }
        let forward_path = forward.expand_path(&request.path)?;

        let mut expander = Expander::new().with_current_path(&forward_path);
        if let Some(body) = &request.delete_body {
            expander = expander.with_body(body);
        }
        let path = expander.expand_path(template)?;

        let _lease = run_prechecks(&request.prechecks, &self.client, &self.registry, cancel).await?;

        let spec = build_spec(
            &expander,
            &request.query,
            &request.header,
            request.delete_body.clone(),
        )?;
        let response = self
            .client
            .delete(cancel, request.delete_method, &path, &spec)
            .await?;
        if response.status() == 404 {
            debug!(url = %path, "operation target already gone");
            return Ok(());
        }
        if !response.is_success() {
            return Err(unexpected_status("operation teardown", &path, &response));
        }

        if let Some(poll_spec) = &request.delete_poll {
            Pollable::from_response(poll_spec, &path, &spec.query, &response)?
                .poll(&self.client, cancel)
                .await?;
        }
        Ok(())
    }

    /// Adopts an existing remote resource by its id. The id may carry a
    /// query string, which becomes part of the state's addressing. The
    /// first `read` after import fills the body.
    pub fn import(&self, id: &str) -> Result<ResourceState> {
        let mut query = BTreeMap::new();
        let path = split_query_into(id, &mut query);
        if path.is_empty() {
            return Err(EngineError::InvalidConfig(
                "import id must carry a path".to_string(),
            ));
        }
        debug!(id = %path, "imported resource");
        let mut state = ResourceState::new(path.clone(), path);
        state.query = query;
        Ok(state)
    }

    /// GETs `url` and folds the answer into (normalized body, output).
    async fn refresh(
        &self,
        cancel: &CancellationToken,
        url: &str,
        spec: &RequestSpec,
        prior: &Value,
        ignore: &[AttrPath],
        write_only: &[AttrPath],
    ) -> Result<(Value, Value)> {
        let read_spec = RequestSpec {
            query: spec.query.clone(),
            headers: spec.headers.clone(),
            body: None,
        };
        let response = self.client.read(cancel, url, &read_spec).await?;
        if response.status() == 404 {
            // The resource vanished between the mutation and its
            // confirmatory read.
            return Err(EngineError::NotFound {
                url: url.to_string(),
            });
        }
        if !response.is_success() {
            return Err(unexpected_status("post-mutation read", url, &response));
        }
        let output = response.json()?;
        let normalized = body::normalize(prior, &output, ignore, write_only);
        Ok((normalized, output))
    }
}

/// Expands query and header templates into a concrete request.
fn build_spec(
    expander: &Expander<'_>,
    query: &BTreeMap<String, Vec<String>>,
    header: &BTreeMap<String, String>,
    body: Option<Value>,
) -> Result<RequestSpec> {
    let mut expanded_query = BTreeMap::new();
    for (name, values) in query {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(expander.expand_query_value(value)?);
        }
        expanded_query.insert(name.clone(), out);
    }
    let mut expanded_headers = BTreeMap::new();
    for (name, value) in header {
        expanded_headers.insert(name.clone(), expander.expand_header_value(value)?);
    }
    Ok(RequestSpec {
        query: expanded_query,
        headers: expanded_headers,
        body,
    })
}

/// State addressing applies wherever the request did not say otherwise.
fn overlay_state(spec: &mut RequestSpec, state: &ResourceState) {
    for (name, values) in &state.query {
        spec.query
            .entry(name.clone())
            .or_insert_with(|| values.clone());
    }
    for (name, value) in &state.header {
        spec.headers
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }
}

fn join_path(path: &str, id: &str) -> String {
    format!(
        "{}/{}",
        path.trim_end_matches('/'),
        id.trim_start_matches('/')
    )
}

/// Deep merge of `addition` into `target`; scalars and arrays replace.
fn merge_into(target: &mut Value, addition: &Value) {
    match (target, addition) {
        (Value::Object(t), Value::Object(a)) => {
            for (key, av) in a {
                match t.get_mut(key) {
                    Some(tv) if tv.is_object() && av.is_object() => merge_into(tv, av),
                    _ => {
                        t.insert(key.clone(), av.clone());
                    }
                }
            }
        }
        (t, a) => *t = a.clone(),
    }
}

fn unexpected_status(context: &'static str, url: &str, response: &Response) -> EngineError {
    EngineError::UnexpectedStatus {
        context,
        url: url.to_string(),
        status: response.status(),
        detail: summarize(response.text()),
    }
}

/// Keeps error messages bounded when a server dumps a page of HTML.
fn summarize(text: String) -> String {
    const MAX: usize = 256;
    if text.len() <= MAX {
        return text;
    }
    let mut cut = MAX;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

// ============================================================================
// Tests
// ============================================================================
