//! Gates an operation must pass before it touches the remote.

use std::sync::Arc;

use declarest_client::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::mutex::{MutexLease, MutexRegistry};
use crate::pollable::{PollSpec, Pollable};

/// One precheck. Steps run in declaration order; the first failure aborts
/// the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrecheckStep {
    /// Serialize with other operations through a named mutex. The key is
    /// held until the operation completes.
    Mutex { key: String },

    /// Wait until a status endpoint reports success.
    Poll {
        url: String,
        #[serde(flatten)]
        spec: PollSpec,
    },
}

/// Runs the steps in order. Mutex keys acquired along the way are returned
/// in a [`MutexLease`]; dropping it releases them, so an error part-way
/// through releases everything already held.
pub async fn run_prechecks(
    steps: &[PrecheckStep],
    client: &Client,
    registry: &Arc<MutexRegistry>,
    cancel: &CancellationToken,
) -> Result<MutexLease> {
    let mut lease = MutexLease::new(Arc::clone(registry));
    for step in steps {
        match step {
            PrecheckStep::Mutex { key } => {
                debug!(key = %key, "precheck: acquiring mutex");
                registry.lock(cancel, key).await?;
                lease.add(key.clone());
            }
            PrecheckStep::Poll { url, spec } => {
                debug!(url = %url, "precheck: polling for readiness");
                let pollable = Pollable::for_precheck(spec, url)?;
                pollable.poll(client, cancel).await?;
            }
        }
    }
    Ok(lease)
}

// ============================================================================
// Tests
// ============================================================================
