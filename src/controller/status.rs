//! Chaos status synchronization after an abort
//!
//! Experiment executors report per-target progress by annotating the
//! ChaosResult with `kind/name: <status>`. Once every chaos pod is gone the
//! controller moves those reports into `status.history.targets` and removes
//! the annotations it consumed. Other annotations are left alone.

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{EngineKubeClient, ResultDrain};
use crate::crd::{ChaosEngine, ChaosResult, TargetDetails};
use crate::discovery::ResultCrdProbe;
use crate::retry::{retry_bounded, RetryError, RetryPolicy};
use crate::targets::chaos_selector;
use crate::Error;

/// Annotation values that carry a per-target chaos status
const CHAOS_STATUS_VALUES: [&str; 3] = ["injected", "reverted", "targeted"];

const TERMINATION_OPERATION: &str = "chaos pod termination";

/// Poll until no pod carrying the engine's chaos identifier remains.
pub async fn wait_for_chaos_pod_termination(
    kube: &dyn EngineKubeClient,
    engine: &ChaosEngine,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    let selector = chaos_selector(engine);
    let (namespace, selector) = (namespace.as_str(), &selector);

    let outcome = retry_bounded(policy, cancel, TERMINATION_OPERATION, move || async move {
        let pods = kube
            .list_pods(namespace, selector)
            .await
            .map_err(|e| e.to_string())?;
        if pods.is_empty() {
            Ok(())
        } else {
            Err(format!("{} chaos pods are not deleted yet", pods.len()))
        }
    })
    .await;

    match outcome {
        Ok(()) => Ok(()),
        Err(RetryError::Exhausted { attempts, .. }) => Err(Error::WaitExhausted {
            operation: TERMINATION_OPERATION.to_string(),
            attempts,
        }),
        Err(RetryError::Cancelled) => Err(Error::cancelled(TERMINATION_OPERATION)),
    }
}

/// Compute the drain for a ChaosResult, `None` when nothing is to be written.
///
/// Recognized values are matched case-insensitively and stored as written.
/// Keys are `kind/name`; a recognized value under a key without a `/` is
/// consumed without producing a history entry.
pub fn drain_chaos_status(result: &ChaosResult) -> Option<ResultDrain> {
    let annotations = result.metadata.annotations.as_ref()?;
    if annotations.is_empty() {
        return None;
    }

    let mut targets = result.targets().to_vec();
    let mut consumed_keys = Vec::new();

    for (key, value) in annotations {
        let lowered = value.to_lowercase();
        if !CHAOS_STATUS_VALUES.contains(&lowered.as_str()) {
            continue;
        }
        consumed_keys.push(key.clone());

        let Some((kind, name)) = key.split_once('/') else {
            warn!(
                result = %result.name_any(),
                annotation = %key,
                "chaos status annotation key is not kind/name, dropping it"
            );
            continue;
        };
        upsert_target(&mut targets, kind.trim(), name.trim(), value);
    }

    if consumed_keys.is_empty() {
        return None;
    }

    Some(ResultDrain {
        resource_version: result.resource_version(),
        targets,
        consumed_keys,
    })
}

fn upsert_target(targets: &mut Vec<TargetDetails>, kind: &str, name: &str, status: &str) {
    match targets.iter_mut().find(|t| t.name == name) {
        Some(existing) => existing.chaos_status = status.to_string(),
        None => targets.push(TargetDetails {
            name: name.to_string(),
            kind: kind.to_string(),
            chaos_status: status.to_string(),
        }),
    }
}

/// Drain the engine's ChaosResult into its target history.
///
/// Skipped when the ChaosResult CRD is not installed. Nothing is written
/// when the correlated result has no recognized annotations.
pub async fn sync_chaos_result(
    kube: &dyn EngineKubeClient,
    probe: &dyn ResultCrdProbe,
    engine: &ChaosEngine,
) -> Result<(), Error> {
    if !probe.result_crd_available().await? {
        debug!(engine = %engine.name_any(), "ChaosResult CRD not installed, skipping status sync");
        return Ok(());
    }

    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    let results = kube.list_results(&namespace, &engine.chaos_uid()).await?;
    let Some(result) = results.first() else {
        return Ok(());
    };

    let Some(drain) = drain_chaos_status(result) else {
        return Ok(());
    };

    info!(
        result = %result.name_any(),
        targets = drain.targets.len(),
        "updating chaos status inside chaosresult"
    );
    kube.persist_result_drain(&namespace, &result.name_any(), &drain)
        .await
}
