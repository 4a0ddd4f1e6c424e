//! Removal of workloads spawned for a ChaosEngine
//!
//! Forceful removal wipes everything carrying the engine's chaos identifier.
//! Graceful removal only runs after a normal completion and honours the
//! engine's cleanup policy.

use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::client::EngineKubeClient;
use crate::crd::{ChaosEngine, CleanUpPolicy};
use crate::targets::{chaos_selector, default_resources_selector};
use crate::Error;

/// Delete every job and pod carrying the engine's chaos identifier.
///
/// Both collections are attempted even if the first fails; failures are
/// reported together as one [`Error::Cleanup`].
pub async fn force_remove_chaos_resources(
    kube: &dyn EngineKubeClient,
    engine: &ChaosEngine,
) -> Result<(), Error> {
    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    let selector = chaos_selector(engine);
    let grace = engine.termination_grace_period();
    let mut failed = Vec::new();

    if let Err(e) = kube.delete_all_jobs(&namespace, &selector, grace).await {
        warn!(engine = %engine.name_any(), error = %e, "failed to delete chaos jobs");
        failed.push("Jobs");
    }

    if let Err(e) = kube.delete_all_pods(&namespace, &selector, grace).await {
        warn!(engine = %engine.name_any(), error = %e, "failed to delete chaos pods");
        failed.push("Pods");
    }

    if !failed.is_empty() {
        return Err(Error::Cleanup {
            kinds: failed.join(", "),
        });
    }

    debug!(engine = %engine.name_any(), ?grace, "force removed chaos resources");
    Ok(())
}

/// Delete the engine's default pods when its cleanup policy is `Delete`.
///
/// Pods are deleted one at a time in listed order; the first failure stops
/// the sweep and is returned, leaving the rest for the next pass.
pub async fn graceful_remove_default_resources(
    kube: &dyn EngineKubeClient,
    engine: &ChaosEngine,
) -> Result<(), Error> {
    if engine.clean_up_policy() != CleanUpPolicy::Delete {
        debug!(engine = %engine.name_any(), "cleanup policy retains chaos pods");
        return Ok(());
    }

    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    let pods = kube
        .list_pods(&namespace, &default_resources_selector(engine))
        .await?;

    for pod in &pods {
        kube.delete_pod(&namespace, &pod.name_any()).await?;
    }

    if !pods.is_empty() {
        info!(
            engine = %engine.name_any(),
            count = pods.len(),
            "deleted chaos pods after completion"
        );
    }
    Ok(())
}
