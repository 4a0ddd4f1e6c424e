//! Target and label derivation for ChaosEngines
//!
//! Pure functions: nothing here talks to the API server. The target string
//! is handed to the runner through its environment, the label sets are used
//! both to stamp the runner pod and to select everything spawned for an
//! engine.

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::ChaosEngine;
use crate::Error;

/// Kind used when the legacy descriptor does not name one
pub const DEFAULT_APP_KIND: &str = "KIND";

/// Label carrying the engine name
pub const APP_LABEL: &str = "app";
/// Label carrying the chaos identifier
pub const CHAOS_UID_LABEL: &str = "chaosUID";
/// Label naming the component
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
/// Label naming the product
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// Derive the canonical target string for an engine.
///
/// Workload selectors win over pod selectors, which win over the legacy
/// `appinfo` descriptor. Entries are `kind:namespace:[filter]` joined by `;`.
pub fn derive_targets(engine: &ChaosEngine) -> String {
    if let Some(selectors) = &engine.spec.selectors {
        if let Some(workloads) = &selectors.workloads {
            return workloads
                .iter()
                .map(|w| {
                    let filter = w
                        .names
                        .as_deref()
                        .filter(|n| !n.is_empty())
                        .or(w.labels.as_deref())
                        .unwrap_or_default();
                    format!("{}:{}:[{}]", w.kind, w.namespace, filter)
                })
                .collect::<Vec<_>>()
                .join(";");
        }
        if let Some(pods) = &selectors.pods {
            return pods
                .iter()
                .map(|p| format!("pod:{}:[{}]", p.namespace, p.names))
                .collect::<Vec<_>>()
                .join(";");
        }
    }

    let appinfo = match &engine.spec.appinfo {
        Some(a) if !a.is_empty() => a,
        _ => return String::new(),
    };

    let namespace = non_blank(&appinfo.appns)
        .map(str::to_string)
        .unwrap_or_else(|| engine.namespace().unwrap_or_default());
    let kind = non_blank(&appinfo.appkind).unwrap_or(DEFAULT_APP_KIND);
    let label = appinfo.applabel.as_deref().unwrap_or_default();

    format!("{}:{}:[{}]", kind, namespace, label)
}

/// Reject target selections the runner cannot act on.
pub fn validate_target_selection(engine: &ChaosEngine) -> Result<(), Error> {
    if let Some(selectors) = &engine.spec.selectors {
        if selectors.workloads.is_none() && selectors.pods.is_none() {
            return Err(Error::validation("specify one out of workloads or pods"));
        }
    }

    if let Some(appinfo) = &engine.spec.appinfo {
        if non_blank(&appinfo.appkind).is_none() != non_blank(&appinfo.applabel).is_none() {
            return Err(Error::validation(
                "incomplete appinfo, provide appkind and applabel both",
            ));
        }
    }

    Ok(())
}

/// Comma separated experiment names, rejecting an empty list
pub fn experiment_list(engine: &ChaosEngine) -> Result<String, Error> {
    if engine.spec.experiments.is_empty() {
        return Err(Error::validation("application experiment list is empty"));
    }
    Ok(engine
        .spec
        .experiments
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(","))
}

/// Labels stamped on the runner pod.
///
/// User supplied runner labels are applied last and may override the
/// fixed keys.
pub fn runner_labels(engine: &ChaosEngine) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (APP_LABEL.to_string(), engine.name_any()),
        (CHAOS_UID_LABEL.to_string(), engine.chaos_uid()),
        (COMPONENT_LABEL.to_string(), "chaos-runner".to_string()),
        (PART_OF_LABEL.to_string(), "litmus".to_string()),
    ]);
    labels.extend(
        engine
            .spec
            .components
            .runner
            .runner_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    labels
}

/// Selector matching every workload spawned for an engine
pub fn chaos_selector(engine: &ChaosEngine) -> BTreeMap<String, String> {
    BTreeMap::from([(CHAOS_UID_LABEL.to_string(), engine.chaos_uid())])
}

/// Selector matching the default resources removed on graceful completion
pub fn default_resources_selector(engine: &ChaosEngine) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), engine.name_any()),
        (CHAOS_UID_LABEL.to_string(), engine.chaos_uid()),
    ])
}

/// Render a label map as an equality-based selector string
pub fn to_selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
