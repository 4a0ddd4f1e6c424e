//! ChaosResult Custom Resource Definition
//!
//! One ChaosResult per engine/experiment pair, correlated to the engine by
//! the `chaosUID` label. Experiment executors write per-target status into
//! its annotations; the controller drains them into `status.history.targets`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::TargetDetails;

/// Specification for a ChaosResult
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosResult",
    plural = "chaosresults",
    namespaced,
    status = "ChaosResultStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosResultSpec {
    /// Engine that produced this result
    #[serde(default)]
    pub engine: String,

    /// Experiment that produced this result
    #[serde(default)]
    pub experiment: String,
}

/// Status for a ChaosResult
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosResultStatus {
    /// Latest experiment outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_status: Option<TestStatus>,

    /// Durable history across runs
    #[serde(default)]
    pub history: HistoryDetails,
}

/// Outcome of the latest run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStatus {
    /// Running or Completed
    #[serde(default)]
    pub phase: String,

    /// Awaited, Pass, Fail or Stopped
    #[serde(default)]
    pub verdict: String,
}

/// Run counters and per-target chaos history
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDetails {
    /// Runs with a Pass verdict
    #[serde(default)]
    pub passed_runs: i32,

    /// Runs with a Fail verdict
    #[serde(default)]
    pub failed_runs: i32,

    /// Runs that were stopped
    #[serde(default)]
    pub stopped_runs: i32,

    /// Targets that chaos was applied to
    #[serde(default)]
    pub targets: Vec<TargetDetails>,
}

impl ChaosResult {
    /// Target history, empty when no status has been written
    pub fn targets(&self) -> &[TargetDetails] {
        self.status
            .as_ref()
            .map(|s| s.history.targets.as_slice())
            .unwrap_or_default()
    }
}

/// CRD object name used by the availability probe
pub const RESULT_CRD_NAME: &str = "chaosresults.litmuschaos.io";
