//! Supporting types shared by the chaos CRDs

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{LocalObjectReference, ResourceRequirements, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a ChaosEngine, written by the user
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Chaos should run (default when unset)
    #[default]
    Active,
    /// Chaos should stop, or has finished
    Stop,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Observed status of a ChaosEngine, written by the controller
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Finalizer added, runner launched or about to be
    Initialized,
    /// Runner finished all experiments
    Completed,
    /// Chaos was aborted and resources were removed
    Stopped,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What happens to chaos pods after a normal completion
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CleanUpPolicy {
    /// Delete the runner and experiment pods
    Delete,
    /// Keep them for inspection
    #[default]
    Retain,
}

/// Per-experiment progress reported on the ChaosEngine
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExperimentStatus {
    /// Experiment pod is running
    Running,
    /// Experiment finished
    Completed,
    /// Runner has not created the experiment job yet
    #[serde(rename = "Waiting for Job Creation")]
    Waiting,
    /// Referenced ChaosExperiment does not exist
    #[serde(rename = "ChaosExperiment Not Found")]
    NotFound,
    /// Experiment was interrupted by an abort
    #[serde(rename = "Forcefully Aborted")]
    Aborted,
    /// Experiment was skipped by the runner
    Skipped,
}

impl ExperimentStatus {
    /// True while the experiment may still inject chaos
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }
}

/// Status entry for one experiment of a ChaosEngine
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStatuses {
    /// Experiment name
    pub name: String,

    /// Runner pod that drives the experiment
    #[serde(default)]
    pub runner: String,

    /// Experiment pod name
    #[serde(default)]
    pub experiment_pod: String,

    /// Current progress
    pub status: ExperimentStatus,

    /// Verdict reported by the experiment (Awaited, Pass, Fail, Stopped)
    #[serde(default)]
    pub verdict: String,

    /// Last time this entry changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,
}

/// Legacy single-application target descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ApplicationParams {
    /// Namespace of the application under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appns: Option<String>,

    /// Label selector of the application under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applabel: Option<String>,

    /// Workload kind of the application under test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appkind: Option<String>,
}

impl ApplicationParams {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        blank(&self.appns) && blank(&self.applabel) && blank(&self.appkind)
    }
}

/// Selector-based target selection; takes precedence over `appinfo`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Selector {
    /// Workload selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workloads: Option<Vec<Workload>>,

    /// Pod selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<Vec<PodSelector>>,
}

/// One workload target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Workload {
    /// Workload kind (deployment, statefulset, ...)
    pub kind: String,

    /// Workload namespace
    pub namespace: String,

    /// Comma separated workload names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<String>,

    /// Label selector used when `names` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
}

/// One pod target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PodSelector {
    /// Pod namespace
    pub namespace: String,

    /// Comma separated pod names
    #[serde(default)]
    pub names: String,
}

/// ConfigMap or Secret mounted into the runner
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MountedObject {
    /// Object name
    pub name: String,

    /// Mount path inside the runner container
    pub mount_path: String,
}

/// Runner pod customization
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerInfo {
    /// Runner image; falls back to the operator default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy (defaults to IfNotPresent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Image pull secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,

    /// Container args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Container command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// ConfigMaps mounted into the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_maps: Option<Vec<MountedObject>>,

    /// Secrets mounted into the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<MountedObject>>,

    /// Extra annotations for the runner pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub runner_annotations: BTreeMap<String, String>,

    /// Extra labels for the runner pod; may override the fixed labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub runner_labels: BTreeMap<String, String>,

    /// Node selector for the runner pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations for the runner pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Resource requirements for the runner container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Component overrides
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ComponentParams {
    /// Runner overrides
    #[serde(default)]
    pub runner: RunnerInfo,
}

/// Reference to a ChaosExperiment by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ExperimentList {
    /// ChaosExperiment name in the engine's namespace
    pub name: String,
}

/// One entry in the ChaosResult target history
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    /// Target name
    pub name: String,

    /// Target kind
    pub kind: String,

    /// Last chaos status seen for the target (injected, reverted, targeted)
    pub chaos_status: String,
}

pub(crate) fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}
