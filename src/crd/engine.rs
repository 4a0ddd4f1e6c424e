//! ChaosEngine Custom Resource Definition
//!
//! The ChaosEngine CRD declares one chaos run: what to target, which
//! experiments to execute, and whether chaos should be active or stopped.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ApplicationParams, CleanUpPolicy, ComponentParams, EngineState, EngineStatus,
    ExperimentList, ExperimentStatuses, Selector,
};

/// Finalizer that defers deletion until chaos resources are cleaned up
pub const ENGINE_FINALIZER: &str = "chaosengine.litmuschaos.io/finalizer";

/// Suffix of the deterministic runner pod name
pub const RUNNER_SUFFIX: &str = "-runner";

/// Specification for a ChaosEngine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosEngine",
    plural = "chaosengines",
    namespaced,
    status = "ChaosEngineStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".spec.engineState"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.engineStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineSpec {
    /// Legacy single-application target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appinfo: Option<ApplicationParams>,

    /// Selector-based targets; take precedence over `appinfo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Selector>,

    /// Service account used by the runner and experiments
    #[serde(default)]
    pub chaos_service_account: String,

    /// Component overrides
    #[serde(default)]
    pub components: ComponentParams,

    /// Experiments to run, in order
    #[serde(default)]
    pub experiments: Vec<ExperimentList>,

    /// Cleanup behaviour after a normal completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_clean_up_policy: Option<CleanUpPolicy>,

    /// Auxiliary applications, passed through to the runner
    #[serde(default)]
    pub auxiliary_app_info: String,

    /// Desired state; unset means active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_state: Option<EngineState>,

    /// Grace period applied when force-deleting chaos pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

/// Status for a ChaosEngine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineStatus {
    /// Observed lifecycle status; empty until first initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_status: Option<EngineStatus>,

    /// Per-experiment progress
    #[serde(default)]
    pub experiments: Vec<ExperimentStatuses>,
}

impl ChaosEngine {
    /// Desired state with the Active default applied
    pub fn engine_state(&self) -> EngineState {
        self.spec.engine_state.unwrap_or_default()
    }

    /// Observed status, `None` before initialization
    pub fn engine_status(&self) -> Option<EngineStatus> {
        self.status.as_ref().and_then(|s| s.engine_status)
    }

    /// Chaos identifier shared with spawned pods and the ChaosResult
    pub fn chaos_uid(&self) -> String {
        self.uid().unwrap_or_default()
    }

    /// Deterministic name of the runner pod
    pub fn runner_name(&self) -> String {
        format!("{}{}", self.name_any(), RUNNER_SUFFIX)
    }

    /// Cleanup policy with the Retain default applied
    pub fn clean_up_policy(&self) -> CleanUpPolicy {
        self.spec.job_clean_up_policy.unwrap_or_default()
    }

    /// Grace period for forced deletes, only when set and nonzero
    pub fn termination_grace_period(&self) -> Option<u32> {
        self.spec
            .termination_grace_period_seconds
            .filter(|s| *s > 0)
            .map(|s| u32::try_from(s).unwrap_or(u32::MAX))
    }

    /// True while the deletion marker is set
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Set the observed status, creating the status block if needed
    pub fn set_engine_status(&mut self, status: EngineStatus) {
        self.status
            .get_or_insert_with(ChaosEngineStatus::default)
            .engine_status = Some(status);
    }

    /// Mutable access to the experiment statuses
    pub fn experiments_mut(&mut self) -> &mut Vec<ExperimentStatuses> {
        &mut self
            .status
            .get_or_insert_with(ChaosEngineStatus::default)
            .experiments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn sample_engine() -> ChaosEngine {
        ChaosEngine {
            metadata: ObjectMeta {
                name: Some("nginx-chaos".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1234".to_string()),
                ..Default::default()
            },
            spec: ChaosEngineSpec::default(),
            status: None,
        }
    }

    /// Story: a freshly applied engine with no engineState is treated as active
    #[test]
    fn story_unset_engine_state_defaults_to_active() {
        let engine = sample_engine();
        assert_eq!(engine.engine_state(), EngineState::Active);
        assert_eq!(engine.engine_status(), None);
    }

    #[test]
    fn runner_name_is_derived_from_engine_name() {
        assert_eq!(sample_engine().runner_name(), "nginx-chaos-runner");
    }

    #[test]
    fn zero_grace_period_is_not_applied() {
        let mut engine = sample_engine();
        engine.spec.termination_grace_period_seconds = Some(0);
        assert_eq!(engine.termination_grace_period(), None);
        engine.spec.termination_grace_period_seconds = Some(30);
        assert_eq!(engine.termination_grace_period(), Some(30));
    }

    #[test]
    fn set_engine_status_creates_status_block() {
        let mut engine = sample_engine();
        engine.set_engine_status(EngineStatus::Initialized);
        assert_eq!(engine.engine_status(), Some(EngineStatus::Initialized));
    }

    #[test]
    fn spec_parses_litmus_manifest_fields() {
        let spec: ChaosEngineSpec = serde_json::from_value(serde_json::json!({
            "engineState": "stop",
            "jobCleanUpPolicy": "delete",
            "chaosServiceAccount": "pod-delete-sa",
            "terminationGracePeriodSeconds": 15,
            "experiments": [{"name": "pod-delete"}],
            "appinfo": {"appns": "default", "applabel": "app=nginx", "appkind": "deployment"}
        }))
        .unwrap();
        assert_eq!(spec.engine_state, Some(EngineState::Stop));
        assert_eq!(spec.job_clean_up_policy, Some(CleanUpPolicy::Delete));
        assert_eq!(spec.experiments[0].name, "pod-delete");
        assert_eq!(
            spec.appinfo.and_then(|a| a.appkind).as_deref(),
            Some("deployment")
        );
    }
}
