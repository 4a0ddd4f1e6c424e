//! ChaosExperiment Custom Resource Definition
//!
//! Read-only from this controller's perspective: only the security context
//! of the first referenced experiment is inherited by the runner pod.

use k8s_openapi::api::core::v1::{PodSecurityContext, SecurityContext};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a ChaosExperiment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    /// Execution definition of the experiment
    #[serde(default)]
    pub definition: ExperimentDef,
}

/// How the experiment executes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDef {
    /// Experiment image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Experiment command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Experiment args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Security contexts the runner inherits
    #[serde(default)]
    pub security_context: ExperimentSecurityContext,
}

/// Pod and container security contexts of an experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSecurityContext {
    /// Container-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_security_context: Option<SecurityContext>,

    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
}
