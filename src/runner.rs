//! Runner pod specification
//!
//! Builds the single runner pod that drives an engine's experiments and
//! recognizes when it has finished. Creation and lookup live in the
//! controller; everything here is a pure function of its inputs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, Pod, PodSpec, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::crd::{ChaosEngine, ChaosExperiment, MountedObject};
use crate::targets::runner_labels;

/// Name of the runner container inside the runner pod
pub const RUNNER_CONTAINER: &str = "chaos-runner";

/// Pull policy applied when the engine does not override it
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Restart policy of the runner pod
pub const RUNNER_RESTART_POLICY: &str = "OnFailure";

/// Environment names read by the runner, in the order they are set
pub mod env {
    /// Engine name
    pub const ENGINE: &str = "CHAOSENGINE";
    /// Canonical target string
    pub const TARGETS: &str = "TARGETS";
    /// Comma separated experiment names
    pub const EXPERIMENT_LIST: &str = "EXPERIMENT_LIST";
    /// Service account for experiment pods
    pub const SERVICE_ACCOUNT: &str = "CHAOS_SVC_ACC";
    /// Auxiliary application info
    pub const AUXILIARY_APPINFO: &str = "AUXILIARY_APPINFO";
    /// Process-wide client identifier
    pub const CLIENT_UUID: &str = "CLIENT_UUID";
    /// Engine namespace
    pub const NAMESPACE: &str = "CHAOS_NAMESPACE";
}

/// Inputs derived before the runner pod can be built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerInputs {
    /// Resolved runner image
    pub image: String,
    /// Process-wide client identifier
    pub client_uuid: String,
    /// Canonical target string
    pub targets: String,
    /// Comma separated experiment names
    pub experiment_list: String,
}

/// Pick the runner image: engine spec, then operator default.
///
/// `operator_default` already carries the built-in fallback.
pub fn resolve_runner_image(engine: &ChaosEngine, operator_default: &str) -> String {
    engine
        .spec
        .components
        .runner
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(operator_default)
        .to_string()
}

/// Runner environment in the fixed order the runner expects
pub fn runner_env(engine: &ChaosEngine, inputs: &RunnerInputs) -> Vec<EnvVar> {
    [
        (env::ENGINE, engine.name_any()),
        (env::TARGETS, inputs.targets.clone()),
        (env::EXPERIMENT_LIST, inputs.experiment_list.clone()),
        (env::SERVICE_ACCOUNT, engine.spec.chaos_service_account.clone()),
        (env::AUXILIARY_APPINFO, engine.spec.auxiliary_app_info.clone()),
        (env::CLIENT_UUID, inputs.client_uuid.clone()),
        (env::NAMESPACE, engine.namespace().unwrap_or_default()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    })
    .collect()
}

/// Volumes and mounts for the runner's configMaps and secrets
pub fn runner_volumes(engine: &ChaosEngine) -> (Vec<Volume>, Vec<VolumeMount>) {
    let runner = &engine.spec.components.runner;
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    for cm in runner.config_maps.iter().flatten() {
        volumes.push(Volume {
            name: cm.name.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(mount_for(cm));
    }

    for secret in runner.secrets.iter().flatten() {
        volumes.push(Volume {
            name: secret.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(mount_for(secret));
    }

    (volumes, mounts)
}

fn mount_for(object: &MountedObject) -> VolumeMount {
    VolumeMount {
        name: object.name.clone(),
        mount_path: object.mount_path.clone(),
        ..Default::default()
    }
}

/// Build the runner pod for an engine.
///
/// Optional fields are only set when the engine (or the first experiment,
/// for security contexts) provides a non-empty value, so the API server
/// applies its own defaults otherwise.
pub fn build_runner_pod(
    engine: &ChaosEngine,
    experiment: &ChaosExperiment,
    inputs: &RunnerInputs,
) -> Pod {
    let runner = &engine.spec.components.runner;
    let security = &experiment.spec.definition.security_context;
    let (volumes, mounts) = runner_volumes(engine);

    let container = Container {
        name: RUNNER_CONTAINER.to_string(),
        image: Some(inputs.image.clone()),
        image_pull_policy: Some(
            runner
                .image_pull_policy
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PULL_POLICY)
                .to_string(),
        ),
        env: Some(runner_env(engine, inputs)),
        args: runner.args.clone(),
        command: runner.command.clone(),
        volume_mounts: non_empty(mounts),
        resources: runner.resources.clone(),
        security_context: security.container_security_context.clone(),
        ..Default::default()
    };

    let annotations = (!runner.runner_annotations.is_empty())
        .then(|| runner.runner_annotations.clone());

    Pod {
        metadata: ObjectMeta {
            name: Some(engine.runner_name()),
            namespace: engine.namespace(),
            labels: Some(runner_labels(engine)),
            annotations,
            owner_references: engine.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            service_account_name: Some(engine.spec.chaos_service_account.clone())
                .filter(|sa| !sa.is_empty()),
            restart_policy: Some(RUNNER_RESTART_POLICY.to_string()),
            containers: vec![container],
            tolerations: runner.tolerations.clone(),
            node_selector: non_empty_map(&runner.node_selector),
            volumes: non_empty(volumes),
            image_pull_secrets: runner.image_pull_secrets.clone(),
            security_context: security.pod_security_context.clone(),
            ..Default::default()
        }),
        status: None,
    }
}

/// True once the runner container has exited cleanly.
///
/// The pod must be Running or Succeeded and the `chaos-runner` container
/// must be terminated with reason `Completed` and no longer ready.
pub fn is_runner_completed(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if !matches!(status.phase.as_deref(), Some("Running") | Some("Succeeded")) {
        return false;
    }

    status
        .container_statuses
        .iter()
        .flatten()
        .filter(|c| c.name == RUNNER_CONTAINER)
        .any(|c| {
            let completed = c
                .state
                .as_ref()
                .and_then(|s| s.terminated.as_ref())
                .and_then(|t| t.reason.as_deref())
                == Some("Completed");
            completed && !c.ready
        })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn non_empty_map(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}
