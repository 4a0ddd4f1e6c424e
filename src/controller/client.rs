//! Kubernetes access for the ChaosEngine controller
//!
//! Everything the reconciler reads or writes goes through [`EngineKubeClient`]
//! so the state machine can be driven by mocks or an in-memory cluster in
//! tests.
//!
//! Writes are expressed as diffs computed from an immutable snapshot. Each
//! diff carries the `resourceVersion` it was computed from; the API server
//! rejects it with 409 Conflict if anyone wrote the object in between.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    ChaosEngine, ChaosEngineStatus, ChaosExperiment, ChaosResult, EngineState, TargetDetails,
};
use crate::error::is_not_found;
use crate::targets::{to_selector_string, CHAOS_UID_LABEL};
use crate::Error;

/// Order in which the two halves of an [`EnginePatch`] are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteOrder {
    /// Status subresource, then spec/metadata
    #[default]
    StatusFirst,
    /// Spec/metadata, then status subresource
    SpecFirst,
}

/// Difference between two snapshots of a ChaosEngine.
///
/// Only fields the controller owns are tracked. `None` means unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnginePatch {
    /// Version of the snapshot the diff was computed from
    pub resource_version: Option<String>,
    /// New desired state
    pub engine_state: Option<EngineState>,
    /// New finalizer list
    pub finalizers: Option<Vec<String>>,
    /// New status block
    pub status: Option<ChaosEngineStatus>,
    /// Which half is written first when both changed
    pub order: WriteOrder,
}

impl EnginePatch {
    /// Compute the patch turning `before` into `after`, or `None` when they match
    pub fn diff(before: &ChaosEngine, after: &ChaosEngine) -> Option<Self> {
        let engine_state = (before.spec.engine_state != after.spec.engine_state)
            .then(|| after.engine_state());
        let finalizers = (before.finalizers() != after.finalizers())
            .then(|| after.finalizers().to_vec());
        let status = (before.status != after.status)
            .then(|| after.status.clone().unwrap_or_default());

        if engine_state.is_none() && finalizers.is_none() && status.is_none() {
            return None;
        }

        Some(Self {
            resource_version: before.resource_version(),
            engine_state,
            finalizers,
            status,
            order: WriteOrder::StatusFirst,
        })
    }

    /// Write spec/metadata before status
    pub fn spec_first(mut self) -> Self {
        self.order = WriteOrder::SpecFirst;
        self
    }

    /// True when the spec/metadata half has changes
    pub fn touches_spec(&self) -> bool {
        self.engine_state.is_some() || self.finalizers.is_some()
    }

    /// Merge patch body for the status subresource
    pub fn status_body(&self, resource_version: Option<&str>) -> Option<Value> {
        let status = self.status.as_ref()?;
        Some(json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        }))
    }

    /// Merge patch body for the main resource
    pub fn spec_body(&self, resource_version: Option<&str>) -> Option<Value> {
        if !self.touches_spec() {
            return None;
        }
        let mut metadata = Map::new();
        metadata.insert("resourceVersion".to_string(), json!(resource_version));
        if let Some(finalizers) = &self.finalizers {
            metadata.insert("finalizers".to_string(), json!(finalizers));
        }
        let mut body = json!({ "metadata": metadata });
        if let Some(state) = self.engine_state {
            body["spec"] = json!({ "engineState": state });
        }
        Some(body)
    }
}

/// Annotation drain computed for one ChaosResult
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultDrain {
    /// Version of the snapshot the drain was computed from
    pub resource_version: Option<String>,
    /// Full target history after the upserts
    pub targets: Vec<TargetDetails>,
    /// Annotation keys consumed by the drain
    pub consumed_keys: Vec<String>,
}

impl ResultDrain {
    /// Merge patch body writing the target history
    pub fn status_body(&self) -> Value {
        json!({
            "metadata": { "resourceVersion": self.resource_version },
            "status": { "history": { "targets": self.targets } },
        })
    }

    /// Merge patch body removing exactly the consumed annotations
    pub fn annotations_body(&self, resource_version: Option<&str>) -> Value {
        let removed: Map<String, Value> = self
            .consumed_keys
            .iter()
            .map(|k| (k.clone(), Value::Null))
            .collect();
        json!({
            "metadata": {
                "resourceVersion": resource_version,
                "annotations": removed,
            }
        })
    }
}

/// Cluster operations needed by the ChaosEngine reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EngineKubeClient: Send + Sync {
    /// Fetch a ChaosEngine, `None` if it no longer exists
    async fn get_engine(&self, namespace: &str, name: &str) -> Result<Option<ChaosEngine>, Error>;

    /// Apply a snapshot diff to a ChaosEngine
    async fn patch_engine(
        &self,
        namespace: &str,
        name: &str,
        patch: &EnginePatch,
    ) -> Result<(), Error>;

    /// Fetch a ChaosExperiment definition
    async fn get_experiment(&self, namespace: &str, name: &str) -> Result<ChaosExperiment, Error>;

    /// Fetch a pod, `None` if it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error>;

    /// Create a pod
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), Error>;

    /// List pods matching every label in `labels`
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error>;

    /// Delete one pod; a missing pod counts as deleted
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Delete every pod matching `labels` with background propagation
    async fn delete_all_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        grace_period: Option<u32>,
    ) -> Result<(), Error>;

    /// Delete every batch Job matching `labels` with background propagation
    async fn delete_all_jobs(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        grace_period: Option<u32>,
    ) -> Result<(), Error>;

    /// List ChaosResults correlated to a chaos identifier
    async fn list_results(&self, namespace: &str, chaos_uid: &str)
        -> Result<Vec<ChaosResult>, Error>;

    /// Persist a drain: target history first, then annotation removal
    async fn persist_result_drain(
        &self,
        namespace: &str,
        name: &str,
        drain: &ResultDrain,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct EngineKubeClientImpl {
    client: Client,
}

impl EngineKubeClientImpl {
    /// Create a new EngineKubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn delete_params(grace_period: Option<u32>) -> DeleteParams {
        let params = DeleteParams::background();
        match grace_period {
            Some(seconds) => params.grace_period(seconds),
            None => params,
        }
    }
}

#[async_trait]
impl EngineKubeClient for EngineKubeClientImpl {
    async fn get_engine(&self, namespace: &str, name: &str) -> Result<Option<ChaosEngine>, Error> {
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_engine(
        &self,
        namespace: &str,
        name: &str,
        patch: &EnginePatch,
    ) -> Result<(), Error> {
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();
        let mut version = patch.resource_version.clone();

        let halves = match patch.order {
            WriteOrder::StatusFirst => [true, false],
            WriteOrder::SpecFirst => [false, true],
        };

        for status_half in halves {
            let body = if status_half {
                patch.status_body(version.as_deref())
            } else {
                patch.spec_body(version.as_deref())
            };
            let Some(body) = body else {
                continue;
            };

            let updated = if status_half {
                api.patch_status(name, &params, &Patch::Merge(&body)).await
            } else {
                api.patch(name, &params, &Patch::Merge(&body)).await
            }
            .map_err(Error::from_kube)?;

            debug!(
                engine = %name,
                status = status_half,
                "patched ChaosEngine"
            );
            version = updated.resource_version();
        }

        Ok(())
    }

    async fn get_experiment(&self, namespace: &str, name: &str) -> Result<ChaosExperiment, Error> {
        let api: Api<ChaosExperiment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), pod)
            .await
            .map_err(Error::from_kube)?;
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&to_selector_string(labels));
        Ok(api.list(&params).await?.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::from_kube(e)),
        }
    }

    async fn delete_all_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        grace_period: Option<u32>,
    ) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = ListParams::default().labels(&to_selector_string(labels));
        api.delete_collection(&Self::delete_params(grace_period), &list)
            .await?;
        Ok(())
    }

    async fn delete_all_jobs(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        grace_period: Option<u32>,
    ) -> Result<(), Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let list = ListParams::default().labels(&to_selector_string(labels));
        api.delete_collection(&Self::delete_params(grace_period), &list)
            .await?;
        Ok(())
    }

    async fn list_results(
        &self,
        namespace: &str,
        chaos_uid: &str,
    ) -> Result<Vec<ChaosResult>, Error> {
        let api: Api<ChaosResult> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{}={}", CHAOS_UID_LABEL, chaos_uid));
        Ok(api.list(&params).await?.items)
    }

    async fn persist_result_drain(
        &self,
        namespace: &str,
        name: &str,
        drain: &ResultDrain,
    ) -> Result<(), Error> {
        let api: Api<ChaosResult> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();

        let updated = api
            .patch_status(name, &params, &Patch::Merge(&drain.status_body()))
            .await
            .map_err(Error::from_kube)?;

        if drain.consumed_keys.is_empty() {
            return Ok(());
        }

        let body = drain.annotations_body(updated.resource_version().as_deref());
        api.patch(name, &params, &Patch::Merge(&body))
            .await
            .map_err(Error::from_kube)?;

        debug!(
            result = %name,
            consumed = drain.consumed_keys.len(),
            "drained ChaosResult annotations"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ChaosEngineSpec, EngineStatus, ENGINE_FINALIZER};

    fn snapshot() -> ChaosEngine {
        let mut engine = ChaosEngine::new("nginx-chaos", ChaosEngineSpec::default());
        engine.metadata.namespace = Some("default".to_string());
        engine.metadata.resource_version = Some("41".to_string());
        engine
    }

    #[test]
    fn unchanged_snapshot_produces_no_patch() {
        let before = snapshot();
        assert_eq!(EnginePatch::diff(&before, &before.clone()), None);
    }

    /// Story: first initialization writes status and finalizer against the version read
    #[test]
    fn story_init_diff_carries_status_finalizer_and_version() {
        let before = snapshot();
        let mut after = before.clone();
        after.set_engine_status(EngineStatus::Initialized);
        after
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(ENGINE_FINALIZER.to_string());

        let patch = EnginePatch::diff(&before, &after).unwrap();
        assert_eq!(patch.resource_version.as_deref(), Some("41"));
        assert_eq!(patch.finalizers, Some(vec![ENGINE_FINALIZER.to_string()]));
        assert_eq!(patch.engine_state, None);
        assert_eq!(patch.order, WriteOrder::StatusFirst);

        let status = patch.status_body(Some("41")).unwrap();
        assert_eq!(status["status"]["engineStatus"], "initialized");
        assert_eq!(status["metadata"]["resourceVersion"], "41");

        let spec = patch.spec_body(Some("42")).unwrap();
        assert_eq!(spec["metadata"]["finalizers"][0], ENGINE_FINALIZER);
        assert_eq!(spec["metadata"]["resourceVersion"], "42");
        assert!(spec.get("spec").is_none());
    }

    #[test]
    fn state_only_diff_has_no_status_half() {
        let before = snapshot();
        let mut after = before.clone();
        after.spec.engine_state = Some(EngineState::Stop);

        let patch = EnginePatch::diff(&before, &after).unwrap();
        assert!(patch.status_body(None).is_none());
        let spec = patch.spec_body(Some("41")).unwrap();
        assert_eq!(spec["spec"]["engineState"], "stop");
        assert!(spec["metadata"].get("finalizers").is_none());
    }

    #[test]
    fn removing_last_finalizer_writes_empty_list() {
        let mut before = snapshot();
        before.metadata.finalizers = Some(vec![ENGINE_FINALIZER.to_string()]);
        let mut after = before.clone();
        after.metadata.finalizers = None;

        let patch = EnginePatch::diff(&before, &after).unwrap();
        assert_eq!(patch.finalizers, Some(vec![]));
        let spec = patch.spec_body(None).unwrap();
        assert_eq!(spec["metadata"]["finalizers"], json!([]));
    }

    #[test]
    fn drain_removes_only_consumed_annotations() {
        let drain = ResultDrain {
            resource_version: Some("7".to_string()),
            targets: vec![TargetDetails {
                name: "nginx".to_string(),
                kind: "deployment".to_string(),
                chaos_status: "injected".to_string(),
            }],
            consumed_keys: vec!["deployment/nginx".to_string()],
        };

        let status = drain.status_body();
        assert_eq!(status["metadata"]["resourceVersion"], "7");
        assert_eq!(status["status"]["history"]["targets"][0]["chaosStatus"], "injected");

        let annotations = drain.annotations_body(Some("8"));
        assert_eq!(
            annotations["metadata"]["annotations"],
            json!({ "deployment/nginx": null })
        );
        assert_eq!(annotations["metadata"]["resourceVersion"], "8");
    }
}
