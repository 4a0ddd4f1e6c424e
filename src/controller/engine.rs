//! ChaosEngine controller implementation
//!
//! Each pass fetches the engine, handles the deletion marker, applies
//! defaults and the finalizer, and then dispatches on the pair
//! (desired state, observed status):
//!
//! | state  | status      | action                              |
//! |--------|-------------|-------------------------------------|
//! | active | initialized | ensure the runner, watch completion |
//! | stop   | completed   | graceful cleanup                    |
//! | stop   | initialized | abort                               |
//! | active | stopped     | restart after abort                 |
//! | active | completed   | restart after completion            |
//!
//! Every other pair is a no-op. Writes are diffs against the snapshot read
//! at the start of the pass; a stale snapshot surfaces as a conflict and the
//! pass is requeued immediately instead of being treated as a failure.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::cleanup::{force_remove_chaos_resources, graceful_remove_default_resources};
use super::client::{EngineKubeClient, EngineKubeClientImpl, EnginePatch};
use super::finalizer::{
    add_finalizer, has_finalizer, remove_finalizer, PreDeleteHook, PRE_DELETE_HOOKS,
};
use super::status::{sync_chaos_result, wait_for_chaos_pod_termination};
use crate::config::OperatorConfig;
use crate::crd::{ChaosEngine, EngineState, EngineStatus, ExperimentStatus};
use crate::discovery::{AssumeResultCrdPresent, KubeResultCrdProbe, ResultCrdProbe};
use crate::events::{EngineObserver, FailurePhase, KubeEventObserver};
use crate::retry::RetryPolicy;
use crate::runner::{build_runner_pod, is_runner_completed, resolve_runner_image, RunnerInputs};
use crate::targets::{chaos_selector, derive_targets, experiment_list, validate_target_selection};
use crate::Error;

/// Name the controller reports events under
pub const CONTROLLER_NAME: &str = "chaos-operator";

/// Controller context shared by every reconcile pass
///
/// Construct with [`Context::builder`]; collaborators default to the real
/// Kubernetes-backed implementations.
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn EngineKubeClient>,
    /// Receiver of lifecycle notifications
    pub observer: Arc<dyn EngineObserver>,
    /// Capability probe for the ChaosResult CRD
    pub result_probe: Arc<dyn ResultCrdProbe>,
    /// Operator-level runner image (engine spec still wins)
    pub runner_image: String,
    /// Process-wide client identifier passed to runners
    pub client_uuid: String,
    /// Bounded wait used after an abort
    pub termination_wait: RetryPolicy,
    /// Cancelled on shutdown; long waits observe it
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom collaborators
    ///
    /// This method is primarily for unit tests where a real Kubernetes
    /// client is not available. For production code, use [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn EngineKubeClient>,
        observer: Arc<dyn EngineObserver>,
        result_probe: Arc<dyn ResultCrdProbe>,
    ) -> Self {
        Self {
            kube,
            observer,
            result_probe,
            runner_image: crate::config::DEFAULT_RUNNER_IMAGE.to_string(),
            client_uuid: "test-client-uuid".to_string(),
            termination_wait: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(config)
///     .cancel_token(token.clone())
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    kube: Option<Arc<dyn EngineKubeClient>>,
    observer: Option<Arc<dyn EngineObserver>>,
    result_probe: Option<Arc<dyn ResultCrdProbe>>,
    cancel: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            config: OperatorConfig::default(),
            kube: None,
            observer: None,
            result_probe: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Apply operator configuration
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a cancellation token with the caller
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn EngineKubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the notification observer
    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Override the ChaosResult CRD probe
    pub fn result_probe(mut self, probe: Arc<dyn ResultCrdProbe>) -> Self {
        self.result_probe = Some(probe);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let mut config = self.config;
        let client = self.client;

        let result_probe = self.result_probe.unwrap_or_else(|| {
            if config.is_namespace_scoped() {
                Arc::new(AssumeResultCrdPresent)
            } else {
                Arc::new(KubeResultCrdProbe::new(client.clone()))
            }
        });

        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(EngineKubeClientImpl::new(client.clone()))),
            observer: self
                .observer
                .unwrap_or_else(|| {
                    Arc::new(KubeEventObserver::new(client.clone(), CONTROLLER_NAME))
                }),
            result_probe,
            runner_image: config.default_runner_image().to_string(),
            client_uuid: config.resolve_client_uuid(),
            termination_wait: config.termination_wait(),
            cancel: self.cancel,
        }
    }
}

/// Reconcile a ChaosEngine resource
///
/// The object handed in by the controller runtime only names the engine;
/// the pass always works from a fresh read so its writes carry a current
/// `resourceVersion`.
#[instrument(
    skip(engine, ctx),
    fields(engine = %engine.name_any(), namespace = ?engine.namespace())
)]
pub async fn reconcile(engine: Arc<ChaosEngine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = engine.name_any();
    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    debug!("reconciling chaosengine");

    let Some(current) = ctx.kube.get_engine(&namespace, &name).await? else {
        debug!("chaosengine no longer exists");
        return Ok(Action::await_change());
    };

    match reconcile_engine(current, &ctx).await {
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "stale chaosengine snapshot, requeueing");
            Ok(Action::requeue(Duration::ZERO))
        }
        other => other,
    }
}

/// Error policy for the controller
///
/// Logs the failure and requeues after a fixed delay.
pub fn error_policy(engine: Arc<ChaosEngine>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        engine = %engine.name_any(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}

async fn reconcile_engine(engine: ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    if engine.is_being_deleted() {
        info!("chaosengine is being deleted, removing chaos resources");
        return reconcile_for_delete(&engine, ctx).await;
    }

    if init_engine(&engine, ctx).await? {
        return Ok(Action::requeue(Duration::ZERO));
    }

    let state = engine.engine_state();
    let status = engine.engine_status();
    match (state, status) {
        (EngineState::Active, Some(EngineStatus::Initialized)) => {
            reconcile_for_creation_and_running(&engine, ctx).await
        }
        (EngineState::Stop, Some(EngineStatus::Completed)) => {
            reconcile_for_complete(&engine, ctx).await
        }
        (EngineState::Stop, Some(EngineStatus::Initialized)) => {
            reconcile_for_delete(&engine, ctx).await
        }
        (EngineState::Active, Some(EngineStatus::Stopped)) => {
            reconcile_for_restart_after_abort(&engine, ctx).await
        }
        (EngineState::Active, Some(EngineStatus::Completed)) => {
            reconcile_for_restart_after_complete(&engine, ctx).await
        }
        _ => {
            debug!(%state, ?status, "nothing to do");
            Ok(Action::await_change())
        }
    }
}

/// Apply defaults and the finalizer. Returns true when a write was made.
async fn init_engine(engine: &ChaosEngine, ctx: &Context) -> Result<bool, Error> {
    let mut desired = engine.clone();
    if desired.spec.engine_state.is_none() {
        desired.spec.engine_state = Some(EngineState::Active);
    }
    if desired.engine_state() == EngineState::Active && desired.engine_status().is_none() {
        desired.set_engine_status(EngineStatus::Initialized);
    }
    let finalizer_added = desired.engine_status() == Some(EngineStatus::Initialized)
        && add_finalizer(&mut desired);

    let Some(patch) = EnginePatch::diff(engine, &desired) else {
        return Ok(false);
    };

    let (name, namespace) = identity(engine)?;
    if let Err(e) = ctx.kube.patch_engine(&namespace, &name, &patch).await {
        return Err(report(
            ctx,
            engine,
            FailurePhase::ChaosInit,
            "Unable to initialize chaosengine",
            e,
        )
        .await);
    }

    if finalizer_added {
        info!("chaosengine initialized");
        ctx.observer.initialized(&desired).await;
    }
    Ok(true)
}

async fn reconcile_for_creation_and_running(
    engine: &ChaosEngine,
    ctx: &Context,
) -> Result<Action, Error> {
    let (name, namespace) = identity(engine)?;

    let runner = match ctx.kube.get_pod(&namespace, &engine.runner_name()).await {
        Ok(Some(runner)) => runner,
        Ok(None) => return create_runner(engine, ctx).await,
        Err(e) => {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosRunning,
                "Unable to check chaos status",
                e,
            )
            .await)
        }
    };

    if !is_runner_completed(&runner) {
        debug!(runner = %runner.name_any(), "chaos runner still in progress");
        return Ok(Action::await_change());
    }

    let mut desired = engine.clone();
    desired.set_engine_status(EngineStatus::Completed);
    desired.spec.engine_state = Some(EngineState::Stop);

    if let Some(patch) = EnginePatch::diff(engine, &desired) {
        if let Err(e) = ctx.kube.patch_engine(&namespace, &name, &patch.spec_first()).await {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosCompleted,
                "Unable to update chaosengine",
                e,
            )
            .await);
        }
        info!("chaos runner completed");
        ctx.observer.completed(&desired).await;
    }

    Ok(Action::await_change())
}

async fn create_runner(engine: &ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    let (name, namespace) = identity(engine)?;

    let selection = validate_target_selection(engine).and_then(|()| experiment_list(engine));
    let experiments = match selection {
        Ok(list) => list,
        Err(e) => return Err(stop_invalid_engine(engine, ctx, e).await),
    };

    let inputs = RunnerInputs {
        image: resolve_runner_image(engine, &ctx.runner_image),
        client_uuid: ctx.client_uuid.clone(),
        targets: derive_targets(engine),
        experiment_list: experiments,
    };
    info!(
        targets = %inputs.targets,
        experiments = %inputs.experiment_list,
        image = %inputs.image,
        "launching chaos runner"
    );

    let Some(first) = engine.spec.experiments.first() else {
        return Err(Error::validation("application experiment list is empty"));
    };
    let experiment = match ctx.kube.get_experiment(&namespace, &first.name).await {
        Ok(experiment) => experiment,
        Err(e) => {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosStart,
                "Unable to get chaos resources",
                e,
            )
            .await)
        }
    };

    let pod = build_runner_pod(engine, &experiment, &inputs);
    match ctx.kube.create_pod(&namespace, &pod).await {
        Ok(()) => {
            info!(runner = %engine.runner_name(), "chaos runner created");
            ctx.observer.runner_created(engine).await;
        }
        Err(e) if e.is_already_exists() => {
            debug!(engine = %name, "chaos runner already exists");
        }
        Err(e) => {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosStart,
                "Unable to create chaos runner",
                e,
            )
            .await)
        }
    }

    Ok(Action::await_change())
}

/// Force the engine to stop after a spec it cannot run, then return the cause
async fn stop_invalid_engine(engine: &ChaosEngine, ctx: &Context, cause: Error) -> Error {
    warn!(error = %cause, "chaosengine spec is invalid, stopping it");

    let mut desired = engine.clone();
    desired.spec.engine_state = Some(EngineState::Stop);
    if let Some(patch) = EnginePatch::diff(engine, &desired) {
        let written = match identity(engine) {
            Ok((name, namespace)) => ctx.kube.patch_engine(&namespace, &name, &patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return report(
                ctx,
                engine,
                FailurePhase::ChaosStop,
                "Unable to update chaosengine",
                e,
            )
            .await;
        }
    }

    ctx.observer
        .operation_failed(engine, FailurePhase::ChaosStart, &cause.to_string())
        .await;
    cause
}

async fn reconcile_for_complete(engine: &ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    if let Err(e) = graceful_remove_default_resources(ctx.kube.as_ref(), engine).await {
        return Err(report(
            ctx,
            engine,
            FailurePhase::ChaosCompletion,
            "Unable to delete chaos pods upon chaos completion",
            e,
        )
        .await);
    }
    Ok(Action::await_change())
}

/// Abort chaos: run the pre-delete hooks, then release the engine.
async fn reconcile_for_delete(engine: &ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    let (name, namespace) = identity(engine)?;
    let kube = ctx.kube.as_ref();

    let chaos_pods = match kube.list_pods(&namespace, &chaos_selector(engine)).await {
        Ok(pods) => pods,
        Err(e) => {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosStop,
                "Unable to list chaos experiment pods",
                e,
            )
            .await)
        }
    };
    let had_chaos_pods = !chaos_pods.is_empty();

    for hook in PRE_DELETE_HOOKS {
        debug!(%hook, "running pre-delete hook");
        let outcome = match hook {
            PreDeleteHook::RemoveChaosResources if had_chaos_pods => {
                info!(count = chaos_pods.len(), "force deleting chaos experiment pods");
                force_remove_chaos_resources(kube, engine).await
            }
            PreDeleteHook::RemoveChaosResources => Ok(()),
            PreDeleteHook::AwaitChaosPodTermination => {
                wait_for_chaos_pod_termination(kube, engine, &ctx.termination_wait, &ctx.cancel)
                    .await
            }
            PreDeleteHook::SyncChaosResult => {
                sync_chaos_result(kube, ctx.result_probe.as_ref(), engine).await
            }
        };
        if let Err(e) = outcome {
            let message = match hook {
                PreDeleteHook::RemoveChaosResources => "Unable to delete chaos experiment pods",
                PreDeleteHook::AwaitChaosPodTermination => "Chaos pods did not terminate",
                PreDeleteHook::SyncChaosResult => "Unable to update chaos result",
            };
            return Err(report(ctx, engine, FailurePhase::ChaosStop, message, e).await);
        }
    }

    let mut desired = engine.clone();
    remove_finalizer(&mut desired);
    abort_in_flight_experiments(&mut desired, Time(chrono::Utc::now()));
    desired.set_engine_status(EngineStatus::Stopped);

    if let Some(patch) = EnginePatch::diff(engine, &desired) {
        match kube.patch_engine(&namespace, &name, &patch).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(report(
                    ctx,
                    engine,
                    FailurePhase::ChaosStop,
                    "Unable to update chaosengine",
                    e,
                )
                .await)
            }
        }
    }

    if had_chaos_pods {
        info!("chaos resources deleted");
        ctx.observer.stopped(&desired).await;
    }
    Ok(Action::await_change())
}

async fn reconcile_for_restart_after_abort(
    engine: &ChaosEngine,
    ctx: &Context,
) -> Result<Action, Error> {
    restart(engine, ctx, false).await
}

/// The finalizer was kept through completion in case pods were retained.
/// Dropping it here makes the next pass re-run initialization exactly as
/// for a new engine.
async fn reconcile_for_restart_after_complete(
    engine: &ChaosEngine,
    ctx: &Context,
) -> Result<Action, Error> {
    restart(engine, ctx, true).await
}

async fn restart(
    engine: &ChaosEngine,
    ctx: &Context,
    drop_finalizer: bool,
) -> Result<Action, Error> {
    let (name, namespace) = identity(engine)?;

    if let Err(e) = force_remove_chaos_resources(ctx.kube.as_ref(), engine).await {
        return Err(report(
            ctx,
            engine,
            FailurePhase::ChaosRestart,
            "Unable to delete chaos resources",
            e,
        )
        .await);
    }

    let mut desired = engine.clone();
    desired.set_engine_status(EngineStatus::Initialized);
    desired.experiments_mut().clear();
    if drop_finalizer {
        remove_finalizer(&mut desired);
    }

    if let Some(mut patch) = EnginePatch::diff(engine, &desired) {
        if drop_finalizer {
            patch = patch.spec_first();
        }
        if let Err(e) = ctx.kube.patch_engine(&namespace, &name, &patch).await {
            return Err(report(
                ctx,
                engine,
                FailurePhase::ChaosRestart,
                "Unable to update chaosengine",
                e,
            )
            .await);
        }
    }

    info!(finalizer_present = has_finalizer(&desired), "chaosengine restarted");
    ctx.observer.restarted(&desired).await;
    Ok(Action::await_change())
}

/// Mark experiments that may still be injecting chaos as aborted
fn abort_in_flight_experiments(engine: &mut ChaosEngine, now: Time) {
    for experiment in engine.experiments_mut() {
        if experiment.status.is_in_flight() {
            experiment.status = ExperimentStatus::Aborted;
            experiment.verdict = "Stopped".to_string();
            experiment.last_update_time = Some(now.clone());
        }
    }
}

fn identity(engine: &ChaosEngine) -> Result<(String, String), Error> {
    let namespace = engine.namespace().ok_or(Error::MissingNamespace)?;
    Ok((engine.name_any(), namespace))
}

/// Emit a warning for an operational failure and hand the error back.
///
/// Conflicts and cancellations are not failures of the engine and are
/// passed through silently.
async fn report(
    ctx: &Context,
    engine: &ChaosEngine,
    phase: FailurePhase,
    message: &str,
    err: Error,
) -> Error {
    if err.is_conflict() || matches!(err, Error::Cancelled(_)) {
        return err;
    }
    warn!(%phase, error = %err, "{}", message);
    ctx.observer.operation_failed(engine, phase, message).await;
    err
}
