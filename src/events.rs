//! Notifications emitted while reconciling ChaosEngines.
//!
//! The controller talks to an [`EngineObserver`] with one method per
//! notification kind. The production implementation publishes standard
//! Kubernetes Events (visible via `kubectl describe chaosengine`); tests use
//! the generated mock to assert what was emitted.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::crd::ChaosEngine;

/// Phase of the lifecycle an operational failure happened in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePhase {
    /// Applying defaults and the finalizer
    ChaosInit,
    /// Launching the runner
    ChaosStart,
    /// Watching the runner for completion
    ChaosRunning,
    /// Recording completion on the engine
    ChaosCompleted,
    /// Removing default resources after completion
    ChaosCompletion,
    /// Aborting or deleting the engine
    ChaosStop,
    /// Restarting a completed or stopped engine
    ChaosRestart,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChaosInit => write!(f, "chaos init"),
            Self::ChaosStart => write!(f, "chaos start"),
            Self::ChaosRunning => write!(f, "chaos running"),
            Self::ChaosCompleted => write!(f, "chaos completed"),
            Self::ChaosCompletion => write!(f, "chaos completion"),
            Self::ChaosStop => write!(f, "chaos stop"),
            Self::ChaosRestart => write!(f, "chaos restart"),
        }
    }
}

/// Observer of ChaosEngine lifecycle notifications.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EngineObserver: Send + Sync {
    /// Finalizer added on first initialization
    async fn initialized(&self, engine: &ChaosEngine);

    /// Runner pod created
    async fn runner_created(&self, engine: &ChaosEngine);

    /// Chaos resources removed by an abort
    async fn stopped(&self, engine: &ChaosEngine);

    /// Runner reported completion
    async fn completed(&self, engine: &ChaosEngine);

    /// Engine moved back to Initialized for another run
    async fn restarted(&self, engine: &ChaosEngine);

    /// An API operation failed during `phase`
    async fn operation_failed(&self, engine: &ChaosEngine, phase: FailurePhase, message: &str);
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// Finalizer added, runner about to launch
    pub const ENGINE_INITIALIZED: &str = "ChaosEngineInitialized";
    /// Runner pod created
    pub const RUNNER_CREATED: &str = "ChaosRunnerCreated";
    /// Abort removed chaos resources
    pub const ENGINE_STOPPED: &str = "ChaosEngineStopped";
    /// Runner finished
    pub const ENGINE_COMPLETED: &str = "ChaosEngineCompleted";
    /// Engine restarted
    pub const RESTART_IN_PROGRESS: &str = "RestartInProgress";
    /// Any API failure
    pub const OPERATION_FAILED: &str = "ChaosResourcesOperationFailed";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Launching the runner
    pub const LAUNCH: &str = "Launch";
    /// Removing chaos resources
    pub const CLEANUP: &str = "Cleanup";
    /// Restarting chaos
    pub const RESTART: &str = "Restart";
}

/// Event note for a failed operation, prefixed with its phase
fn failure_note(phase: FailurePhase, message: &str) -> String {
    format!("({}) {}", phase, message)
}

/// Production observer wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventObserver {
    recorder: Recorder,
}

impl KubeEventObserver {
    /// Create a new observer reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    async fn publish(
        &self,
        engine: &ChaosEngine,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        let reference: ObjectReference = engine.object_ref(&());
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!(
                engine = %engine.name_any(),
                reason,
                error = %e,
                "failed to publish Kubernetes event"
            );
        }
    }
}

#[async_trait]
impl EngineObserver for KubeEventObserver {
    async fn initialized(&self, engine: &ChaosEngine) {
        self.publish(
            engine,
            EventType::Normal,
            reasons::ENGINE_INITIALIZED,
            actions::RECONCILE,
            format!(
                "Identifying app under test & launching {}",
                engine.runner_name()
            ),
        )
        .await;
    }

    async fn runner_created(&self, engine: &ChaosEngine) {
        self.publish(
            engine,
            EventType::Normal,
            reasons::RUNNER_CREATED,
            actions::LAUNCH,
            format!("Chaos runner {} created", engine.runner_name()),
        )
        .await;
    }

    async fn stopped(&self, engine: &ChaosEngine) {
        self.publish(
            engine,
            EventType::Normal,
            reasons::ENGINE_STOPPED,
            actions::CLEANUP,
            "Chaos resources deleted successfully".to_string(),
        )
        .await;
    }

    async fn completed(&self, engine: &ChaosEngine) {
        self.publish(
            engine,
            EventType::Normal,
            reasons::ENGINE_COMPLETED,
            actions::RECONCILE,
            "ChaosEngine completed, will delete or retain the resources according to jobCleanUpPolicy"
                .to_string(),
        )
        .await;
    }

    async fn restarted(&self, engine: &ChaosEngine) {
        self.publish(
            engine,
            EventType::Normal,
            reasons::RESTART_IN_PROGRESS,
            actions::RESTART,
            "ChaosEngine is restarted".to_string(),
        )
        .await;
    }

    async fn operation_failed(&self, engine: &ChaosEngine, phase: FailurePhase, message: &str) {
        self.publish(
            engine,
            EventType::Warning,
            reasons::OPERATION_FAILED,
            actions::RECONCILE,
            failure_note(phase, message),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_observer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KubeEventObserver>();
    }

    #[test]
    fn failure_phase_renders_as_event_prefix() {
        assert_eq!(FailurePhase::ChaosStop.to_string(), "chaos stop");
        assert_eq!(FailurePhase::ChaosCompletion.to_string(), "chaos completion");
        assert_eq!(FailurePhase::ChaosStart.to_string(), "chaos start");
    }

    #[test]
    fn story_failure_note_names_the_phase_first() {
        assert_eq!(
            failure_note(FailurePhase::ChaosStop, "Unable to list chaos experiment pods"),
            "(chaos stop) Unable to list chaos experiment pods"
        );
        assert_eq!(
            failure_note(FailurePhase::ChaosInit, "Unable to initialize chaosengine"),
            "(chaos init) Unable to initialize chaosengine"
        );
    }
}
