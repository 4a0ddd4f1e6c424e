//! ChaosEngine controller
//!
//! The reconciler in [`engine`] drives each ChaosEngine through its
//! lifecycle. Cluster access goes through [`EngineKubeClient`] so the
//! state machine can be exercised without an API server.

mod cleanup;
mod client;
mod engine;
mod finalizer;
mod status;

pub use cleanup::{force_remove_chaos_resources, graceful_remove_default_resources};
pub use client::{EngineKubeClient, EngineKubeClientImpl, EnginePatch, ResultDrain, WriteOrder};
pub use engine::{error_policy, reconcile, Context, ContextBuilder, CONTROLLER_NAME};
pub use finalizer::{
    add_finalizer, has_finalizer, remove_finalizer, PreDeleteHook, PRE_DELETE_HOOKS,
};
pub use status::{drain_chaos_status, sync_chaos_result, wait_for_chaos_pod_termination};
