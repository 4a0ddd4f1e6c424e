//! Operator configuration
//!
//! Every setting can come from a flag or from the environment the operator
//! Deployment sets, so the same binary works in and out of cluster.

use std::time::Duration;

use clap::Args;

use crate::retry::RetryPolicy;

/// Runner image used when neither the engine nor the operator names one
pub const DEFAULT_RUNNER_IMAGE: &str = "litmuschaos/chaos-runner:latest";

/// Operator-wide settings consumed by the reconciler
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Default runner image for engines that do not set one
    #[arg(long, env = "CHAOS_RUNNER_IMAGE")]
    pub runner_image: Option<String>,

    /// Restrict the operator to one namespace; unset watches all namespaces
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Client identifier passed to runners; generated when unset
    #[arg(long, env = "CLIENT_UUID")]
    pub client_uuid: Option<String>,

    /// Polls while waiting for chaos pods to terminate after an abort
    #[arg(long, default_value_t = 180)]
    pub termination_wait_attempts: u32,

    /// Seconds between termination polls
    #[arg(long, default_value_t = 1)]
    pub termination_wait_interval_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            runner_image: None,
            watch_namespace: None,
            client_uuid: None,
            termination_wait_attempts: 180,
            termination_wait_interval_secs: 1,
        }
    }
}

impl OperatorConfig {
    /// True when the operator only manages one namespace
    pub fn is_namespace_scoped(&self) -> bool {
        self.watch_namespace.as_deref().is_some_and(|ns| !ns.is_empty())
    }

    /// Operator-level runner image, falling back to the built-in default
    pub fn default_runner_image(&self) -> &str {
        self.runner_image
            .as_deref()
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_RUNNER_IMAGE)
    }

    /// Policy for the post-abort termination wait
    pub fn termination_wait(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.termination_wait_attempts,
            Duration::from_secs(self.termination_wait_interval_secs),
        )
    }

    /// Client identifier, generating a fresh one when none was configured
    pub fn resolve_client_uuid(&mut self) -> String {
        self.client_uuid
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }
}
