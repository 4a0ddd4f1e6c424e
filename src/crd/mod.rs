//! Custom Resource Definitions for the chaos operator
//!
//! This module contains the CRDs the controller reads and writes:
//! ChaosEngine (owned), ChaosExperiment (read-only) and ChaosResult
//! (history owned, annotations drained).

mod engine;
mod experiment;
mod result;
mod types;

pub use engine::{ChaosEngine, ChaosEngineSpec, ChaosEngineStatus, ENGINE_FINALIZER, RUNNER_SUFFIX};
pub use experiment::{
    ChaosExperiment, ChaosExperimentSpec, ExperimentDef, ExperimentSecurityContext,
};
pub use result::{
    ChaosResult, ChaosResultSpec, ChaosResultStatus, HistoryDetails, TestStatus, RESULT_CRD_NAME,
};
pub use types::{
    ApplicationParams, CleanUpPolicy, ComponentParams, EngineState, EngineStatus,
    ExperimentList, ExperimentStatus, ExperimentStatuses, MountedObject, PodSelector, RunnerInfo,
    Selector, TargetDetails, Workload,
};
