//! Chaos operator - Kubernetes controller for ChaosEngine resources
//!
//! A ChaosEngine declares a chaos run against some target workloads. The
//! operator initializes the engine, launches a runner pod that executes the
//! listed experiments, records completion, and cleans up on abort or
//! deletion. Stopped or completed engines can be switched back to active
//! to run again.
//!
//! # Modules
//!
//! - [`crd`] - ChaosEngine, ChaosExperiment and ChaosResult definitions
//! - [`controller`] - Reconciliation state machine and its cluster seam
//! - [`runner`] - Runner pod construction
//! - [`targets`] - Target strings, validation and label selectors
//! - [`events`] - Lifecycle notifications published as Kubernetes Events
//! - [`discovery`] - ChaosResult CRD availability probe
//! - [`retry`] - Bounded, cancellable polling
//! - [`config`] - Operator settings from flags and environment
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod discovery;
pub mod error;
pub mod events;
pub mod retry;
pub mod runner;
pub mod targets;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
