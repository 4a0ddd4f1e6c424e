//! Finalizer handling for ChaosEngines
//!
//! The finalizer defers deletion of an engine until its pre-delete hooks
//! have run. The hooks are an explicit, ordered list; the abort path walks
//! it and only drops the finalizer once every hook reported done.

use crate::crd::{ChaosEngine, ENGINE_FINALIZER};

/// Work that must finish before an engine may be reclaimed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreDeleteHook {
    /// Force-delete every pod and job carrying the chaos identifier
    RemoveChaosResources,
    /// Wait until no pod carrying the chaos identifier remains
    AwaitChaosPodTermination,
    /// Drain per-target chaos status into the ChaosResult history
    SyncChaosResult,
}

impl std::fmt::Display for PreDeleteHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoveChaosResources => write!(f, "remove chaos resources"),
            Self::AwaitChaosPodTermination => write!(f, "await chaos pod termination"),
            Self::SyncChaosResult => write!(f, "sync chaos result"),
        }
    }
}

/// Hooks run before the finalizer is removed, in order
pub const PRE_DELETE_HOOKS: [PreDeleteHook; 3] = [
    PreDeleteHook::RemoveChaosResources,
    PreDeleteHook::AwaitChaosPodTermination,
    PreDeleteHook::SyncChaosResult,
];

/// Check if an engine carries the chaos finalizer
pub fn has_finalizer(engine: &ChaosEngine) -> bool {
    engine
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == ENGINE_FINALIZER))
}

/// Add the chaos finalizer to a snapshot; returns false if already present
pub fn add_finalizer(engine: &mut ChaosEngine) -> bool {
    if has_finalizer(engine) {
        return false;
    }
    engine
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(ENGINE_FINALIZER.to_string());
    true
}

/// Remove the chaos finalizer from a snapshot, keeping any others
pub fn remove_finalizer(engine: &mut ChaosEngine) -> bool {
    let Some(finalizers) = engine.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != ENGINE_FINALIZER);
    before != finalizers.len()
}
