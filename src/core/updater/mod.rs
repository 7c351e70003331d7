//! Update check and apply, both fanned out over the worker pool.

pub mod applier;
pub mod checker;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::error::PacksmithError;

pub use applier::{apply_updates, UpdateReport};
pub use checker::{check_updates, UpdateCandidate, UpdateCheck};

/// A mod the batch could not process, with the reason.
#[derive(Debug, Serialize)]
pub struct ModFailure {
    pub mod_id: String,
    pub error: PacksmithError,
}

impl ModFailure {
    pub fn new(mod_id: impl Into<String>, error: PacksmithError) -> Self {
        Self {
            mod_id: mod_id.into(),
            error,
        }
    }
}

/// Failures for tasks that never reported a result of their own.
pub(crate) fn unfinished(pending: BTreeSet<String>, cancelled: bool) -> Vec<ModFailure> {
    pending
        .into_iter()
        .map(|mod_id| {
            let error = if cancelled {
                PacksmithError::Cancelled
            } else {
                PacksmithError::TaskPanicked(format!("task for {mod_id} aborted"))
            };
            ModFailure::new(mod_id, error)
        })
        .collect()
}
