use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{unfinished, ModFailure, UpdateCandidate};
use crate::core::context::SyncContext;
use crate::core::error::{PacksmithError, PacksmithResult};

#[derive(Debug, Default, Serialize)]
pub struct UpdateReport {
    /// Sorted ids whose record now points at the new version.
    pub updated: Vec<String>,
    pub failures: Vec<ModFailure>,
}

/// Download each candidate, swap it into the cache and the manifest.
///
/// Candidates are independent: one failure leaves the others applied. The
/// manifest is saved once after every task has finished; only a failed
/// save fails the whole call.
pub async fn apply_updates(
    ctx: &SyncContext,
    candidates: Vec<UpdateCandidate>,
) -> PacksmithResult<UpdateReport> {
    let _operation = ctx.project.begin_operation().await;
    let mut report = UpdateReport::default();

    let mut seen = BTreeSet::new();
    let mut jobs = Vec::with_capacity(candidates.len());
    {
        let manifest = ctx.project.manifest().lock().await;
        for candidate in candidates {
            if !seen.insert(candidate.mod_id.clone()) {
                debug!("Ignoring duplicate update for {}", candidate.mod_id);
                continue;
            }
            if manifest.mods.contains_key(&candidate.mod_id) {
                jobs.push(candidate);
            } else {
                let err = PacksmithError::ModNotFound(candidate.mod_id.clone());
                report.failures.push(ModFailure::new(&candidate.mod_id, err));
            }
        }
    }

    info!("Applying {} updates", jobs.len());
    let mut pending: BTreeSet<String> = jobs.iter().map(|c| c.mod_id.clone()).collect();

    let task_ctx = ctx.clone();
    let mut results = ctx.pool.run(jobs, move |candidate| {
        let ctx = task_ctx.clone();
        async move {
            let mod_id = candidate.mod_id.clone();
            let applied = apply_one(&ctx, candidate)
                .await
                .map_err(|e| e.for_mod(&mod_id));
            (mod_id, applied)
        }
    });

    while let Some(outcome) = results.recv().await {
        let Some((mod_id, applied)) = outcome.completed() else {
            continue;
        };
        pending.remove(&mod_id);
        match applied {
            Ok(()) => report.updated.push(mod_id),
            Err(e) => {
                warn!("Update failed: {}", e);
                report.failures.push(ModFailure::new(mod_id, e));
            }
        }
    }

    let cancelled = ctx.pool.cancellation().is_cancelled();
    report.failures.extend(unfinished(pending, cancelled));

    ctx.project.save().await?;

    report.updated.sort();
    report.failures.sort_by(|a, b| a.mod_id.cmp(&b.mod_id));
    info!(
        "Applied {} updates, {} failed",
        report.updated.len(),
        report.failures.len()
    );
    Ok(report)
}

async fn apply_one(ctx: &SyncContext, candidate: UpdateCandidate) -> PacksmithResult<()> {
    let filename = ctx
        .store
        .ensure_cached(&candidate.url, &candidate.version)
        .await?;

    let previous = {
        let manifest = ctx.project.manifest().lock().await;
        manifest
            .mods
            .get(&candidate.mod_id)
            .map(|record| record.filename.clone())
            .ok_or_else(|| PacksmithError::ModNotFound(candidate.mod_id.clone()))?
    };

    // Same artifact name means the new download already replaced it.
    if !previous.is_empty() && previous != filename {
        ctx.store.evict(&previous).await?;
    }

    let mut manifest = ctx.project.manifest().lock().await;
    let record = manifest
        .mods
        .get_mut(&candidate.mod_id)
        .ok_or_else(|| PacksmithError::ModNotFound(candidate.mod_id.clone()))?;
    debug!(
        "{}: {} -> {}",
        candidate.mod_id, record.version, candidate.version
    );
    record.version = candidate.version;
    record.url = candidate.url;
    record.filename = filename;
    Ok(())
}
