use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{unfinished, ModFailure};
use crate::core::context::SyncContext;
use crate::core::error::PacksmithResult;
use crate::core::manifest::{Platform, ProjectTarget};
use crate::core::platform::PlatformClient;

/// A newer version available for a tracked mod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub mod_id: String,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UpdateCheck {
    /// Sorted by mod id.
    pub candidates: Vec<UpdateCandidate>,
    /// Requested ids that are absent, locked or have no source.
    pub skipped: Vec<String>,
    /// Mods whose platform query failed. These are not candidates.
    pub unresolved: Vec<ModFailure>,
}

struct CheckJob {
    mod_id: String,
    platform: Platform,
    current_version: String,
}

/// Ask each mod's platform for its latest compatible version.
///
/// Per-mod failures never fail the check; they are logged and listed in
/// `unresolved`. Locked, sourceless and unknown ids are never queried.
pub async fn check_updates(ctx: &SyncContext, mod_ids: &[String]) -> PacksmithResult<UpdateCheck> {
    let _operation = ctx.project.begin_operation().await;
    let requested: BTreeSet<&String> = mod_ids.iter().collect();

    let mut report = UpdateCheck::default();
    let (jobs, target) = {
        let manifest = ctx.project.manifest().lock().await;
        let mut jobs = Vec::with_capacity(requested.len());
        for mod_id in requested {
            match manifest.mods.get(mod_id) {
                Some(record) if !record.source.is_empty() && !record.locked => {
                    jobs.push(CheckJob {
                        mod_id: mod_id.clone(),
                        platform: record.platform,
                        current_version: record.version.clone(),
                    })
                }
                _ => {
                    debug!("Skipping update check for {}", mod_id);
                    report.skipped.push(mod_id.clone());
                }
            }
        }
        (jobs, manifest.target())
    };

    info!("Checking {} mods for updates", jobs.len());
    let mut pending: BTreeSet<String> = jobs.iter().map(|j| j.mod_id.clone()).collect();

    let platforms = ctx.platforms.clone();
    let mut results = ctx.pool.run(jobs, move |job| {
        let client = platforms.client(job.platform);
        let target = target.clone();
        async move {
            let latest = latest_for(client.as_ref(), &job, &target).await;
            (job.mod_id, latest)
        }
    });

    while let Some(outcome) = results.recv().await {
        let Some((mod_id, latest)) = outcome.completed() else {
            continue;
        };
        pending.remove(&mod_id);
        match latest {
            Ok(Some((version, url))) => {
                debug!("{} can update to {}", mod_id, version);
                report.candidates.push(UpdateCandidate {
                    mod_id,
                    version,
                    url,
                })
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Update check failed for {}: {}", mod_id, e);
                report.unresolved.push(ModFailure::new(mod_id, e));
            }
        }
    }

    let cancelled = ctx.pool.cancellation().is_cancelled();
    report.unresolved.extend(unfinished(pending, cancelled));
    report.candidates.sort_by(|a, b| a.mod_id.cmp(&b.mod_id));
    report.unresolved.sort_by(|a, b| a.mod_id.cmp(&b.mod_id));

    info!(
        "Update check done: {} candidates, {} unresolved",
        report.candidates.len(),
        report.unresolved.len()
    );
    Ok(report)
}

/// Newer version and its download URL, if the platform has one.
async fn latest_for(
    client: &dyn PlatformClient,
    job: &CheckJob,
    target: &ProjectTarget,
) -> PacksmithResult<Option<(String, String)>> {
    let version = client.latest_version(&job.mod_id, target).await?;
    if version.is_empty() || version == job.current_version {
        return Ok(None);
    }
    let url = client
        .resolve_download_url(&job.mod_id, &version, target)
        .await?;
    Ok(Some((version, url)))
}
