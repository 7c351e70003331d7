use std::sync::Arc;

use tracing::info;

use super::client::{ModSearchHit, PlatformClient};
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::ProjectTarget;
use crate::core::pool::{TaskOutcome, WorkerPool};

/// Search one platform and attach each hit's compatible versions.
///
/// Versions are fetched through the worker pool; the first failing hit fails
/// the whole search. Hits keep the platform's relevance order.
pub async fn search_mods(
    client: Arc<dyn PlatformClient>,
    pool: &WorkerPool,
    query: &str,
    target: &ProjectTarget,
) -> PacksmithResult<Vec<ModSearchHit>> {
    let mut hits = client.search(query, target).await?;

    let jobs: Vec<(usize, String)> = hits
        .iter()
        .enumerate()
        .map(|(index, hit)| (index, hit.id.clone()))
        .collect();

    let task_target = target.clone();
    let mut results = pool.run(jobs, move |(index, mod_id)| {
        let client = Arc::clone(&client);
        let target = task_target.clone();
        async move {
            let versions = client
                .list_versions(&mod_id, &target)
                .await
                .map_err(|e| e.for_mod(&mod_id));
            (index, versions)
        }
    });

    let mut first_error = None;
    while let Some(outcome) = results.recv().await {
        let failure = match outcome {
            TaskOutcome::Completed((index, Ok(versions))) => {
                hits[index].versions = versions;
                continue;
            }
            TaskOutcome::Completed((_, Err(e))) => e,
            TaskOutcome::Cancelled => PacksmithError::Cancelled,
            TaskOutcome::Panicked(message) => PacksmithError::TaskPanicked(message),
        };
        if first_error.is_none() {
            results.halt();
            first_error = Some(failure);
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    info!("Found {} mods matching '{}'", hits.len(), query);
    Ok(hits)
}
