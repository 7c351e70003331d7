use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::context::SyncContext;
use crate::core::error::{PacksmithError, PacksmithResult};
use crate::core::manifest::ModRecord;
use crate::core::pool::TaskOutcome;

#[derive(Debug, Default, Serialize)]
pub struct InstallReport {
    pub client_mods: usize,
    pub server_mods: usize,
    /// Mods whose artifact had to be fetched again.
    pub downloaded: Vec<String>,
}

struct InstallJob {
    mod_id: String,
    record: ModRecord,
    client_dir: PathBuf,
    server_dir: PathBuf,
}

struct Installed {
    mod_id: String,
    filename: String,
    downloaded: bool,
    client: bool,
    server: bool,
}

/// Rebuild `client/` and `server/` from the cache.
///
/// All or nothing: the first failure stops queued mods from starting and is
/// returned once in-flight copies have finished. The manifest is only saved
/// when a re-download changed an artifact name.
pub async fn install_mods(ctx: &SyncContext) -> PacksmithResult<InstallReport> {
    let _operation = ctx.project.begin_operation().await;

    let client_dir = ctx.project.client_dir();
    let server_dir = ctx.project.server_dir();
    recreate_dir(&client_dir).await?;
    recreate_dir(&server_dir).await?;

    let jobs: Vec<InstallJob> = ctx
        .project
        .snapshot()
        .await
        .mods
        .into_iter()
        .map(|(mod_id, record)| InstallJob {
            mod_id,
            record,
            client_dir: client_dir.clone(),
            server_dir: server_dir.clone(),
        })
        .collect();
    info!("Installing {} mods", jobs.len());

    let task_ctx = ctx.clone();
    let mut results = ctx.pool.run(jobs, move |job| {
        let ctx = task_ctx.clone();
        async move {
            let mod_id = job.mod_id.clone();
            install_one(&ctx, job).await.map_err(|e| e.for_mod(mod_id))
        }
    });

    let mut installed = Vec::new();
    let mut first_error = None;
    while let Some(outcome) = results.recv().await {
        let failure = match outcome {
            TaskOutcome::Completed(Ok(done)) => {
                installed.push(done);
                continue;
            }
            TaskOutcome::Completed(Err(e)) => e,
            TaskOutcome::Cancelled => PacksmithError::Cancelled,
            TaskOutcome::Panicked(message) => PacksmithError::TaskPanicked(message),
        };
        if first_error.is_none() {
            error!("Install failed: {}", failure);
            results.halt();
            first_error = Some(failure);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    let mut report = InstallReport::default();
    let mut renamed = false;
    {
        let mut manifest = ctx.project.manifest().lock().await;
        for done in installed {
            report.client_mods += usize::from(done.client);
            report.server_mods += usize::from(done.server);
            if !done.downloaded {
                continue;
            }
            if let Some(record) = manifest.mods.get_mut(&done.mod_id) {
                if record.filename != done.filename {
                    record.filename = done.filename;
                    renamed = true;
                }
            }
            report.downloaded.push(done.mod_id);
        }
    }
    if renamed {
        ctx.project.save().await?;
    }

    report.downloaded.sort();
    info!(
        "Installed {} client and {} server mods",
        report.client_mods, report.server_mods
    );
    Ok(report)
}

async fn install_one(ctx: &SyncContext, job: InstallJob) -> PacksmithResult<Installed> {
    let record = job.record;
    let mut filename = record.filename.clone();
    let mut downloaded = false;

    if filename.is_empty() || !ctx.store.contains(&filename).await {
        debug!("{} missing from cache, fetching {}", job.mod_id, record.url);
        filename = ctx.store.ensure_cached(&record.url, &record.version).await?;
        downloaded = true;
    }

    let client = record.side.on_client();
    let server = record.side.on_server();
    if client {
        ctx.store
            .copy_into(&filename, &job.client_dir.join(&filename))
            .await?;
    }
    if server {
        ctx.store
            .copy_into(&filename, &job.server_dir.join(&filename))
            .await?;
    }

    Ok(Installed {
        mod_id: job.mod_id,
        filename,
        downloaded,
        client,
        server,
    })
}

async fn recreate_dir(dir: &Path) -> PacksmithResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(PacksmithError::io(dir, source)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| PacksmithError::io(dir, source))
}
