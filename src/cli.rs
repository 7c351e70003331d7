use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use crate::commands::{self, AddModPayload, InitProjectPayload, SearchModsPayload};
use crate::core::error::PacksmithError;
use crate::core::manifest::{LoaderType, Platform, Project, Side};
use crate::core::state::AppState;

/// Manage a Minecraft modpack: track mods, update them, build client and server folders
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Project directory containing packsmith.json
    #[arg(short, long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty packsmith.json in the project directory
    Init {
        #[arg(short, long)]
        name: String,

        /// Minecraft version, e.g. 1.20.1
        #[arg(short, long)]
        minecraft: String,

        /// forge, fabric, neoforge or quilt
        #[arg(short, long)]
        loader: LoaderType,
    },
    /// List tracked mods
    List,
    /// Search a platform for mods compatible with the project
    Search {
        query: String,

        #[arg(long, default_value = "modrinth")]
        platform: Platform,
    },
    /// Download a mod and start tracking it
    Add {
        mod_id: String,

        #[arg(long, default_value = "modrinth")]
        platform: Platform,

        /// client, server or both
        #[arg(short, long, default_value = "both")]
        side: Side,

        /// Version to pin; latest compatible when omitted
        #[arg(short = 'v', long)]
        mod_version: Option<String>,

        /// Project page to record as the mod's source
        #[arg(long)]
        source: Option<String>,
    },
    /// Stop tracking a mod and drop its cached artifact
    Remove { mod_id: String },
    /// Change where a mod is installed
    Side { mod_id: String, side: Side },
    /// Exclude a mod from update checks
    Lock { mod_id: String },
    /// Include a mod in update checks again
    Unlock { mod_id: String },
    /// List compatible versions of a tracked mod
    Versions { mod_id: String },
    /// Pin a tracked mod to a specific version
    SetVersion { mod_id: String, version: String },
    /// Report mods with newer compatible versions
    Check {
        /// Only these mods; every tracked mod when empty
        mod_ids: Vec<String>,
    },
    /// Check for updates and apply them
    Update {
        mod_ids: Vec<String>,

        /// Apply without stopping at the report
        #[arg(short, long)]
        yes: bool,
    },
    /// Rebuild the client and server folders from the cache
    Install,
    /// Print the newest log file
    Logs,
}

/// Run one command against the project. Ctrl-C cancels batch work in flight.
pub async fn execute(args: Args, state: AppState) -> Result<(), PacksmithError> {
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending work");
            cancel.cancel();
        }
    });

    let json = args.json;
    let root = args.project;

    let command = match args.command {
        Command::Init {
            name,
            minecraft,
            loader,
        } => {
            let info = commands::initialize_project(InitProjectPayload {
                root,
                name,
                minecraft_version: minecraft,
                loader,
            })
            .await?;
            return emit(json, &info, || {
                format!(
                    "Initialized '{}' for Minecraft {} ({}) in {}",
                    info.name, info.minecraft_version, info.loader, info.path
                )
            });
        }
        Command::Logs => {
            let log = commands::get_logs(&state.logs_dir()).await?;
            return emit(json, &log, || log.contents.clone());
        }
        other => other,
    };

    let project = Project::open(&root).await?;
    match command {
        // Handled above, before a manifest exists.
        Command::Init { .. } | Command::Logs => Ok(()),
        Command::List => {
            let info = commands::open_project(&root).await?;
            emit(json, &info, || {
                let mut out = format!(
                    "{} (Minecraft {}, {})",
                    info.name, info.minecraft_version, info.loader
                );
                for m in &info.mods {
                    let lock = if m.locked { " [locked]" } else { "" };
                    out.push_str(&format!(
                        "\n  {} {} ({}, {}){}",
                        m.id, m.version, m.platform, m.side, lock
                    ));
                }
                out
            })
        }
        Command::Search { query, platform } => {
            let hits = commands::search_mods(
                &state,
                &project,
                SearchModsPayload { query, platform },
            )
            .await?;
            emit(json, &hits, || {
                hits.iter()
                    .map(|h| {
                        let latest = h.versions.first().map(String::as_str).unwrap_or("-");
                        format!(
                            "{} ({} downloads, latest {})\n  {}",
                            h.id, h.downloads, latest, h.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Add {
            mod_id,
            platform,
            side,
            mod_version,
            source,
        } => {
            let info = commands::add_mod(
                &state,
                &project,
                AddModPayload {
                    mod_id,
                    platform,
                    source_url: source,
                    side,
                    version: mod_version,
                },
            )
            .await?;
            emit(json, &info, || format!("Added {} {}", info.id, info.version))
        }
        Command::Remove { mod_id } => {
            commands::remove_mod(&state, &project, &mod_id).await?;
            emit(json, &mod_id, || format!("Removed {mod_id}"))
        }
        Command::Side { mod_id, side } => {
            commands::change_mod_side(&project, &mod_id, side).await?;
            emit(json, &mod_id, || format!("{mod_id} now installs on {side}"))
        }
        Command::Lock { mod_id } => {
            commands::change_mod_locked(&project, &mod_id, true).await?;
            emit(json, &mod_id, || format!("Locked {mod_id}"))
        }
        Command::Unlock { mod_id } => {
            commands::change_mod_locked(&project, &mod_id, false).await?;
            emit(json, &mod_id, || format!("Unlocked {mod_id}"))
        }
        Command::Versions { mod_id } => {
            let versions = commands::get_mod_versions(&state, &project, &mod_id).await?;
            emit(json, &versions, || versions.join("\n"))
        }
        Command::SetVersion { mod_id, version } => {
            let info = commands::change_mod_version(&state, &project, &mod_id, &version).await?;
            emit(json, &info, || format!("{} pinned to {}", info.id, info.version))
        }
        Command::Check { mod_ids } => {
            let check = commands::check_mods_updates(&state, &project, ids_or_all(mod_ids)).await?;
            emit(json, &check, || describe_check(&check))
        }
        Command::Update { mod_ids, yes } => {
            let check = commands::check_mods_updates(&state, &project, ids_or_all(mod_ids)).await?;
            if !yes || check.candidates.is_empty() {
                return emit(json, &check, || {
                    let mut out = describe_check(&check);
                    if !check.candidates.is_empty() {
                        out.push_str("\nRe-run with --yes to apply.");
                    }
                    out
                });
            }
            let report = commands::update_mods(&state, &project, check.candidates).await?;
            emit(json, &report, || {
                let mut out = format!("Updated {} mods", report.updated.len());
                for failure in &report.failures {
                    out.push_str(&format!("\n  failed: {}", failure.error));
                }
                out
            })
        }
        Command::Install => {
            let report = commands::install_mods(&state, &project).await?;
            emit(json, &report, || {
                format!(
                    "Installed {} client mods and {} server mods ({} downloaded)",
                    report.client_mods,
                    report.server_mods,
                    report.downloaded.len()
                )
            })
        }
    }
}

fn ids_or_all(mod_ids: Vec<String>) -> Option<Vec<String>> {
    (!mod_ids.is_empty()).then_some(mod_ids)
}

fn describe_check(check: &crate::core::updater::UpdateCheck) -> String {
    if check.candidates.is_empty() && check.unresolved.is_empty() {
        return "Everything is up to date".into();
    }
    let mut lines: Vec<String> = check
        .candidates
        .iter()
        .map(|c| format!("{} -> {}", c.mod_id, c.version))
        .collect();
    lines.extend(
        check
            .unresolved
            .iter()
            .map(|f| format!("{}: could not check ({})", f.mod_id, f.error)),
    );
    lines.join("\n")
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<(), PacksmithError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
