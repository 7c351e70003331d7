// ─── Packsmith Core ───
// Engine behind the modpack CLI.
//
// Architecture:
//   core/
//     manifest/  : packsmith.json model + project layout
//     platform/  : Modrinth and CurseForge clients, search fan-out
//     cache/     : project-local artifact store
//     pool/      : bounded worker pool with cancellation
//     updater/   : update check + apply
//     install/   : client/server folder materializer
//     state/     : settings + shared application state

pub mod cache;
pub mod context;
pub mod error;
pub mod http;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod pool;
pub mod state;
pub mod updater;

#[cfg(test)]
pub(crate) mod test_support;
