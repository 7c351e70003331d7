//! Derives the client and server mod folders from the manifest and cache.

pub mod materializer;

pub use materializer::{install_mods, InstallReport};
