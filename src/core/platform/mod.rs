pub mod client;
pub mod curseforge;
pub mod modrinth;
pub mod search;

pub use client::{ModSearchHit, PlatformClient, Platforms};
pub use curseforge::CurseForgeClient;
pub use modrinth::ModrinthClient;
pub use search::search_mods;
