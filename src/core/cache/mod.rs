pub mod store;

pub use store::{ArtifactStore, HttpArtifactStore};
