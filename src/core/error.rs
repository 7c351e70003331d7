use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the modpack backend.
/// Every module returns `Result<T, PacksmithError>`.
#[derive(Debug, Error)]
pub enum PacksmithError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Could not determine a file name for {url}")]
    UndeterminedFilename { url: String },

    // ── Platforms ───────────────────────────────────────
    #[error("{platform} error: {message}")]
    Platform { platform: String, message: String },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    // ── Project ─────────────────────────────────────────
    #[error("Mod not found: {0}")]
    ModNotFound(String),

    #[error("Invalid mod id {0:?}: must not be blank")]
    InvalidModId(String),

    #[error("No compatible version {version} for mod {mod_id}")]
    VersionNotFound { mod_id: String, version: String },

    #[error("Initialize project before using other commands ({0:?})")]
    ProjectNotInitialized(PathBuf),

    #[error("Unsupported loader: {0} (expected forge, fabric, neoforge or quilt)")]
    InvalidLoader(String),

    #[error("Invalid side: {0} (expected client, server or both)")]
    InvalidSide(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Batches ─────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{mod_id}: {source}")]
    Mod {
        mod_id: String,
        source: Box<PacksmithError>,
    },

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by callers that only care about the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Platform,
    Download,
    Filesystem,
    /// Reserved for cross-process manifest races; operations within one
    /// process are serialized instead.
    LockViolation,
    Cancelled,
    Other,
}

impl PacksmithError {
    /// Wrap this error with the id of the mod it belongs to.
    pub fn for_mod(self, mod_id: impl Into<String>) -> Self {
        PacksmithError::Mod {
            mod_id: mod_id.into(),
            source: Box::new(self),
        }
    }

    pub fn platform(platform: impl std::fmt::Display, message: impl Into<String>) -> Self {
        PacksmithError::Platform {
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PacksmithError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PacksmithError::Io { .. } => ErrorKind::Filesystem,
            PacksmithError::Http(_)
            | PacksmithError::DownloadFailed { .. }
            | PacksmithError::InvalidUrl { .. }
            | PacksmithError::UndeterminedFilename { .. } => ErrorKind::Download,
            PacksmithError::Platform { .. }
            | PacksmithError::UnknownPlatform(_)
            | PacksmithError::Json(_) => ErrorKind::Platform,
            PacksmithError::ModNotFound(_)
            | PacksmithError::VersionNotFound { .. }
            | PacksmithError::ProjectNotInitialized(_) => ErrorKind::NotFound,
            PacksmithError::Cancelled => ErrorKind::Cancelled,
            PacksmithError::Mod { source, .. } => source.kind(),
            PacksmithError::InvalidLoader(_)
            | PacksmithError::InvalidSide(_)
            | PacksmithError::InvalidModId(_)
            | PacksmithError::TaskPanicked(_)
            | PacksmithError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type PacksmithResult<T> = Result<T, PacksmithError>;

impl From<std::io::Error> for PacksmithError {
    fn from(source: std::io::Error) -> Self {
        PacksmithError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for JSON reports ──────────────────────
// Batch reports carry errors; they are rendered as their display string.
impl serde::Serialize for PacksmithError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
