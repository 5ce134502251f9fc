//! Artifact acquisition: release binaries fetched, verified, and cached.
//!
//! An [`ArtifactSpec`] names exactly one runnable binary for a platform.
//! [`fetch::ensure_ready`] guarantees that binary exists under the cache
//! root, downloading and unpacking a release archive when it does not. The
//! cache layout is deterministic:
//!
//! ```text
//! <cache_root>/
//!   bin/<name>/<binary>        the runnable artifact
//!   bin/<name>/.ready          zero-byte marker: fully extracted
//!   sessions/<key>/data/       per-session node working directory
//! ```

pub mod extract;
pub mod fetch;
pub mod release;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::supervisor::session::SessionKey;

/// Zero-byte file whose presence means the artifact was fully extracted.
pub const READY_MARKER: &str = ".ready";

/// GitHub repository the bundled miner is released from.
pub const MINER_REPO: &str = "xmrig/xmrig";

/// Errors surfaced by artifact acquisition. All of them are recoverable:
/// the caller may simply retry `ensure_ready`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("release metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("no release asset matches `{pattern}`")]
    NoMatchingAsset { pattern: String },

    #[error("invalid asset pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported archive format: {name}")]
    UnsupportedArchive { name: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("binary `{binary}` not found in extracted archive")]
    BinaryNotFound { binary: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything needed to resolve, verify, and cache one runnable binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Cache directory name, e.g. `xmrig` or `node-quai`.
    pub name: String,
    /// GitHub `owner/repo` the releases are published under.
    pub repo: String,
    /// File name of the binary inside the archive (and in the cache).
    pub binary: String,
    /// Regex matched against release asset names for this platform.
    pub asset_pattern: String,
    /// Expected SHA-256 of the downloaded archive, hex, case-insensitive.
    /// Verification is skipped when absent.
    pub sha256: Option<String>,
}

impl ArtifactSpec {
    /// Spec for the bundled miner on the given platform.
    ///
    /// Fails with `UnsupportedPlatform` when no release asset exists for
    /// the pair; the fetcher never guesses a binary.
    pub fn miner(os: &str, arch: &str) -> Result<Self, FetchError> {
        let (pattern, binary) = match (os, arch) {
            ("linux", "x86_64") => (r"linux-(static-)?x64\.tar\.gz$", "xmrig"),
            ("macos", "aarch64") => (r"macos-arm64\.tar\.gz$", "xmrig"),
            ("macos", "x86_64") => (r"macos-x64\.tar\.gz$", "xmrig"),
            ("windows", "x86_64") => (r"(msvc|gcc)-win64\.zip$", "xmrig.exe"),
            _ => {
                return Err(FetchError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                });
            }
        };
        Ok(Self {
            name: "xmrig".to_string(),
            repo: MINER_REPO.to_string(),
            binary: binary.to_string(),
            asset_pattern: pattern.to_string(),
            sha256: None,
        })
    }

    /// Spec for a node binary released from `repo` for the given platform.
    ///
    /// Node projects name their assets `<binary>-...-<os>-<arch>.<ext>` by
    /// convention; the generated pattern matches that shape.
    pub fn node(network: &str, repo: &str, binary: &str, os: &str, arch: &str) -> Result<Self, FetchError> {
        let os_token = match os {
            "linux" => "linux",
            "macos" => "(macos|darwin)",
            "windows" => "(windows|win64)",
            _ => {
                return Err(FetchError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                });
            }
        };
        let arch_token = match arch {
            "x86_64" => "(x86_64|amd64|x64)",
            "aarch64" => "(aarch64|arm64)",
            _ => {
                return Err(FetchError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                });
            }
        };
        let binary = if os == "windows" && !binary.ends_with(".exe") {
            format!("{binary}.exe")
        } else {
            binary.to_string()
        };
        Ok(Self {
            name: format!("node-{network}"),
            repo: repo.to_string(),
            binary,
            asset_pattern: format!(r"{os_token}.*{arch_token}\.(zip|tar\.gz|tgz)$"),
            sha256: None,
        })
    }

    /// Pin an expected archive digest.
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// Directory this artifact is cached under.
    pub fn cache_dir(&self, cache_root: &Path) -> PathBuf {
        cache_root.join("bin").join(&self.name)
    }

    /// Final path of the runnable binary.
    pub fn binary_path(&self, cache_root: &Path) -> PathBuf {
        self.cache_dir(cache_root).join(&self.binary)
    }

    /// Path of the extraction-complete marker.
    pub fn marker_path(&self, cache_root: &Path) -> PathBuf {
        self.cache_dir(cache_root).join(READY_MARKER)
    }

    /// Whether the cache already holds a fully extracted binary.
    pub fn is_cached(&self, cache_root: &Path) -> bool {
        self.binary_path(cache_root).is_file() && self.marker_path(cache_root).is_file()
    }
}

/// Coarse acquisition phase, reported through the progress callback so a
/// long fetch can drive a UI without blocking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPhase {
    /// Resolving release metadata.
    Metadata,
    /// Archive download in flight.
    Downloading {
        received: u64,
        /// Total size when the server reports one.
        total: Option<u64>,
    },
    /// Checking the archive digest.
    Verifying,
    /// Unpacking and installing the binary.
    Extracting,
    /// Binary present at its final cache path.
    Ready,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::Metadata => write!(f, "fetching metadata"),
            FetchPhase::Downloading { received, total } => match total {
                Some(total) => write!(f, "downloading ({received}/{total} bytes)"),
                None => write!(f, "downloading ({received} bytes)"),
            },
            FetchPhase::Verifying => write!(f, "verifying"),
            FetchPhase::Extracting => write!(f, "extracting"),
            FetchPhase::Ready => write!(f, "ready"),
        }
    }
}

/// Progress callback invoked at each phase transition and periodically
/// while downloading.
pub type ProgressFn<'a> = dyn FnMut(&FetchPhase) + Send + 'a;

/// Per-session working directory for node workloads, created on demand.
///
/// The returned path is the `data` subdirectory handed to the node binary
/// as its working-directory placeholder.
pub fn session_workdir(cache_root: &Path, key: &SessionKey) -> io::Result<PathBuf> {
    let dir = cache_root.join("sessions").join(key.dir_name()).join("data");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
