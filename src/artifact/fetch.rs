//! The `ensure_ready` flow: cache check, download, verify, install.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::release::{self, ReleaseAsset};
use super::{ArtifactSpec, FetchError, FetchPhase, ProgressFn, extract};

/// A matching binary already installed on `PATH`, if any.
///
/// Cheapest fast path of all; gated by configuration since a system-managed
/// binary is outside this cache's control.
pub fn system_binary(spec: &ArtifactSpec) -> Option<PathBuf> {
    which::which(&spec.binary).ok()
}

/// Guarantee a runnable binary for `spec` exists under `cache_root`.
///
/// Idempotent: when the cache already holds the binary and its ready
/// marker, this returns immediately without touching the network. Otherwise
/// the latest release is resolved, the platform asset downloaded in full,
/// verified against the pinned digest when one is present, and unpacked
/// into the cache. Every failure leaves the cache exactly as it was.
pub async fn ensure_ready(
    spec: &ArtifactSpec,
    cache_root: &Path,
    on_progress: &mut ProgressFn<'_>,
) -> Result<PathBuf, FetchError> {
    if spec.is_cached(cache_root) {
        debug!(artifact = %spec.name, "cache hit");
        on_progress(&FetchPhase::Ready);
        return Ok(spec.binary_path(cache_root));
    }

    on_progress(&FetchPhase::Metadata);
    let client = release::http_client()?;
    let release = release::latest_release(&client, &spec.repo).await?;
    let asset = release::select_asset(&release, &spec.asset_pattern)?.clone();
    if let Some(version) = release.version() {
        debug!(artifact = %spec.name, %version, asset = %asset.name, "selected asset");
    }

    let bytes = download(&client, &asset, on_progress).await?;
    install_payload(spec, cache_root, &asset.name, &bytes, on_progress)
}

/// Download the asset in full. No streaming decompression; extraction only
/// ever sees a complete, verified archive.
async fn download(
    client: &reqwest::Client,
    asset: &ReleaseAsset,
    on_progress: &mut ProgressFn<'_>,
) -> Result<Vec<u8>, FetchError> {
    let mut response = client.get(&asset.browser_download_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: asset.browser_download_url.clone(),
        });
    }

    let total = response
        .content_length()
        .or((asset.size > 0).then_some(asset.size));
    let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
    on_progress(&FetchPhase::Downloading { received: 0, total });
    while let Some(chunk) = response.chunk().await? {
        bytes.extend_from_slice(&chunk);
        on_progress(&FetchPhase::Downloading {
            received: bytes.len() as u64,
            total,
        });
    }
    Ok(bytes)
}

/// Compare the SHA-256 of `bytes` against an expected hex digest,
/// case-insensitively.
pub fn verify_digest(bytes: &[u8], expected: &str) -> Result<(), FetchError> {
    let actual = hex::encode(Sha256::digest(bytes));
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FetchError::ChecksumMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

/// Verify and install a fully downloaded archive payload.
///
/// Verification runs before extraction; a digest mismatch discards the
/// staged bytes and leaves nothing at the final cache path. The archive is
/// staged and unpacked inside a scratch directory that is removed whole,
/// success or not.
pub fn install_payload(
    spec: &ArtifactSpec,
    cache_root: &Path,
    asset_name: &str,
    bytes: &[u8],
    on_progress: &mut ProgressFn<'_>,
) -> Result<PathBuf, FetchError> {
    let cache_dir = spec.cache_dir(cache_root);
    fs::create_dir_all(&cache_dir)?;

    let scratch = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(cache_root)?;
    let archive_path = scratch.path().join(asset_name);
    fs::write(&archive_path, bytes)?;

    if let Some(expected) = &spec.sha256 {
        on_progress(&FetchPhase::Verifying);
        if let Err(err) = verify_digest(bytes, expected) {
            let _ = fs::remove_file(&archive_path);
            return Err(err);
        }
    }

    on_progress(&FetchPhase::Extracting);
    let unpack_dir = scratch.path().join("unpacked");
    extract::unpack(&archive_path, &unpack_dir)?;
    let Some(found) = extract::find_binary(&unpack_dir, &spec.binary) else {
        return Err(FetchError::BinaryNotFound {
            binary: spec.binary.clone(),
        });
    };

    let final_path = spec.binary_path(cache_root);
    fs::copy(&found, &final_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&final_path, fs::Permissions::from_mode(0o755))?;
    }

    // The archive and scratch tree are gone before the marker lands.
    fs::remove_file(&archive_path)?;
    drop(scratch);
    fs::write(spec.marker_path(cache_root), b"")?;

    info!(artifact = %spec.name, path = %final_path.display(), "artifact installed");
    on_progress(&FetchPhase::Ready);
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_comparison_is_case_insensitive() {
        let bytes = b"archive bytes";
        let digest = hex::encode(Sha256::digest(bytes));
        assert!(verify_digest(bytes, &digest).is_ok());
        assert!(verify_digest(bytes, &digest.to_ascii_uppercase()).is_ok());
        assert!(verify_digest(bytes, &format!("  {digest}  ")).is_ok());

        let err = verify_digest(bytes, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, FetchError::ChecksumMismatch { .. }));
    }
}
