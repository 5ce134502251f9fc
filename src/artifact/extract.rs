//! Archive extraction for release bundles.
//!
//! Releases ship either zip archives or gzip tarballs; the format is chosen
//! by file extension. Entries are unpacked under a scratch directory only,
//! with paths that would escape it skipped outright.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::FetchError;

/// Unpack `archive` into `dest`, dispatching on the file extension.
pub fn unpack(archive: &Path, dest: &Path) -> Result<(), FetchError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    fs::create_dir_all(dest)?;
    if name.ends_with(".zip") {
        unpack_zip(archive, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_tar_gz(archive, dest)
    } else {
        Err(FetchError::UnsupportedArchive { name })
    }
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::Archive(e.to_string()))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| FetchError::Archive(e.to_string()))?;
        // enclosed_name rejects absolute paths and `..` components.
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }
    }
    debug!(archive = %archive.display(), entries = zip.len(), "unpacked zip");
    Ok(())
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    // tar::Archive::unpack refuses entries that escape `dest`.
    tar.unpack(dest)?;
    debug!(archive = %archive.display(), "unpacked tarball");
    Ok(())
}

/// Locate `binary` under `root`: either a direct child or one level down in
/// a version-named subdirectory, as release archives lay them out.
pub fn find_binary(root: &Path, binary: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .flatten()
        .find(|entry| entry.file_type().is_file() && entry.file_name().to_str() == Some(binary))
        .map(|entry| entry.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn unpacks_tarball_with_version_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bundle.tar.gz");
        write_tar_gz(&archive, &[("xmrig-6.21.0/xmrig", b"elf-bytes")]);

        let out = tmp.path().join("out");
        unpack(&archive, &out).unwrap();

        let found = find_binary(&out, "xmrig").unwrap();
        assert!(found.ends_with("xmrig-6.21.0/xmrig"));
        assert_eq!(fs::read(found).unwrap(), b"elf-bytes");
    }

    #[test]
    fn unpacks_flat_zip() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bundle.zip");
        write_zip(&archive, &[("xmrig.exe", b"pe-bytes"), ("config.json", b"{}")]);

        let out = tmp.path().join("out");
        unpack(&archive, &out).unwrap();

        let found = find_binary(&out, "xmrig.exe").unwrap();
        assert_eq!(fs::read(found).unwrap(), b"pe-bytes");
    }

    #[test]
    fn rejects_unknown_extension() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bundle.rar");
        fs::write(&archive, b"not-an-archive").unwrap();
        let err = unpack(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedArchive { .. }));
    }

    #[test]
    fn find_binary_ignores_deeper_nesting() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("xmrig"), b"too deep").unwrap();
        assert!(find_binary(tmp.path(), "xmrig").is_none());
    }
}
