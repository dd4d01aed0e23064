//! Staging and archiving of the deployable files.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use nexus_deploy_core::{ConfigError, LocalLayout};
use serde::Serialize;
use tar::HeaderMode;
use thiserror::Error;
use walkdir::WalkDir;

/// Packaging error.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Failed to copy executable {}: {source}", path.display())]
    CopyExecutable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to copy assets {}: {source}", path.display())]
    CopyAssets {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write bundle {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Layout(#[from] ConfigError),
}

/// A freshly written deployment bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundle {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Builds the bundle from the local layout.
#[derive(Debug, Clone)]
pub struct Packager {
    layout: LocalLayout,
}

impl Packager {
    #[must_use]
    pub const fn new(layout: LocalLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub const fn layout(&self) -> &LocalLayout {
        &self.layout
    }

    /// Recreate the staging directory, copy the executable and asset tree
    /// into it, and archive its contents.
    ///
    /// Nothing is archived when either copy fails.
    ///
    /// # Errors
    /// Returns error if a copy or the archive step fails.
    pub fn package(&self) -> Result<Bundle, PackageError> {
        let LocalLayout {
            executable,
            assets,
            staging_dir,
            bundle,
        } = &self.layout;
        let exe_name = self.layout.executable_name()?;
        let assets_name = self.layout.assets_name()?;

        remove_best_effort(staging_dir, true);
        remove_best_effort(bundle, false);
        if let Err(e) = fs::create_dir_all(staging_dir) {
            tracing::warn!(path = %staging_dir.display(), error = %e, "Failed to create staging dir");
        }

        fs::copy(executable, staging_dir.join(&exe_name)).map_err(|source| {
            PackageError::CopyExecutable {
                path: executable.clone(),
                source,
            }
        })?;
        copy_tree(assets, &staging_dir.join(&assets_name)).map_err(|source| {
            PackageError::CopyAssets {
                path: assets.clone(),
                source,
            }
        })?;

        write_archive(staging_dir, bundle).map_err(|source| PackageError::Archive {
            path: bundle.clone(),
            source,
        })?;

        let size_bytes = fs::metadata(bundle)
            .map_err(|source| PackageError::Archive {
                path: bundle.clone(),
                source,
            })?
            .len();
        tracing::info!(path = %bundle.display(), size_bytes, "Payload created");

        Ok(Bundle {
            path: bundle.clone(),
            size_bytes,
        })
    }
}

fn remove_best_effort(path: &Path, dir: bool) {
    let result = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed previous output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove previous output"),
    }
}

/// Copy the tree at `src` to `dst`. Symlinks inside the tree are recreated,
/// not followed, matching `cp -r`.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    // Links cannot be recreated portably here, copy what they point at.
    if fs::metadata(src)?.is_dir() {
        copy_tree(src, dst)
    } else {
        fs::copy(src, dst).map(drop)
    }
}

/// Archive the contents of `staging` at the root of a gzip tar.
fn write_archive(staging: &Path, bundle: &Path) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(bundle)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let mut entries = fs::read_dir(staging)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    for entry in entries {
        let name = entry.file_name();
        if entry.file_type()?.is_dir() {
            builder.append_dir_all(&name, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flate2::read::GzDecoder;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: LocalLayout,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("nexus/bin")).unwrap();
        fs::create_dir_all(root.join("nexus/public/css")).unwrap();
        fs::write(root.join("nexus/bin/nexus-linux"), b"\x7fELF fake binary").unwrap();
        fs::write(root.join("nexus/public/index.html"), b"<html></html>").unwrap();
        fs::write(root.join("nexus/public/css/site.css"), b"body {}").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                root.join("nexus/bin/nexus-linux"),
                fs::Permissions::from_mode(0o755),
            )
            .unwrap();
        }

        let layout = LocalLayout {
            executable: root.join("nexus/bin/nexus-linux"),
            assets: root.join("nexus/public"),
            staging_dir: root.join("deploy_stage"),
            bundle: root.join("payload.tar.gz"),
        };
        Fixture { _dir: dir, layout }
    }

    /// Path (without trailing slash) -> file contents, `None` for directories.
    fn read_bundle(path: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let mut entries = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string();
            let contents = if entry.header().entry_type().is_dir() {
                None
            } else {
                let mut buf = Vec::new();
                io::Read::read_to_end(&mut entry, &mut buf).unwrap();
                Some(buf)
            };
            entries.insert(name, contents);
        }
        entries
    }

    #[test]
    fn test_bundle_holds_executable_and_assets_at_root() {
        let fx = fixture();
        let bundle = Packager::new(fx.layout.clone()).package().unwrap();

        assert_eq!(bundle.path, fx.layout.bundle);
        assert_eq!(bundle.size_bytes, fs::metadata(&bundle.path).unwrap().len());

        let entries = read_bundle(&bundle.path);
        let names: Vec<&str> = entries.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            [
                "nexus-linux",
                "public",
                "public/css",
                "public/css/site.css",
                "public/index.html"
            ]
        );
        assert_eq!(
            entries["nexus-linux"].as_deref(),
            Some(&b"\x7fELF fake binary"[..])
        );
    }

    #[test]
    fn test_repackaging_drops_leftovers() {
        let fx = fixture();
        let packager = Packager::new(fx.layout.clone());

        let first = read_bundle(&packager.package().unwrap().path);
        fs::write(fx.layout.staging_dir.join("stale.txt"), b"left behind").unwrap();
        let second = read_bundle(&packager.package().unwrap().path);

        assert_eq!(first, second);
        assert!(!second.contains_key("stale.txt"));
    }

    #[test]
    fn test_missing_executable_skips_archive() {
        let fx = fixture();
        fs::write(&fx.layout.bundle, b"old bundle").unwrap();
        fs::remove_file(&fx.layout.executable).unwrap();

        let err = Packager::new(fx.layout.clone()).package().unwrap_err();
        assert!(matches!(err, PackageError::CopyExecutable { .. }));
        assert!(!fx.layout.bundle.exists());
    }

    #[test]
    fn test_missing_assets_skips_archive() {
        let fx = fixture();
        fs::remove_dir_all(&fx.layout.assets).unwrap();

        let err = Packager::new(fx.layout.clone()).package().unwrap_err();
        assert!(matches!(err, PackageError::CopyAssets { .. }));
        assert!(!fx.layout.bundle.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_preserved() {
        let fx = fixture();
        let bundle = Packager::new(fx.layout.clone()).package().unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&bundle.path).unwrap()));
        let exe = archive
            .entries()
            .unwrap()
            .map(Result::unwrap)
            .find(|e| e.path().unwrap().as_ref() == Path::new("nexus-linux"))
            .unwrap();
        assert_ne!(exe.header().mode().unwrap() & 0o111, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_asset_dir_is_kept_as_link() {
        let fx = fixture();
        let shared = fx.layout.assets.parent().unwrap().join("shared/fonts");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("mono.woff2"), b"font").unwrap();
        std::os::unix::fs::symlink("../shared/fonts", fx.layout.assets.join("fonts")).unwrap();

        let bundle = Packager::new(fx.layout.clone()).package().unwrap();

        let staged = fx.layout.staging_dir.join("public/fonts");
        assert!(fs::symlink_metadata(&staged).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&staged).unwrap(), Path::new("../shared/fonts"));

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&bundle.path).unwrap()));
        let link = archive
            .entries()
            .unwrap()
            .map(Result::unwrap)
            .find(|e| e.path().unwrap().as_ref() == Path::new("public/fonts"))
            .unwrap();
        assert!(link.header().entry_type().is_symlink());
        assert_eq!(
            link.link_name().unwrap().unwrap().as_ref(),
            Path::new("../shared/fonts")
        );
    }
}
