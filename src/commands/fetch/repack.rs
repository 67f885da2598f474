//! Rebuilding the Go distribution into embeddable archives.
//!
//! The upstream distribution carries documentation, test suites and the full
//! standard-library source for every platform. Embedding that five times
//! over would bloat the server binary for nothing, so each platform tree is
//! stripped, the standard-library source is archived once as a shared
//! `src.zip`, and the remainder is re-zipped as the per-platform `go.zip`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::commands::fetch::archive::{extract_tar_gz, extract_zip, zip_directory};
use crate::commands::fetch::download::move_into_place;
use crate::commands::fetch::toolchains::Target;

/// Subtrees of the distribution with no role in implant builds.
pub(crate) const GO_BLOAT_PATHS: &[&str] = &["go/doc", "go/test", "go/api", "go/misc"];

/// Remove each of `relative_paths` under `root` if present. Absent paths are
/// not an error; a path that exists but cannot be removed is.
pub(crate) fn strip_paths(root: &Path, relative_paths: &[&str]) -> Result<()> {
    for relative in relative_paths {
        let target = root.join(relative);
        let Ok(metadata) = fs::symlink_metadata(&target) else {
            continue;
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&target)
                .with_context(|| format!("Failed to remove {}", target.display()))?;
        } else {
            fs::remove_file(&target)
                .with_context(|| format!("Failed to remove {}", target.display()))?;
        }
        debug!(path = %target.display(), "stripped");
    }
    Ok(())
}

/// Turn one downloaded distribution archive into the destination artifacts:
/// the shared `src.zip` (built from the first platform processed) and the
/// platform's trimmed `go.zip`. The extracted tree is deleted once its
/// archives exist.
pub(crate) fn rebuild_go_distribution(
    archive: &Path,
    target: &Target,
    work_dir: &Path,
    dest_root: &Path,
    shared_src_built: &mut bool,
) -> Result<()> {
    let extract_dir = work_dir.join(format!("go-{}-{}", target.os, target.arch));
    fs::create_dir_all(&extract_dir)
        .with_context(|| format!("Failed to create {}", extract_dir.display()))?;

    if target.is_windows() {
        extract_zip(archive, &extract_dir)?;
    } else {
        extract_tar_gz(archive, &extract_dir)?;
    }

    strip_paths(&extract_dir, GO_BLOAT_PATHS)?;

    // The standard-library source is identical across platforms; archive it
    // once at the destination root instead of inside every go.zip.
    if !*shared_src_built {
        let staged = work_dir.join("src.zip");
        zip_directory(&extract_dir.join("go"), "src", &staged)?;
        move_into_place(&staged, &dest_root.join("src.zip"))?;
        *shared_src_built = true;
    }
    strip_paths(&extract_dir, &["go/src"])?;

    let staged = work_dir.join(format!("go-{}-{}.zip", target.os, target.arch));
    zip_directory(&extract_dir, "go", &staged)?;
    move_into_place(
        &staged,
        &dest_root.join(target.os).join(target.arch).join("go.zip"),
    )?;

    fs::remove_dir_all(&extract_dir)
        .with_context(|| format!("Failed to remove {}", extract_dir.display()))?;
    Ok(())
}
