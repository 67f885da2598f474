//! Archive extraction and creation.
//!
//! Extraction is the last line of defense after signature verification: a
//! compromised mirror that somehow got a payload past the signature gate
//! must still not be able to write outside the extraction directory. Every
//! entry path is re-resolved against the destination and anything that
//! escapes it (absolute names, parent traversal, absolute symlink targets)
//! aborts the whole extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::EntryType;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Resolve an archive entry name against the destination directory,
/// rejecting anything that would land outside it.
///
/// Traversal components are resolved during the walk, so `a/../b` stays
/// inside and is allowed while `../b` or `a/../../b` is an error.
pub(crate) fn safe_join(dest: &Path, entry_name: &str) -> Result<PathBuf> {
    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() || entry_name.starts_with('/') || entry_name.starts_with('\\') {
        bail!("archive entry '{entry_name}' has an absolute path");
    }

    let mut resolved = dest.to_path_buf();
    let mut depth: usize = 0;
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    bail!("archive entry '{entry_name}' escapes the extraction directory");
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("archive entry '{entry_name}' has an absolute path");
            }
        }
    }
    Ok(resolved)
}

/// Symlink targets must stay relative; an absolute target pointed at by a
/// hostile archive would survive any later path check.
fn check_symlink_target(entry_name: &str, target: &Path) -> Result<()> {
    if target.is_absolute() {
        bail!(
            "archive entry '{}' is a symlink to absolute path '{}'",
            entry_name,
            target.display()
        );
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_unix_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_unix_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Extract a gzip-compressed tarball into `dest`.
pub(crate) fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(io::BufReader::new(file)));

    for entry in archive.entries().context("Failed to read tar archive")? {
        let mut entry = entry.context("Failed to read tar entry")?;
        let name = entry.path().context("Tar entry has an unreadable path")?;
        let name = name.to_string_lossy().into_owned();
        let target = safe_join(dest, &name)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create {}", target.display()))?;
                if let Ok(mode) = entry.header().mode() {
                    set_unix_mode(&target, mode)
                        .with_context(|| format!("Failed to chmod {}", target.display()))?;
                }
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                let mut out = File::create(&target)
                    .with_context(|| format!("Failed to create {}", target.display()))?;
                io::copy(&mut entry, &mut out)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                if let Ok(mode) = entry.header().mode() {
                    set_unix_mode(&target, mode)
                        .with_context(|| format!("Failed to chmod {}", target.display()))?;
                }
            }
            EntryType::Symlink => {
                let link_target = entry
                    .link_name()
                    .context("Symlink entry has an unreadable target")?
                    .with_context(|| format!("Symlink entry '{name}' has no target"))?;
                check_symlink_target(&name, &link_target)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &target)
                    .with_context(|| format!("Failed to create symlink {}", target.display()))?;
            }
            // PAX headers, hard links and other extended types carry nothing
            // the toolchain layouts need.
            _ => {}
        }
    }
    Ok(())
}

/// Extract a zip archive into `dest`.
pub(crate) fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("Failed to read zip archive")?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).context("Failed to read zip entry")?;
        let name = entry.name().to_string();
        let target = safe_join(dest, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Zip symlinks are regular-looking entries whose mode marks them and
        // whose body is the link target.
        if entry.unix_mode().is_some_and(|m| m & 0o170000 == 0o120000) {
            let mut target_bytes = Vec::new();
            io::Read::read_to_end(&mut entry, &mut target_bytes)
                .with_context(|| format!("Failed to read symlink entry '{name}'"))?;
            let link_target = PathBuf::from(String::from_utf8_lossy(&target_bytes).into_owned());
            check_symlink_target(&name, &link_target)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &target)
                .with_context(|| format!("Failed to create symlink {}", target.display()))?;
            continue;
        }

        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        if let Some(mode) = entry.unix_mode() {
            set_unix_mode(&target, mode)
                .with_context(|| format!("Failed to chmod {}", target.display()))?;
        }
    }
    Ok(())
}

/// Archive `base_dir/relative_root` into a new zip at `dest_zip`, storing
/// entry paths relative to `base_dir` so the archive's internal root is
/// `relative_root`.
///
/// Directory entries are stored with a trailing slash, files are deflated,
/// and every entry gets a fixed timestamp so the same tree always produces
/// byte-identical output.
pub(crate) fn zip_directory(base_dir: &Path, relative_root: &str, dest_zip: &Path) -> Result<()> {
    let out = File::create(dest_zip)
        .with_context(|| format!("Failed to create {}", dest_zip.display()))?;
    let mut writer = ZipWriter::new(out);

    add_dir_recursive(&mut writer, base_dir, &base_dir.join(relative_root))?;

    writer.finish().context("Failed to finalize zip archive")?;
    Ok(())
}

fn add_dir_recursive(writer: &mut ZipWriter<File>, base_dir: &Path, dir: &Path) -> Result<()> {
    let archive_name = |path: &Path| -> Result<String> {
        let relative = path
            .strip_prefix(base_dir)
            .context("Path escaped the archive base directory")?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"))
    };

    let dir_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o755);

    writer
        .add_directory(format!("{}/", archive_name(dir)?), dir_options)
        .with_context(|| format!("Failed to add directory {}", dir.display()))?;

    // Deterministic output needs a deterministic walk order.
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<io::Result<_>>()
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if file_type.is_dir() {
            add_dir_recursive(writer, base_dir, &path)?;
        } else if file_type.is_file() {
            let mode = file_mode(&entry)?;
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(mode);
            writer
                .start_file(archive_name(&path)?, options)
                .with_context(|| format!("Failed to add {}", path.display()))?;
            let mut input = File::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            io::copy(&mut input, writer)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
        }
        // Symlinks inside toolchain trees are not re-archived.
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(entry: &fs::DirEntry) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = entry
        .metadata()
        .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_entry: &fs::DirEntry) -> Result<u32> {
    Ok(0o644)
}
