//! The full toolchain acquisition pipeline.
//!
//! One run produces the complete destination tree the server embeds:
//! minisign-verified zig archives, the rebuilt Go distribution, and the
//! garble obfuscator, keyed by `<os>/<arch>/`. All intermediate state lives
//! in a scoped working directory that is removed however the run ends.

pub(crate) mod archive;
pub(crate) mod client;
pub(crate) mod download;
pub(crate) mod mirrors;
pub(crate) mod repack;
pub(crate) mod toolchains;

pub use toolchains::{ToolchainKind, Trust};

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use reqwest::blocking::Client;
use tracing::warn;

use client::{
    create_http_client, download_to_temp, HTTP_ARTIFACT_TIMEOUT_SECS, HTTP_TEXT_TIMEOUT_SECS,
};
use download::{fetch_unverified, fetch_verified};
use mirrors::resolve_mirrors;
use repack::rebuild_go_distribution;
use toolchains::{
    garble_artifacts, go_artifacts, zig_artifacts, zig_verify_key, GARBLE_DOWNLOAD_BASE,
    GARBLE_VERSION, GO_DOWNLOAD_BASE, ZIG_FALLBACK_MIRRORS, ZIG_MIRROR_LIST_URL, ZIG_VERSION,
};

pub struct FetchOptions {
    /// Destination tree; defaults to `<project root>/assets/fs`.
    pub out_dir: Option<PathBuf>,
    /// Restrict the run to a single toolchain kind.
    pub only: Option<ToolchainKind>,
}

/// Run the pipeline for every configured toolchain kind in sequence.
pub fn execute(options: FetchOptions) -> Result<()> {
    let dest_root = match options.out_dir {
        Some(dir) => dir,
        None => locate_project_root()?.join("assets").join("fs"),
    };
    fs::create_dir_all(&dest_root)
        .with_context(|| format!("Failed to create {}", dest_root.display()))?;

    // Scoped working directory: removed on drop whether or not the run
    // succeeds, so no intermediate download ever outlives the pipeline.
    let work = tempfile::tempdir().context("Failed to create working directory")?;

    let text_client = create_http_client(HTTP_TEXT_TIMEOUT_SECS)?;
    let artifact_client = create_http_client(HTTP_ARTIFACT_TIMEOUT_SECS)?;

    let kinds = match options.only {
        Some(kind) => vec![kind],
        None => ToolchainKind::all().to_vec(),
    };

    for kind in kinds {
        match kind {
            ToolchainKind::Zig => {
                fetch_zig(&text_client, &artifact_client, work.path(), &dest_root)?
            }
            ToolchainKind::Go => fetch_go(&artifact_client, work.path(), &dest_root)?,
            ToolchainKind::Garble => fetch_garble(&artifact_client, work.path(), &dest_root)?,
        }
    }

    println!(
        "{} Toolchain assets ready in {}",
        "✓".green().bold(),
        dest_root.display()
    );
    Ok(())
}

/// Walk parent directories for a build manifest to anchor relative output
/// paths, so the tool works from anywhere inside the checkout.
pub(crate) fn locate_project_root() -> Result<PathBuf> {
    let current = env::current_dir().context("Failed to read current directory")?;
    for dir in current.ancestors() {
        if dir.join("Cargo.toml").exists() {
            return Ok(dir.to_path_buf());
        }
    }
    bail!(
        "No Cargo.toml found walking up from {}; pass --out-dir to run outside a checkout",
        current.display()
    );
}

fn fetch_zig(
    text_client: &Client,
    artifact_client: &Client,
    work_dir: &Path,
    dest_root: &Path,
) -> Result<()> {
    // A bad key is a configuration error; fail before any download.
    let public_key = zig_verify_key()?;

    println!("{} zig {}: resolving mirrors...", "→".blue(), ZIG_VERSION);
    let mirror_list = resolve_mirrors(text_client, ZIG_MIRROR_LIST_URL, ZIG_FALLBACK_MIRRORS);
    println!("  {} {} mirrors available", "ℹ".blue(), mirror_list.len());

    let mut rng = rand::thread_rng();
    for artifact in zig_artifacts() {
        let target = artifact.target;
        let dest = dest_root
            .join(target.os)
            .join(target.arch)
            .join(artifact.local_name);
        println!(
            "  {} {}/{}: {}",
            "→".blue(),
            target.os,
            target.arch,
            artifact.remote_name
        );
        fetch_verified(
            artifact_client,
            &mirror_list,
            ZIG_VERSION,
            &artifact.remote_name,
            &public_key,
            work_dir,
            &dest,
            &mut rng,
        )
        .with_context(|| format!("zig {}/{}", target.os, target.arch))?;
        println!("  {} verified and published", "✓".green());
    }
    Ok(())
}

fn fetch_go(client: &Client, work_dir: &Path, dest_root: &Path) -> Result<()> {
    warn_unverified_source(ToolchainKind::Go, GO_DOWNLOAD_BASE);

    let mut shared_src_built = false;
    for artifact in go_artifacts() {
        let target = artifact.target;
        let url = format!("{GO_DOWNLOAD_BASE}/{}", artifact.remote_name);
        println!(
            "  {} {}/{}: {}",
            "→".blue(),
            target.os,
            target.arch,
            artifact.remote_name
        );
        let distribution = download_to_temp(client, &url, work_dir)
            .with_context(|| format!("go {}/{}", target.os, target.arch))?;
        rebuild_go_distribution(
            distribution.path(),
            &target,
            work_dir,
            dest_root,
            &mut shared_src_built,
        )
        .with_context(|| format!("go {}/{}", target.os, target.arch))?;
        println!("  {} repackaged", "✓".green());
    }
    Ok(())
}

fn fetch_garble(client: &Client, work_dir: &Path, dest_root: &Path) -> Result<()> {
    warn_unverified_source(ToolchainKind::Garble, GARBLE_DOWNLOAD_BASE);

    for artifact in garble_artifacts() {
        let target = artifact.target;
        let url = format!(
            "{GARBLE_DOWNLOAD_BASE}/v{GARBLE_VERSION}/{}",
            artifact.remote_name
        );
        let dest = dest_root
            .join(target.os)
            .join(target.arch)
            .join(artifact.local_name);
        println!(
            "  {} {}/{}: {}",
            "→".blue(),
            target.os,
            target.arch,
            artifact.remote_name
        );
        fetch_unverified(client, &url, work_dir, &dest)
            .with_context(|| format!("garble {}/{}", target.os, target.arch))?;
        archive::set_unix_mode(&dest, 0o755)
            .with_context(|| format!("Failed to chmod {}", dest.display()))?;
        println!("  {} published", "✓".green());
    }
    Ok(())
}

/// These artifacts carry no detached signature; say so loudly instead of
/// letting the run look uniformly verified.
fn warn_unverified_source(kind: ToolchainKind, base_url: &str) {
    debug_assert_eq!(kind.trust(), Trust::Unverified);
    println!(
        "{} {} ships unsigned; trusting {} without verification",
        "⚠".yellow().bold(),
        kind,
        base_url
    );
    warn!(toolchain = %kind, url = base_url, "fetching from unverified source");
}
