//! The fetch-verify-retry loop.
//!
//! Signed artifacts walk the mirror list in shuffled order, strictly one
//! mirror at a time. A mirror attempt owns its temp files: they are either
//! consumed into the destination by the atomic publish or deleted when the
//! attempt is dropped, so a failed attempt can never leave bytes behind.
//! Nothing is ever written to a destination path before the signature and
//! the trusted-comment filename claim have both checked out.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::Rng;
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::commands::fetch::client::download_to_temp;
use crate::commands::fetch::mirrors::shuffled_mirrors;
use crate::minisign::{Algorithm, DigestReader, PublicKey, Signature};

/// Fixed analytics marker mirrors use to attribute traffic. Never validated.
const ANALYTICS_QUERY: &str = "?source=quartermaster";

/// Why one mirror attempt failed. Transport noise and verification failures
/// retry the same way, but verification failures are security events and are
/// logged as such.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),
    #[error("verification failure: {0}")]
    Verification(String),
}

/// Download one signed artifact, trying mirrors in shuffled order until one
/// yields bytes that verify, then atomically publish them to `dest`.
pub(crate) fn fetch_verified<R: Rng>(
    client: &Client,
    mirrors: &[String],
    version: &str,
    remote_name: &str,
    public_key: &PublicKey,
    work_dir: &Path,
    dest: &Path,
    rng: &mut R,
) -> Result<()> {
    for mirror in shuffled_mirrors(mirrors, rng) {
        match attempt_mirror(client, &mirror, version, remote_name, public_key, work_dir) {
            Ok(artifact) => {
                publish(artifact, dest)?;
                debug!(mirror = %mirror, artifact = remote_name, "published verified artifact");
                return Ok(());
            }
            Err(AttemptError::Transport(err)) => {
                debug!(
                    mirror = %mirror,
                    artifact = remote_name,
                    error = %err,
                    "mirror attempt failed"
                );
            }
            Err(AttemptError::Verification(reason)) => {
                warn!(
                    mirror = %mirror,
                    artifact = remote_name,
                    reason = %reason,
                    "rejected artifact from mirror; discarding download"
                );
            }
        }
    }
    bail!("All mirrors exhausted for {remote_name}");
}

/// One complete attempt against one mirror: download artifact and detached
/// signature into private temp files, then verify. Both temp files die with
/// the attempt unless the artifact is returned for publication.
fn attempt_mirror(
    client: &Client,
    mirror: &str,
    version: &str,
    remote_name: &str,
    public_key: &PublicKey,
    work_dir: &Path,
) -> Result<NamedTempFile, AttemptError> {
    let base = format!("{}/{}", mirror.trim_end_matches('/'), version);
    let artifact_url = format!("{base}/{remote_name}{ANALYTICS_QUERY}");
    let signature_url = format!("{base}/{remote_name}.minisig{ANALYTICS_QUERY}");

    let artifact =
        download_to_temp(client, &artifact_url, work_dir).map_err(AttemptError::Transport)?;
    let signature_file =
        download_to_temp(client, &signature_url, work_dir).map_err(AttemptError::Transport)?;

    let signature_text = fs::read_to_string(signature_file.path())
        .map_err(|err| AttemptError::Transport(err.into()))?;
    let signature = Signature::from_text(&signature_text)
        .map_err(|err| AttemptError::Verification(err.to_string()))?;

    // A validly-signed file for a *different* platform must not be accepted;
    // the signed filename claim pins the signature to this exact artifact.
    match signature.trusted_comment_field("file") {
        Some(claimed) if claimed == remote_name => {}
        claimed => {
            return Err(AttemptError::Verification(format!(
                "trusted comment names '{}', expected '{}'",
                claimed.unwrap_or("<no file field>"),
                remote_name
            )));
        }
    }

    let verified = verify_artifact_file(public_key, artifact.path(), &signature)
        .map_err(AttemptError::Transport)?;
    if !verified {
        return Err(AttemptError::Verification(
            "signature does not match artifact".to_string(),
        ));
    }
    Ok(artifact)
}

/// Verify a parsed signature against a file on disk. Pre-hashed signatures
/// stream the file through the digest reader; plain ones need the whole
/// message in memory.
pub(crate) fn verify_artifact_file(
    public_key: &PublicKey,
    artifact: &Path,
    signature: &Signature,
) -> Result<bool> {
    match signature.algorithm {
        Algorithm::HashEdDSA => {
            let file = File::open(artifact)
                .with_context(|| format!("Failed to open {}", artifact.display()))?;
            let mut reader = DigestReader::new(BufReader::new(file));
            io::copy(&mut reader, &mut io::sink())
                .with_context(|| format!("Failed to read {}", artifact.display()))?;
            Ok(reader.verify_parsed(public_key, signature))
        }
        Algorithm::EdDSA => {
            let content = fs::read(artifact)
                .with_context(|| format!("Failed to read {}", artifact.display()))?;
            Ok(crate::minisign::verify_parsed(public_key, &content, signature))
        }
    }
}

/// Fetch an artifact that ships without a detached signature: one fixed URL,
/// no mirrors, no verification. Callers are responsible for surfacing the
/// trust downgrade to the operator.
pub(crate) fn fetch_unverified(
    client: &Client,
    url: &str,
    work_dir: &Path,
    dest: &Path,
) -> Result<()> {
    let temp = download_to_temp(client, url, work_dir)?;
    publish(temp, dest)
}

/// Atomically move a temp file into its destination. The temp is either
/// consumed by the rename or deleted on drop; a cross-filesystem rename
/// failure falls back to staging a copy next to the destination and renaming
/// that, so a partially-written file is never visible at `dest`.
pub(crate) fn publish(temp: NamedTempFile, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("Destination {} has no parent directory", dest.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    match temp.persist(dest) {
        Ok(_) => Ok(()),
        Err(persist_err) => {
            let temp = persist_err.file;
            let mut staging = NamedTempFile::new_in(parent)
                .context("Failed to create staging file next to destination")?;
            let mut source = File::open(temp.path())
                .with_context(|| format!("Failed to reopen {}", temp.path().display()))?;
            io::copy(&mut source, staging.as_file_mut())
                .with_context(|| format!("Failed to stage copy for {}", dest.display()))?;
            staging
                .persist(dest)
                .with_context(|| format!("Failed to move artifact into {}", dest.display()))?;
            Ok(())
        }
    }
}

/// Move an already-final file (e.g. a rebuilt archive in the working
/// directory) into the destination tree with the same atomicity rules.
pub(crate) fn move_into_place(source: &Path, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("Destination {} has no parent directory", dest.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    let mut staging = NamedTempFile::new_in(parent)
        .context("Failed to create staging file next to destination")?;
    let mut input =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    io::copy(&mut input, staging.as_file_mut())
        .with_context(|| format!("Failed to stage copy for {}", dest.display()))?;
    staging
        .persist(dest)
        .with_context(|| format!("Failed to move artifact into {}", dest.display()))?;
    fs::remove_file(source)
        .with_context(|| format!("Failed to remove {}", source.display()))?;
    Ok(())
}
