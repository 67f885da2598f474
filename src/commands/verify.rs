//! Standalone artifact verification, for checking a download outside the
//! full pipeline. Exit status is the whole interface: 0 when the signature
//! holds, 1 otherwise.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use crate::commands::fetch::download::verify_artifact_file;
use crate::commands::fetch::toolchains::zig_verify_key;
use crate::minisign::{DigestReader, PublicKey, Signature};

pub struct VerifyOptions {
    pub artifact: PathBuf,
    pub signature: PathBuf,
    /// Public key as text, a bare base64 line, or a path to a key file.
    /// Defaults to the configured zig release key.
    pub key: Option<String>,
}

/// Verify the artifact and report. Returns whether the signature held; the
/// caller turns that into the process exit code.
pub fn execute(options: VerifyOptions) -> Result<bool> {
    let public_key = match &options.key {
        Some(value) => load_key_argument(value)?,
        None => zig_verify_key()?,
    };

    let signature_text = fs::read_to_string(&options.signature)
        .with_context(|| format!("Failed to read {}", options.signature.display()))?;
    let signature = Signature::from_text(&signature_text)
        .with_context(|| format!("Malformed signature file {}", options.signature.display()))?;

    let verified = verify_artifact_file(&public_key, &options.artifact, &signature)?;
    if verified {
        println!(
            "{} Signature verified for {}",
            "✓".green().bold(),
            options.artifact.display()
        );
        if let Some(when) = signature
            .trusted_comment_field("timestamp")
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        {
            println!("  {} signed {}", "ℹ".blue(), when.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        // Digest goes to the operator log for cross-checking against other
        // verifiers.
        println!(
            "  {} BLAKE2b-512: {}",
            "ℹ".blue(),
            artifact_digest_hex(&options.artifact)?.dimmed()
        );
    } else {
        println!(
            "{} Signature verification FAILED for {}",
            "✗".red().bold(),
            options.artifact.display()
        );
    }
    Ok(verified)
}

fn artifact_digest_hex(artifact: &Path) -> Result<String> {
    let file =
        File::open(artifact).with_context(|| format!("Failed to open {}", artifact.display()))?;
    let mut reader = DigestReader::new(BufReader::new(file));
    io::copy(&mut reader, &mut io::sink())
        .with_context(|| format!("Failed to read {}", artifact.display()))?;
    Ok(reader.digest_hex())
}

fn load_key_argument(value: &str) -> Result<PublicKey> {
    let as_path = Path::new(value);
    if as_path.exists() {
        let text = fs::read_to_string(as_path)
            .with_context(|| format!("Failed to read key file {}", as_path.display()))?;
        PublicKey::decode(&text)
            .with_context(|| format!("Malformed public key in {}", as_path.display()))
    } else {
        PublicKey::decode(value).context("Malformed public key argument")
    }
}
