//! Static descriptors for the toolchains the server embeds.
//!
//! Implant builds cross-compile for every supported target from one server,
//! so each toolchain is fetched once per (os, arch) pair and laid out under
//! `<os>/<arch>/` in the destination tree. Versions are pinned; bumping one
//! is a deliberate, reviewed change.

use std::fmt;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::minisign::PublicKey;

pub(crate) const ZIG_VERSION: &str = "0.14.0";
pub(crate) const GO_VERSION: &str = "1.23.4";
pub(crate) const GARBLE_VERSION: &str = "0.13.0";

/// Well-known community mirror list for zig distributions.
pub(crate) const ZIG_MIRROR_LIST_URL: &str =
    "https://ziglang.org/download/community-mirrors.txt";

/// Compiled-in mirrors used whenever the live list cannot be fetched.
pub(crate) const ZIG_FALLBACK_MIRRORS: &[&str] = &[
    "https://pkg.machengine.org/zig",
    "https://zigmirror.hryx.net/zig",
    "https://zig.linus.dev/zig",
    "https://zigmirror.nesovic.dev/zig",
    "https://zig.squirl.dev",
];

/// Environment override for the zig release signing key; accepts the full
/// two-line key text or the bare base64 line.
pub(crate) const ZIG_PUBLIC_KEY_ENV: &str = "ZIG_PUBLIC_KEY";

/// The zig release signing key shipped with this build.
pub(crate) const ZIG_DEFAULT_PUBLIC_KEY: &str =
    "RWSGOq2NVecA2UPNdBUZykf1CCb147pkmdtYxgb3Ti+JO/wCYvhbAb/U";

/// Go distributions and garble binaries ship without detached signatures;
/// both come from single fixed URLs with no mirror fallback.
pub(crate) const GO_DOWNLOAD_BASE: &str = "https://go.dev/dl";
pub(crate) const GARBLE_DOWNLOAD_BASE: &str =
    "https://github.com/burrowers/garble/releases/download";

/// The toolchains a full pipeline run produces, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolchainKind {
    /// Systems toolchain for cross-compiling native stubs (minisign-verified).
    Zig,
    /// Language runtime the implants are compiled with (unverified source).
    Go,
    /// Build obfuscator (unverified source).
    Garble,
}

/// How a toolchain's artifacts are authenticated. Everything below
/// `Minisign` is a trust downgrade the operator must be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Detached minisign signature verified against a pinned key.
    Minisign,
    /// Nothing beyond TLS to a fixed upstream URL.
    Unverified,
}

impl ToolchainKind {
    pub fn all() -> [ToolchainKind; 3] {
        [ToolchainKind::Zig, ToolchainKind::Go, ToolchainKind::Garble]
    }

    pub fn trust(self) -> Trust {
        match self {
            ToolchainKind::Zig => Trust::Minisign,
            ToolchainKind::Go | ToolchainKind::Garble => Trust::Unverified,
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainKind::Zig => write!(f, "zig"),
            ToolchainKind::Go => write!(f, "go"),
            ToolchainKind::Garble => write!(f, "garble"),
        }
    }
}

/// One (os, arch) pair the server can build implants for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Target {
    pub os: &'static str,
    pub arch: &'static str,
}

pub(crate) const TARGETS: [Target; 5] = [
    Target { os: "linux", arch: "amd64" },
    Target { os: "linux", arch: "arm64" },
    Target { os: "darwin", arch: "amd64" },
    Target { os: "darwin", arch: "arm64" },
    Target { os: "windows", arch: "amd64" },
];

impl Target {
    pub(crate) fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// zig's release naming uses its own os/arch vocabulary.
    fn zig_os(&self) -> &'static str {
        match self.os {
            "darwin" => "macos",
            other => other,
        }
    }

    fn zig_arch(&self) -> &'static str {
        match self.arch {
            "amd64" => "x86_64",
            "arm64" => "aarch64",
            other => other,
        }
    }
}

/// One artifact the pipeline must produce: where it lives upstream and what
/// it is called in the destination tree.
#[derive(Debug, Clone)]
pub(crate) struct Artifact {
    pub target: Target,
    pub remote_name: String,
    pub local_name: &'static str,
}

pub(crate) fn zig_artifacts() -> Vec<Artifact> {
    TARGETS
        .iter()
        .map(|target| {
            let (ext, local_name) = if target.is_windows() {
                ("zip", "zig.zip")
            } else {
                ("tar.xz", "zig.tar.xz")
            };
            Artifact {
                target: *target,
                remote_name: format!(
                    "zig-{}-{}-{}.{}",
                    target.zig_os(),
                    target.zig_arch(),
                    ZIG_VERSION,
                    ext
                ),
                local_name,
            }
        })
        .collect()
}

pub(crate) fn go_artifacts() -> Vec<Artifact> {
    TARGETS
        .iter()
        .map(|target| {
            let ext = if target.is_windows() { "zip" } else { "tar.gz" };
            Artifact {
                target: *target,
                remote_name: format!("go{}.{}-{}.{}", GO_VERSION, target.os, target.arch, ext),
                local_name: "go.zip",
            }
        })
        .collect()
}

pub(crate) fn garble_artifacts() -> Vec<Artifact> {
    TARGETS
        .iter()
        .map(|target| {
            let (suffix, local_name) = if target.is_windows() {
                (".exe", "garble.exe")
            } else {
                ("", "garble")
            };
            Artifact {
                target: *target,
                remote_name: format!(
                    "garble_{}_{}_{}{}",
                    GARBLE_VERSION, target.os, target.arch, suffix
                ),
                local_name,
            }
        })
        .collect()
}

/// The key every zig artifact must verify against. The environment override
/// wins; a malformed override is a configuration error, not something to
/// retry across mirrors.
pub(crate) fn zig_verify_key() -> Result<PublicKey> {
    match std::env::var(ZIG_PUBLIC_KEY_ENV) {
        Ok(text) => PublicKey::decode(&text)
            .with_context(|| format!("Invalid {ZIG_PUBLIC_KEY_ENV} override")),
        Err(_) => PublicKey::decode(ZIG_DEFAULT_PUBLIC_KEY)
            .context("Compiled-in zig public key is malformed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minisign::generate_key;
    use serial_test::serial;

    #[test]
    fn test_artifact_naming() {
        let zig = zig_artifacts();
        assert_eq!(zig.len(), TARGETS.len());
        assert!(zig
            .iter()
            .any(|a| a.remote_name == "zig-macos-aarch64-0.14.0.tar.xz"));
        assert!(zig
            .iter()
            .any(|a| a.remote_name == "zig-windows-x86_64-0.14.0.zip" && a.local_name == "zig.zip"));

        let go = go_artifacts();
        assert!(go.iter().any(|a| a.remote_name == "go1.23.4.linux-amd64.tar.gz"));
        assert!(go.iter().any(|a| a.remote_name == "go1.23.4.windows-amd64.zip"));

        let garble = garble_artifacts();
        assert!(garble
            .iter()
            .any(|a| a.remote_name == "garble_0.13.0_darwin_arm64" && a.local_name == "garble"));
        assert!(garble
            .iter()
            .any(|a| a.remote_name == "garble_0.13.0_windows_amd64.exe"
                && a.local_name == "garble.exe"));
    }

    #[test]
    fn test_trust_markers() {
        assert_eq!(ToolchainKind::Zig.trust(), Trust::Minisign);
        assert_eq!(ToolchainKind::Go.trust(), Trust::Unverified);
        assert_eq!(ToolchainKind::Garble.trust(), Trust::Unverified);
    }

    #[test]
    #[serial]
    fn test_default_key_decodes() {
        std::env::remove_var(ZIG_PUBLIC_KEY_ENV);
        let key = zig_verify_key().unwrap();
        assert_eq!(
            PublicKey::decode(ZIG_DEFAULT_PUBLIC_KEY).unwrap(),
            key
        );
    }

    #[test]
    #[serial]
    fn test_env_override_wins() {
        let (public, _) = generate_key();
        std::env::set_var(ZIG_PUBLIC_KEY_ENV, public.to_text());
        let key = zig_verify_key().unwrap();
        std::env::remove_var(ZIG_PUBLIC_KEY_ENV);
        assert_eq!(key, public);
    }

    #[test]
    #[serial]
    fn test_malformed_env_override_is_an_error() {
        std::env::set_var(ZIG_PUBLIC_KEY_ENV, "definitely not a key");
        let result = zig_verify_key();
        std::env::remove_var(ZIG_PUBLIC_KEY_ENV);
        assert!(result.is_err());
    }
}
