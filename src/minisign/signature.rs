//! The minisign signature text format.
//!
//! A signature file carries four lines: an untrusted comment, the base64
//! signature block (algorithm tag, key ID, Ed25519 signature), a trusted
//! comment, and the base64 comment signature that binds the trusted comment
//! to the primary signature.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::minisign::Error;

/// Signature block length: algorithm tag (2) + key ID (8) + signature (64).
pub(crate) const SIGNATURE_BLOCK_LEN: usize = 2 + 8 + 64;

const UNTRUSTED_PREFIX: &str = "untrusted comment:";
const TRUSTED_PREFIX: &str = "trusted comment:";

/// How the signed message was presented to Ed25519.
///
/// The tag is part of the signature encoding, so a parsed signature is
/// authoritative about its own hashing mode; verification never consults the
/// caller on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// The message itself was signed (wire tag `Ed`).
    EdDSA,
    /// The BLAKE2b-512 digest of the message was signed (wire tag `ED`).
    HashEdDSA,
}

impl Algorithm {
    pub(crate) const fn tag(self) -> [u8; 2] {
        match self {
            Algorithm::EdDSA => *b"Ed",
            Algorithm::HashEdDSA => *b"ED",
        }
    }

    pub(crate) fn from_tag(tag: [u8; 2]) -> Result<Self, Error> {
        match &tag {
            b"Ed" => Ok(Algorithm::EdDSA),
            b"ED" => Ok(Algorithm::HashEdDSA),
            _ => Err(Error::UnsupportedAlgorithm),
        }
    }
}

/// A parsed minisign signature.
///
/// Equality ignores the untrusted comment: it is not covered by either
/// signature and carries no meaning.
#[derive(Debug, Clone)]
pub struct Signature {
    pub algorithm: Algorithm,
    pub key_id: u64,
    pub signature: [u8; 64],
    pub trusted_comment: String,
    pub untrusted_comment: String,
    pub comment_signature: [u8; 64],
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm
            && self.key_id == other.key_id
            && self.signature == other.signature
            && self.trusted_comment == other.trusted_comment
            && self.comment_signature == other.comment_signature
    }
}

impl Eq for Signature {}

impl Signature {
    /// Parse the four-line signature text form. Trailing CR/LF and blank
    /// lines after the final field are tolerated; anything else is rejected.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let mut lines = text.lines();

        let untrusted_comment = comment_body(
            lines.next().ok_or(Error::MalformedSignature)?,
            UNTRUSTED_PREFIX,
        )?
        .to_string();

        let block = BASE64
            .decode(lines.next().ok_or(Error::MalformedSignature)?.trim_end())
            .map_err(|_| Error::MalformedSignature)?;
        if block.len() != SIGNATURE_BLOCK_LEN {
            return Err(Error::MalformedSignature);
        }
        let algorithm = Algorithm::from_tag([block[0], block[1]])?;
        let key_id = u64::from_le_bytes(block[2..10].try_into().expect("length checked above"));
        let signature: [u8; 64] = block[10..].try_into().expect("length checked above");

        let trusted_comment = comment_body(
            lines.next().ok_or(Error::MalformedSignature)?,
            TRUSTED_PREFIX,
        )?
        .to_string();

        let comment_block = BASE64
            .decode(lines.next().ok_or(Error::MalformedSignature)?.trim_end())
            .map_err(|_| Error::MalformedSignature)?;
        let comment_signature: [u8; 64] = comment_block
            .as_slice()
            .try_into()
            .map_err(|_| Error::MalformedSignature)?;

        for rest in lines {
            if !rest.trim().is_empty() {
                return Err(Error::MalformedSignature);
            }
        }

        Ok(Signature {
            algorithm,
            key_id,
            signature,
            trusted_comment,
            untrusted_comment,
            comment_signature,
        })
    }

    /// Serialize to the four-line text form.
    pub fn to_text(&self) -> String {
        let mut block = Vec::with_capacity(SIGNATURE_BLOCK_LEN);
        block.extend_from_slice(&self.algorithm.tag());
        block.extend_from_slice(&self.key_id.to_le_bytes());
        block.extend_from_slice(&self.signature);
        format!(
            "{} {}\n{}\n{} {}\n{}\n",
            UNTRUSTED_PREFIX,
            self.untrusted_comment,
            BASE64.encode(block),
            TRUSTED_PREFIX,
            self.trusted_comment,
            BASE64.encode(self.comment_signature)
        )
    }

    /// Look up a `key:value` field of the trusted comment, e.g. `file:` or
    /// `timestamp:`. Fields are whitespace-separated.
    pub fn trusted_comment_field(&self, key: &str) -> Option<&str> {
        self.trusted_comment
            .split_whitespace()
            .find_map(|token| token.strip_prefix(key)?.strip_prefix(':'))
    }
}

/// Strip a comment prefix and the single space the reference tool emits
/// after it. `str::lines` has already dropped any trailing `\r`.
fn comment_body<'a>(line: &'a str, prefix: &str) -> Result<&'a str, Error> {
    let rest = line.strip_prefix(prefix).ok_or(Error::MalformedSignature)?;
    Ok(rest.strip_prefix(' ').unwrap_or(rest))
}
