//! A self-contained implementation of the minisign signature scheme.
//!
//! Minisign is Ed25519 plus BLAKE2b-512 with a human-readable base64 text
//! encoding. Every signature is really two signatures: one over the message
//! (or its digest, in pre-hashed mode) and one over the first signature
//! concatenated with the trusted comment. The second binding is what stops
//! anyone from splicing a forged comment onto a legitimately-signed payload.
//!
//! Only verification with a public key and raw keypair generation are
//! implemented here; password-protected secret-key boxes are out of scope.

mod keys;
mod signature;
mod stream;

#[cfg(test)]
mod tests;

pub use keys::{generate_key, PrivateKey, PublicKey, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
pub use signature::{Algorithm, Signature};
pub use stream::DigestReader;

use blake2::{Blake2b512, Digest};
use ed25519_dalek::{Signer as _, Verifier as _};
use thiserror::Error;

/// Length of the self-describing header of a raw signature: algorithm
/// tag (2) + key ID (8) + signature (64).
pub const RAW_HEADER_LEN: usize = 74;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid private key material")]
    InvalidPrivateKey,
}

/// Sign a message and serialize the result to signature text.
///
/// With `prehashed` the BLAKE2b-512 digest of the message is signed instead
/// of the message itself, and the signature is tagged accordingly; large
/// artifacts use this mode so verification can stream.
pub fn sign(
    private_key: &PrivateKey,
    message: &[u8],
    trusted_comment: &str,
    untrusted_comment: &str,
    prehashed: bool,
) -> Result<String, Error> {
    let digest;
    let signed_content: &[u8] = if prehashed {
        digest = Blake2b512::digest(message);
        digest.as_slice()
    } else {
        message
    };
    let algorithm = if prehashed {
        Algorithm::HashEdDSA
    } else {
        Algorithm::EdDSA
    };
    sign_content(
        private_key,
        signed_content,
        algorithm,
        trusted_comment,
        untrusted_comment,
    )
}

/// Sign content that has already been put in its final form (either the raw
/// message or its digest, matching `algorithm`).
fn sign_content(
    private_key: &PrivateKey,
    content: &[u8],
    algorithm: Algorithm,
    trusted_comment: &str,
    untrusted_comment: &str,
) -> Result<String, Error> {
    let signing_key = private_key.signing_key()?;
    let sig = signing_key.sign(content).to_bytes();

    let mut bound = Vec::with_capacity(sig.len() + trusted_comment.len());
    bound.extend_from_slice(&sig);
    bound.extend_from_slice(trusted_comment.as_bytes());
    let comment_sig = signing_key.sign(&bound).to_bytes();

    Ok(Signature {
        algorithm,
        key_id: private_key.key_id,
        signature: sig,
        trusted_comment: trusted_comment.to_string(),
        untrusted_comment: untrusted_comment.to_string(),
        comment_signature: comment_sig,
    }
    .to_text())
}

/// Verify signature text against a message.
///
/// The `prehashed` argument is accepted for symmetry with [`sign`] but the
/// algorithm tag decoded from the signature decides how the message is
/// hashed; a mismatched hint cannot force acceptance under the other mode.
/// Returns `Err` only when the signature text itself cannot be parsed.
pub fn verify(
    public_key: &PublicKey,
    message: &[u8],
    signature_text: &str,
    _prehashed: bool,
) -> Result<bool, Error> {
    let signature = Signature::from_text(signature_text)?;
    Ok(verify_parsed(public_key, message, &signature))
}

/// Verify an already-parsed signature against a message.
pub fn verify_parsed(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let digest;
    let content: &[u8] = match signature.algorithm {
        Algorithm::HashEdDSA => {
            digest = Blake2b512::digest(message);
            digest.as_slice()
        }
        Algorithm::EdDSA => message,
    };
    verify_content(public_key, content, signature)
}

/// Verify a parsed signature against content already in its final form.
/// Both the primary signature and the trusted-comment binding must hold.
pub(crate) fn verify_content(
    public_key: &PublicKey,
    content: &[u8],
    signature: &Signature,
) -> bool {
    if signature.key_id != public_key.key_id {
        return false;
    }
    let Ok(verifying_key) = public_key.verifying_key() else {
        return false;
    };

    let sig = ed25519_dalek::Signature::from_bytes(&signature.signature);
    if verifying_key.verify(content, &sig).is_err() {
        return false;
    }

    let mut bound =
        Vec::with_capacity(signature.signature.len() + signature.trusted_comment.len());
    bound.extend_from_slice(&signature.signature);
    bound.extend_from_slice(signature.trusted_comment.as_bytes());
    let comment_sig = ed25519_dalek::Signature::from_bytes(&signature.comment_signature);
    verifying_key.verify(&bound, &comment_sig).is_ok()
}

/// Produce the fixed-width header of a raw signature. The caller embeds the
/// message immediately after the header in the same buffer; there is no
/// comment pair in this variant.
pub fn sign_raw(
    private_key: &PrivateKey,
    message: &[u8],
    prehashed: bool,
) -> Result<[u8; RAW_HEADER_LEN], Error> {
    let digest;
    let content: &[u8] = if prehashed {
        digest = Blake2b512::digest(message);
        digest.as_slice()
    } else {
        message
    };
    let algorithm = if prehashed {
        Algorithm::HashEdDSA
    } else {
        Algorithm::EdDSA
    };

    let signing_key = private_key.signing_key()?;
    let sig = signing_key.sign(content).to_bytes();

    let mut header = [0u8; RAW_HEADER_LEN];
    header[..2].copy_from_slice(&algorithm.tag());
    header[2..10].copy_from_slice(&private_key.key_id.to_le_bytes());
    header[10..].copy_from_slice(&sig);
    Ok(header)
}

/// Verify a raw signature buffer: the 74-byte header followed by at least
/// one byte of message. Malformed or truncated buffers verify as false,
/// never panic.
pub fn verify_raw(public_key: &PublicKey, raw: &[u8]) -> bool {
    if raw.len() <= RAW_HEADER_LEN {
        return false;
    }
    let Ok(algorithm) = Algorithm::from_tag([raw[0], raw[1]]) else {
        return false;
    };
    let key_id = u64::from_le_bytes(raw[2..10].try_into().expect("length checked above"));
    if key_id != public_key.key_id {
        return false;
    }
    let Ok(verifying_key) = public_key.verifying_key() else {
        return false;
    };

    let message = &raw[RAW_HEADER_LEN..];
    let digest;
    let content: &[u8] = match algorithm {
        Algorithm::HashEdDSA => {
            digest = Blake2b512::digest(message);
            digest.as_slice()
        }
        Algorithm::EdDSA => message,
    };

    let sig_bytes: [u8; 64] = raw[10..RAW_HEADER_LEN]
        .try_into()
        .expect("length checked above");
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(content, &sig).is_ok()
}
