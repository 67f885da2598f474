//! Ed25519 key material and the minisign public-key text format.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use blake2::{Blake2b512, Digest};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::minisign::signature::Algorithm;
use crate::minisign::Error;

/// Raw Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Raw Ed25519 keypair length (seed followed by public key).
pub const PRIVATE_KEY_LEN: usize = 64;

/// Encoded public-key block: algorithm tag (2) + key ID (8) + key (32).
const PUBLIC_KEY_BLOCK_LEN: usize = 2 + 8 + PUBLIC_KEY_LEN;

/// A minisign public key: a 64-bit key identifier plus the raw Ed25519
/// verification key.
///
/// Two keys are equal iff both the identifier and the key bytes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    pub key_id: u64,
    pub key: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    /// Parse the two-line public-key text form:
    ///
    /// ```text
    /// untrusted comment: minisign public key 8E9D22D875357EC7
    /// RWTHfjV12CKdjuXF6DPYXsOoneV6zG4nt4Qd1DFe7JzSIXTXKfRJPHjJ
    /// ```
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let first = lines.next().ok_or(Error::MalformedPublicKey)?;
        if !first.starts_with("untrusted comment:") {
            return Err(Error::MalformedPublicKey);
        }
        let encoded = lines.next().ok_or(Error::MalformedPublicKey)?;
        Self::from_base64(encoded.trim())
    }

    /// Parse the bare base64 line of the text form.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let block = BASE64
            .decode(encoded)
            .map_err(|_| Error::MalformedPublicKey)?;
        if block.len() != PUBLIC_KEY_BLOCK_LEN {
            return Err(Error::MalformedPublicKey);
        }
        if block[..2] != Algorithm::EdDSA.tag() {
            return Err(Error::MalformedPublicKey);
        }
        let key_id = u64::from_le_bytes(block[2..10].try_into().expect("length checked above"));
        let key: [u8; PUBLIC_KEY_LEN] =
            block[10..].try_into().expect("length checked above");
        Ok(PublicKey { key_id, key })
    }

    /// Parse either the full two-line text form or the bare base64 line,
    /// whichever the input looks like.
    pub fn decode(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.contains('\n') || trimmed.starts_with("untrusted comment:") {
            Self::from_text(trimmed)
        } else {
            Self::from_base64(trimmed)
        }
    }

    /// Serialize to the two-line text form.
    pub fn to_text(&self) -> String {
        let mut block = Vec::with_capacity(PUBLIC_KEY_BLOCK_LEN);
        block.extend_from_slice(&Algorithm::EdDSA.tag());
        block.extend_from_slice(&self.key_id.to_le_bytes());
        block.extend_from_slice(&self.key);
        format!(
            "untrusted comment: minisign public key {:X}\n{}\n",
            self.key_id,
            BASE64.encode(block)
        )
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey, Error> {
        VerifyingKey::from_bytes(&self.key).map_err(|_| Error::MalformedPublicKey)
    }
}

/// The secret half of a keypair: the key identifier plus the raw Ed25519
/// keypair bytes. There is no encrypted on-disk form; the only producer is
/// [`generate_key`].
#[derive(Clone)]
pub struct PrivateKey {
    pub key_id: u64,
    pub key: [u8; PRIVATE_KEY_LEN],
}

impl PrivateKey {
    pub(crate) fn signing_key(&self) -> Result<SigningKey, Error> {
        SigningKey::from_keypair_bytes(&self.key).map_err(|_| Error::InvalidPrivateKey)
    }
}

/// Generate a fresh Ed25519 keypair from OS randomness.
///
/// The key identifier is a fingerprint of the public key material: the first
/// eight bytes, little-endian, of its BLAKE2b-512 digest.
pub fn generate_key() -> (PublicKey, PrivateKey) {
    let signing = SigningKey::generate(&mut OsRng);
    let verifying = signing.verifying_key();
    let key_id = derive_key_id(verifying.as_bytes());
    let public = PublicKey {
        key_id,
        key: verifying.to_bytes(),
    };
    let private = PrivateKey {
        key_id,
        key: signing.to_keypair_bytes(),
    };
    (public, private)
}

fn derive_key_id(public_key: &[u8; PUBLIC_KEY_LEN]) -> u64 {
    let digest = Blake2b512::digest(public_key);
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 64 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_text_roundtrip() {
        let (public, _) = generate_key();
        let text = public.to_text();
        let parsed = PublicKey::from_text(&text).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn test_decode_accepts_bare_base64() {
        let (public, _) = generate_key();
        let text = public.to_text();
        let bare = text.lines().nth(1).unwrap();
        assert_eq!(PublicKey::decode(bare).unwrap(), public);
        assert_eq!(PublicKey::decode(&text).unwrap(), public);
    }

    #[test]
    fn test_rejects_wrong_algorithm_tag() {
        let (public, _) = generate_key();
        let mut block = Vec::new();
        block.extend_from_slice(b"XX");
        block.extend_from_slice(&public.key_id.to_le_bytes());
        block.extend_from_slice(&public.key);
        let encoded = BASE64.encode(block);
        assert!(matches!(
            PublicKey::from_base64(&encoded),
            Err(Error::MalformedPublicKey)
        ));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let encoded = BASE64.encode(b"Ed too short");
        assert!(PublicKey::from_base64(&encoded).is_err());
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(PublicKey::from_base64("not!valid!base64!").is_err());
        assert!(PublicKey::from_text("untrusted comment: key\nnot!valid!").is_err());
    }

    #[test]
    fn test_key_id_is_stable_fingerprint() {
        let (public, private) = generate_key();
        assert_eq!(public.key_id, private.key_id);
        assert_eq!(derive_key_id(&public.key), public.key_id);
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let (a, _) = generate_key();
        let (b, _) = generate_key();
        assert_ne!(a, b);
    }
}
