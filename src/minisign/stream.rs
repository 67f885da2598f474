//! Streaming digest computation for large artifacts.

use std::io::{self, Read};

use blake2::digest::Output;
use blake2::{Blake2b512, Digest};

use crate::minisign::signature::Algorithm;
use crate::minisign::{sign_content, verify_content, Error, PrivateKey, PublicKey, Signature};

/// A pass-through reader that feeds everything read through it into a
/// running BLAKE2b-512 state, so an artifact can be verified while it is
/// being consumed instead of buffered twice.
///
/// [`sign`](DigestReader::sign) and [`verify`](DigestReader::verify)
/// snapshot the digest as of the call, so signatures over different
/// prefixes of one stream can be produced or checked without re-reading.
pub struct DigestReader<R> {
    inner: R,
    digest: Blake2b512,
}

impl<R> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        DigestReader {
            inner,
            digest: Blake2b512::new(),
        }
    }

    fn snapshot(&self) -> Output<Blake2b512> {
        self.digest.clone().finalize()
    }

    /// Hex form of the digest accumulated so far, for audit output.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.snapshot())
    }
}

impl<R: Read> DigestReader<R> {
    /// Sign the digest accumulated so far. Stream signatures are always in
    /// pre-hashed mode.
    pub fn sign(
        &self,
        private_key: &PrivateKey,
        trusted_comment: &str,
        untrusted_comment: &str,
    ) -> Result<String, Error> {
        let digest = self.snapshot();
        sign_content(
            private_key,
            digest.as_slice(),
            Algorithm::HashEdDSA,
            trusted_comment,
            untrusted_comment,
        )
    }

    /// Verify signature text against the digest accumulated so far.
    pub fn verify(&self, public_key: &PublicKey, signature_text: &str) -> Result<bool, Error> {
        let signature = Signature::from_text(signature_text)?;
        Ok(self.verify_parsed(public_key, &signature))
    }

    /// Verify an already-parsed signature against the accumulated digest.
    pub fn verify_parsed(&self, public_key: &PublicKey, signature: &Signature) -> bool {
        let digest = self.snapshot();
        verify_content(public_key, digest.as_slice(), signature)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}
