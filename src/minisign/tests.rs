//! Codec vectors and protocol property tests.
//!
//! The signature-text vectors come from signatures produced by the
//! reference minisign tool, so parsing here stays byte-compatible with it.

use std::io::Read;

use crate::minisign::{
    generate_key, sign, sign_raw, verify, verify_parsed, verify_raw, Algorithm, DigestReader,
    Signature, RAW_HEADER_LEN,
};

/// Key ID of the reference minisign release key used by the vectors below.
const VECTOR_KEY_ID: u64 = 0xe7620f1842b4e81f;

const VECTOR_TEXT: &str = "untrusted comment: signature from minisign secret key
RWQf6LRCGA9i5xRjdmSEFcosL3vwQuQcr4SPMQu8/DE1SWqaQvlDyyNNnBjitvTx/AX0YX8pv5yADnVAnaQkku7LlyGuUu9CSQo=
trusted comment: timestamp:1591521248\tfile:minisign-0.9.tar.gz
lLLNXNmXCk5wk5oRLxjpiI0QJdkdTUBL2TdFsnK8KF0Ggl150wcTxr6gITGIgVD5eaql2Glh5pfQbfTjLnnxDw==";

const VECTOR_SIG_HEX: &str = "146376648415ca2c2f7bf042e41caf848f310bbcfc3135496a9a42f943cb234d\
9c18e2b6f4f1fc05f4617f29bf9c800e75409da42492eecb9721ae52ef42490a";

const VECTOR_COMMENT_SIG_HEX: &str = "94b2cd5cd9970a4e70939a112f18e9888d1025d91d4d404bd93745b2\
72bc285d06825d79d30713c6bea02131888150f979aaa5d86961e697d06df4e32e79f10f";

fn sig64(hex_str: &str) -> [u8; 64] {
    hex::decode(hex_str).unwrap().try_into().unwrap()
}

fn reference_signature() -> Signature {
    Signature {
        algorithm: Algorithm::EdDSA,
        key_id: VECTOR_KEY_ID,
        signature: sig64(VECTOR_SIG_HEX),
        trusted_comment: "timestamp:1591521248\tfile:minisign-0.9.tar.gz".to_string(),
        untrusted_comment: "signature from minisign secret key".to_string(),
        comment_signature: sig64(VECTOR_COMMENT_SIG_HEX),
    }
}

// ---------------------------------------------------------------------------
// Codec vectors
// ---------------------------------------------------------------------------

#[test]
fn test_unmarshal_reference_signature() {
    let parsed = Signature::from_text(VECTOR_TEXT).unwrap();
    assert_eq!(parsed, reference_signature());
    assert_eq!(
        parsed.untrusted_comment,
        "signature from minisign secret key"
    );
}

#[test]
fn test_unmarshal_tolerates_trailing_crlf() {
    let text = format!("{VECTOR_TEXT}\n\r\n");
    let parsed = Signature::from_text(&text).unwrap();
    assert_eq!(parsed, reference_signature());
}

#[test]
fn test_unmarshal_strips_carriage_returns() {
    let text = VECTOR_TEXT.replace('\n', "\r\n");
    let parsed = Signature::from_text(&text).unwrap();
    assert!(!parsed.untrusted_comment.ends_with('\r'));
    assert!(!parsed.trusted_comment.ends_with('\r'));
    assert_eq!(parsed, reference_signature());
}

#[test]
fn test_unmarshal_rejects_malformed_text() {
    let lines: Vec<&str> = VECTOR_TEXT.lines().collect();
    let cases: Vec<(String, &str)> = vec![
        (lines[1..].join("\n"), "missing untrusted comment"),
        (
            format!("untrusted: junk\n{}", lines[1..].join("\n")),
            "wrong untrusted-comment prefix",
        ),
        (
            format!("{}\n{}\n{}", lines[0], lines[2], lines[3]),
            "missing signature value",
        ),
        (
            format!(
                "{}\n31TR+QBxE86BOJz1U46pc1lM1zEvMLBDTE255CHxFFLFcn4qPd3Q77xJTF2Y2IkDNqrTOCaZ43PQjSv9kIrnHXXwW0dwKnj\n{}\n{}",
                lines[0], lines[2], lines[3]
            ),
            "signature value is not base64",
        ),
        (
            format!(
                "{}\nf4IYNY3p6K5CYtfB+dhN6Y+Fi+F6wWI0r+VjLwDE0q23wB1Opso6w/MJd9YGIU/HBs04flXnak37x/s2QhWAZlSCdbQYX7Q=\n{}\n{}",
                lines[0], lines[2], lines[3]
            ),
            "signature value has wrong size",
        ),
        (
            format!("{}\n{}\n{}\n", lines[0], lines[1], lines[3]),
            "missing trusted comment",
        ),
        (
            format!(
                "{}\n{}\ncomment: timestamp:1591521248\tfile:minisign-0.9.tar.gz\n{}",
                lines[0], lines[1], lines[3]
            ),
            "wrong trusted-comment prefix",
        ),
        (
            format!("{}\n{}\n{}", lines[0], lines[1], lines[2]),
            "missing comment signature",
        ),
        (
            format!(
                "{}\n{}\n{}\nBqq219+sDloDkxHiCLcR5sTxrbl+qMS4oEnZ+IrZ4JDH5BxAzKehjoWSch3nbyNT96c/jz+XQjj4zd492skB_w==",
                lines[0], lines[1], lines[2]
            ),
            "comment signature is not base64",
        ),
        (
            format!(
                "{}\n{}\n{}\nnqGtUS55Xhx/VzvCGtWjtsnlcItcsp0hzl/40j3oRkyJAISXHTakVQKK2VBBMyjBfhZTRRlEputvn/dNdC/Dh6Y=",
                lines[0], lines[1], lines[2]
            ),
            "comment signature has wrong size",
        ),
    ];

    for (text, why) in cases {
        assert!(
            Signature::from_text(&text).is_err(),
            "should have rejected input with {why}"
        );
    }
}

#[test]
fn test_marshal_roundtrip() {
    let mut samples = vec![reference_signature()];
    samples.push(Signature {
        algorithm: Algorithm::HashEdDSA,
        ..reference_signature()
    });
    samples.push(Signature {
        untrusted_comment: String::new(),
        trusted_comment: String::new(),
        ..reference_signature()
    });

    for sample in samples {
        let text = sample.to_text();
        let parsed = Signature::from_text(&text).unwrap();
        assert_eq!(parsed, sample);
        assert_eq!(parsed.untrusted_comment, sample.untrusted_comment);
    }
}

#[test]
fn test_equality_ignores_untrusted_comment() {
    let a = reference_signature();
    let mut b = reference_signature();
    b.untrusted_comment = "something else entirely".to_string();
    assert_eq!(a, b);
    assert_eq!(b, a);
}

#[test]
fn test_equality_covers_every_signed_field() {
    let base = reference_signature();

    let mut other = reference_signature();
    other.algorithm = Algorithm::HashEdDSA;
    assert_ne!(base, other);

    let mut other = reference_signature();
    other.key_id = other.key_id.swap_bytes();
    assert_ne!(base, other);

    let mut other = reference_signature();
    other.trusted_comment = "timestamp:1591521249\tfile:minisign-0.9.tar.gz".to_string();
    assert_ne!(base, other);

    let mut other = reference_signature();
    other.signature[0] ^= 0x01;
    assert_ne!(base, other);

    let mut other = reference_signature();
    other.comment_signature[0] ^= 0x01;
    assert_ne!(base, other);
}

#[test]
fn test_trusted_comment_fields() {
    let sig = reference_signature();
    assert_eq!(sig.trusted_comment_field("file"), Some("minisign-0.9.tar.gz"));
    assert_eq!(sig.trusted_comment_field("timestamp"), Some("1591521248"));
    assert_eq!(sig.trusted_comment_field("missing"), None);
}

// ---------------------------------------------------------------------------
// Protocol properties
// ---------------------------------------------------------------------------

#[test]
fn test_sign_verify_roundtrip_both_modes() {
    let (public, private) = generate_key();
    let messages: [&[u8]; 3] = [b"", b"x", b"a longer message body for signing"];

    for prehashed in [false, true] {
        for message in messages {
            let text = sign(&private, message, "tc", "uc", prehashed).unwrap();
            assert!(
                verify(&public, message, &text, prehashed).unwrap(),
                "round-trip failed for prehashed={prehashed}, len={}",
                message.len()
            );
        }
    }
}

#[test]
fn test_algorithm_tag_governs_hashing_not_caller_hint() {
    let (public, private) = generate_key();
    let message = b"streamable artifact bytes";

    // Signed in pre-hashed mode; a caller passing the wrong hint must still
    // get the correct answer because the tag is authoritative.
    let text = sign(&private, message, "tc", "uc", true).unwrap();
    assert!(verify(&public, message, &text, false).unwrap());
    assert!(verify(&public, message, &text, true).unwrap());

    // And the other way around for plain mode.
    let text = sign(&private, message, "tc", "uc", false).unwrap();
    assert!(verify(&public, message, &text, true).unwrap());
}

#[test]
fn test_tampered_message_rejected() {
    let (public, private) = generate_key();
    let text = sign(&private, b"hello", "file:demo.bin", "uc", false).unwrap();
    assert!(verify(&public, b"hello", &text, false).unwrap());
    assert!(!verify(&public, b"hellp", &text, false).unwrap());
}

#[test]
fn test_tampered_signature_bytes_rejected() {
    let (public, private) = generate_key();
    let message = b"payload";
    let text = sign(&private, message, "tc", "uc", false).unwrap();

    let mut sig = Signature::from_text(&text).unwrap();
    sig.signature[17] ^= 0x40;
    assert!(!verify_parsed(&public, message, &sig));

    let mut sig = Signature::from_text(&text).unwrap();
    sig.comment_signature[3] ^= 0x01;
    assert!(!verify_parsed(&public, message, &sig));
}

#[test]
fn test_tampered_trusted_comment_rejected() {
    let (public, private) = generate_key();
    let message = b"payload";
    let text = sign(&private, message, "file:real-name.tar.gz", "uc", false).unwrap();

    let mut sig = Signature::from_text(&text).unwrap();
    sig.trusted_comment = "file:spoofed-name.tar.gz".to_string();
    assert!(!verify_parsed(&public, message, &sig));
}

#[test]
fn test_changed_untrusted_comment_still_verifies() {
    let (public, private) = generate_key();
    let message = b"payload";
    let text = sign(&private, message, "tc", "original untrusted", false).unwrap();

    let mut sig = Signature::from_text(&text).unwrap();
    sig.untrusted_comment = "rewritten in transit".to_string();
    assert!(verify_parsed(&public, message, &sig));
}

#[test]
fn test_wrong_key_always_rejected() {
    for _ in 0..16 {
        let (_, private) = generate_key();
        let (other_public, _) = generate_key();
        let message = b"cross-key verification must fail";
        for prehashed in [false, true] {
            let text = sign(&private, message, "tc", "uc", prehashed).unwrap();
            assert!(!verify(&other_public, message, &text, prehashed).unwrap());
        }
    }
}

#[test]
fn test_raw_signature_roundtrip() {
    let (public, private) = generate_key();
    let message = b"embedded payload";

    for prehashed in [false, true] {
        let header = sign_raw(&private, message, prehashed).unwrap();
        let mut raw = Vec::with_capacity(header.len() + message.len());
        raw.extend_from_slice(&header);
        raw.extend_from_slice(message);
        assert!(verify_raw(&public, &raw));

        let (other_public, _) = generate_key();
        assert!(!verify_raw(&other_public, &raw));

        let mut tampered = raw.clone();
        *tampered.last_mut().unwrap() ^= 0x01;
        assert!(!verify_raw(&public, &tampered));
    }
}

#[test]
fn test_raw_signature_short_buffers_rejected() {
    let (public, private) = generate_key();
    let header = sign_raw(&private, b"message", false).unwrap();

    assert!(!verify_raw(&public, b""));
    assert!(!verify_raw(&public, &header[..10]));
    // Header alone, without a single message byte, is not verifiable.
    assert!(!verify_raw(&public, &header));
    assert_eq!(header.len(), RAW_HEADER_LEN);
}

#[test]
fn test_digest_reader_verifies_stream() {
    let (public, private) = generate_key();
    let payload = vec![0xA5u8; 1 << 16];

    let mut reader = DigestReader::new(payload.as_slice());
    let mut consumed = Vec::new();
    reader.read_to_end(&mut consumed).unwrap();
    assert_eq!(consumed, payload);

    let text = reader.sign(&private, "file:blob.bin", "uc").unwrap();
    assert!(reader.verify(&public, &text).unwrap());

    // The same signature must agree with the one-shot pre-hashed path.
    assert!(verify(&public, &payload, &text, true).unwrap());
}

#[test]
fn test_digest_reader_snapshots_prefixes() {
    let (public, private) = generate_key();
    let payload = b"first half|second half";

    let mut reader = DigestReader::new(payload.as_slice());
    let mut buf = [0u8; 11];
    reader.read_exact(&mut buf).unwrap();
    let prefix_sig = reader.sign(&private, "tc", "uc").unwrap();

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    let full_sig = reader.sign(&private, "tc", "uc").unwrap();

    assert!(verify(&public, &payload[..11], &prefix_sig, true).unwrap());
    assert!(verify(&public, payload, &full_sig, true).unwrap());
    assert!(!verify(&public, payload, &prefix_sig, true).unwrap());
}
