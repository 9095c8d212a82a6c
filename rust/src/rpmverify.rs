//! Validate the embedded GPG signatures and digests of an RPM in a single
//! pass over the package stream.
//!
//! Structural checks (header digests, sizes, payload digests, parseable
//! signature packets) are always performed.  Signatures are only checked
//! for authenticity when the keyring is non-empty; with an empty keyring
//! a package signed by anyone, or by no one, passes.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::keyring::TrustSet;
use anyhow::anyhow;
use openpgp::packet::Signature;
use openpgp::parse::Parse;
use openpgp::{Packet, PacketPile};
use openssl::hash::{Hasher, MessageDigest};
use rpm_header::tags::{self, hashalgo};
use rpm_header::{Header, HeaderError, Lead};
use sequoia_openpgp as openpgp;
use std::io::{self, Read};

const BUFSIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PackageCheckError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Crypto(#[from] openssl::error::ErrorStack),
    #[error("{what} digest mismatch: expected {expected}, got {actual}")]
    Digest {
        what: &'static str,
        expected: String,
        actual: String,
    },
    #[error("size mismatch: signature header claims {expected} bytes, got {actual}")]
    Size { expected: u64, actual: u64 },
    #[error("unsupported payload digest algorithm {0}")]
    UnsupportedDigestAlgo(u64),
    #[error("malformed OpenPGP signature in tag {tag}")]
    MalformedSignature {
        tag: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("package is not signed")]
    NotSigned,
    #[error("signature in tag {tag} by {issuers} does not verify against any trusted key")]
    UntrustedSignature { tag: u32, issuers: String },
}

impl PackageCheckError {
    /// The stream ended before the package structure did.
    pub fn is_truncated(&self) -> bool {
        let e = match self {
            PackageCheckError::Io(e) => e,
            PackageCheckError::Header(HeaderError::Io(e)) => e,
            _ => return false,
        };
        e.kind() == io::ErrorKind::UnexpectedEof
    }
}

/// What a signature tag covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coverage {
    Header,
    HeaderAndPayload,
}

const SIGNATURE_TAGS: &[(u32, Coverage)] = &[
    (tags::SIG_RSA, Coverage::Header),
    (tags::SIG_DSA, Coverage::Header),
    (tags::SIG_PGP, Coverage::HeaderAndPayload),
    (tags::SIG_GPG, Coverage::HeaderAndPayload),
];

/// A package which passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRpm {
    pub nevra: String,
    pub payload_size: u64,
    /// Fingerprints of the keys that made each signature; empty when the
    /// keyring was empty.
    pub signers: Vec<String>,
}

fn parse_signature(data: &[u8]) -> anyhow::Result<Signature> {
    PacketPile::from_bytes(data)?
        .into_children()
        .find_map(|p| match p {
            Packet::Signature(s) => Some(s),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No signature packet found"))
}

fn compare_digest(
    what: &'static str,
    expected: &str,
    actual: String,
) -> Result<(), PackageCheckError> {
    if expected.eq_ignore_ascii_case(&actual) {
        Ok(())
    } else {
        Err(PackageCheckError::Digest {
            what,
            expected: expected.to_string(),
            actual,
        })
    }
}

fn check_header_digests(sighdr: &Header, hdr: &Header) -> Result<(), PackageCheckError> {
    if let Some(expected) = sighdr.string(tags::SIG_SHA256)? {
        let actual = hex::encode(openssl::sha::sha256(hdr.raw()));
        compare_digest("header SHA256", expected, actual)?;
    }
    if let Some(expected) = sighdr.string(tags::SIG_SHA1)? {
        let actual = hex::encode(openssl::sha::sha1(hdr.raw()));
        compare_digest("header SHA1", expected, actual)?;
    }
    Ok(())
}

/// Hasher and expected value for the payload digest recorded in the main header.
fn payload_digest(hdr: &Header) -> Result<Option<(Hasher, String)>, PackageCheckError> {
    let expected = match hdr.first_string(tags::PAYLOADDIGEST)? {
        Some(v) => v.to_string(),
        None => return Ok(None),
    };
    // librpm defaults to MD5 when the algorithm is not recorded.
    let algo = hdr
        .first_int(tags::PAYLOADDIGESTALGO)?
        .unwrap_or(hashalgo::MD5 as u64);
    let md = match u32::try_from(algo) {
        Ok(hashalgo::MD5) => MessageDigest::md5(),
        Ok(hashalgo::SHA1) => MessageDigest::sha1(),
        Ok(hashalgo::SHA224) => MessageDigest::sha224(),
        Ok(hashalgo::SHA256) => MessageDigest::sha256(),
        Ok(hashalgo::SHA384) => MessageDigest::sha384(),
        Ok(hashalgo::SHA512) => MessageDigest::sha512(),
        _ => return Err(PackageCheckError::UnsupportedDigestAlgo(algo)),
    };
    Ok(Some((Hasher::new(md)?, expected)))
}

/// Read a complete package from `src`, validating its structure, digests
/// and (when `trust` is non-empty) signatures.  The stream is consumed
/// up to its end.
pub fn check_package<R: Read>(mut src: R, trust: &TrustSet) -> Result<VerifiedRpm, PackageCheckError> {
    let lead = Lead::read_from(&mut src)?;
    let sighdr = Header::read_signature(&mut src)?;
    let hdr = Header::read_from(&mut src)?;
    let nevra = hdr.nevra()?;
    tracing::debug!("Read headers of {} (lead name {})", nevra, lead.name());

    let mut signatures = Vec::new();
    for &(tag, coverage) in SIGNATURE_TAGS {
        if let Some(data) = sighdr.bin(tag)? {
            let sig = parse_signature(data)
                .map_err(|source| PackageCheckError::MalformedSignature { tag, source })?;
            signatures.push((tag, coverage, sig));
        }
    }
    let authenticate = !trust.is_empty();
    if authenticate && signatures.is_empty() {
        return Err(PackageCheckError::NotSigned);
    }

    // Legacy signatures cover the payload too, so we need to keep it around.
    let keep_payload = authenticate
        && signatures
            .iter()
            .any(|(_, c, _)| *c == Coverage::HeaderAndPayload);
    let mut signed_data = keep_payload.then(|| hdr.raw().to_vec());
    let mut md5 = match sighdr.bin(tags::SIG_MD5)? {
        Some(expected) => {
            let mut h = Hasher::new(MessageDigest::md5())?;
            h.update(hdr.raw())?;
            Some((h, hex::encode(expected)))
        }
        None => None,
    };
    let mut payload = payload_digest(&hdr)?;

    let mut payload_size = 0u64;
    let mut buf = vec![0u8; BUFSIZE];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let chunk = &buf[..n];
        if let Some((h, _)) = md5.as_mut() {
            h.update(chunk)?;
        }
        if let Some((h, _)) = payload.as_mut() {
            h.update(chunk)?;
        }
        if let Some(d) = signed_data.as_mut() {
            d.extend_from_slice(chunk);
        }
        payload_size += n as u64;
    }

    check_header_digests(&sighdr, &hdr)?;
    let claimed_size = match sighdr.first_int(tags::SIG_LONGSIZE)? {
        Some(v) => Some(v),
        None => sighdr.first_int(tags::SIG_SIZE)?,
    };
    if let Some(expected) = claimed_size {
        let actual = hdr.raw().len() as u64 + payload_size;
        if expected != actual {
            return Err(PackageCheckError::Size { expected, actual });
        }
    }
    if let Some((mut h, expected)) = md5 {
        compare_digest("MD5", &expected, hex::encode(&*h.finish()?))?;
    }
    if let Some((mut h, expected)) = payload {
        compare_digest("payload", &expected, hex::encode(&*h.finish()?))?;
    }

    let mut signers = Vec::new();
    if authenticate {
        for (tag, coverage, sig) in &signatures {
            let data = match coverage {
                Coverage::Header => hdr.raw(),
                Coverage::HeaderAndPayload => signed_data.as_deref().unwrap_or(&[]),
            };
            match trust.verify(sig, data) {
                Some(fpr) => {
                    tracing::debug!("{}: tag {} signed by {}", nevra, tag, fpr);
                    signers.push(fpr);
                }
                None => {
                    let issuers: Vec<String> =
                        sig.get_issuers().iter().map(|h| h.to_string()).collect();
                    let issuers = if issuers.is_empty() {
                        "unknown issuer".to_string()
                    } else {
                        issuers.join(", ")
                    };
                    return Err(PackageCheckError::UntrustedSignature { tag: *tag, issuers });
                }
            }
        }
    }

    Ok(VerifiedRpm {
        nevra,
        payload_size,
        signers,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::{RpmBuilder, TestSigner};

    fn trust(signers: &[&TestSigner]) -> TrustSet {
        TrustSet::new(signers.iter().map(|s| s.cert().clone()).collect())
    }

    #[test]
    fn test_signed_header() {
        let signer = TestSigner::new("packager@example.org");
        let pkg = RpmBuilder::new("foo").signed_by(&signer).build();
        let r = check_package(pkg.as_slice(), &trust(&[&signer])).unwrap();
        assert_eq!(r.nevra, "foo-1.0-1.x86_64");
        assert_eq!(r.signers, vec![signer.signing_fingerprint()]);
        assert_eq!(r.payload_size, RpmBuilder::DEFAULT_PAYLOAD.len() as u64);
    }

    #[test]
    fn test_legacy_signature() {
        let signer = TestSigner::new("packager@example.org");
        let pkg = RpmBuilder::new("foo")
            .signed_by(&signer)
            .legacy_signature()
            .build();
        let r = check_package(pkg.as_slice(), &trust(&[&signer])).unwrap();
        assert_eq!(r.signers.len(), 2);
    }

    #[test]
    fn test_untrusted_signer() {
        let signer = TestSigner::new("packager@example.org");
        let other = TestSigner::new("other@example.org");
        let pkg = RpmBuilder::new("foo").signed_by(&signer).build();
        // The keyring may hold any number of unrelated keys.
        let e = check_package(pkg.as_slice(), &trust(&[&other])).unwrap_err();
        assert!(
            matches!(e, PackageCheckError::UntrustedSignature { tag: tags::SIG_RSA, .. }),
            "{:?}",
            e
        );
        let r = check_package(pkg.as_slice(), &trust(&[&other, &signer])).unwrap();
        assert_eq!(r.signers, vec![signer.signing_fingerprint()]);
    }

    #[test]
    fn test_unsigned() {
        let signer = TestSigner::new("packager@example.org");
        let pkg = RpmBuilder::new("foo").build();
        assert!(matches!(
            check_package(pkg.as_slice(), &trust(&[&signer])),
            Err(PackageCheckError::NotSigned)
        ));
    }

    #[test]
    fn test_empty_keyring_is_structural_only() {
        let stranger = TestSigner::new("stranger@example.org");
        let unsigned = RpmBuilder::new("foo").build();
        let r = check_package(unsigned.as_slice(), &TrustSet::default()).unwrap();
        assert!(r.signers.is_empty());
        let signed = RpmBuilder::new("foo").signed_by(&stranger).build();
        assert!(check_package(signed.as_slice(), &TrustSet::default()).is_ok());
        // ...but corruption is still detected
        let mut corrupt = signed;
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;
        assert!(matches!(
            check_package(corrupt.as_slice(), &TrustSet::default()),
            Err(PackageCheckError::Digest { what: "MD5", .. })
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let signer = TestSigner::new("packager@example.org");
        let mut pkg = RpmBuilder::new("foo").signed_by(&signer).build();
        let last = pkg.len() - 1;
        pkg[last] ^= 0xff;
        let e = check_package(pkg.as_slice(), &trust(&[&signer])).unwrap_err();
        assert!(matches!(e, PackageCheckError::Digest { .. }), "{:?}", e);
    }

    #[test]
    fn test_payload_digest_without_md5() {
        let pkg = RpmBuilder::new("foo")
            .without_md5()
            .payload(b"other payload")
            .build();
        check_package(pkg.as_slice(), &TrustSet::default()).unwrap();
        let mut tampered = pkg;
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(matches!(
            check_package(tampered.as_slice(), &TrustSet::default()),
            Err(PackageCheckError::Digest { what: "payload", .. })
        ));
    }

    #[test]
    fn test_extra_trailing_data() {
        let mut pkg = RpmBuilder::new("foo").build();
        pkg.extend_from_slice(b"junk");
        assert!(matches!(
            check_package(pkg.as_slice(), &TrustSet::default()),
            Err(PackageCheckError::Size { .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let pkg = RpmBuilder::new("foo").build();
        let e = check_package(&pkg[..200], &TrustSet::default()).unwrap_err();
        assert!(e.is_truncated(), "{:?}", e);
    }

    #[test]
    fn test_not_an_rpm() {
        let e = check_package(&[0u8; 512][..], &TrustSet::default()).unwrap_err();
        assert!(matches!(e, PackageCheckError::Header(HeaderError::BadLeadMagic)));
        assert!(!e.is_truncated());
    }

    #[test]
    fn test_malformed_signature() {
        let pkg = RpmBuilder::new("foo").raw_signature(b"\x89\x00garbage").build();
        assert!(matches!(
            check_package(pkg.as_slice(), &TrustSet::default()),
            Err(PackageCheckError::MalformedSignature { tag: tags::SIG_RSA, .. })
        ));
    }
}
