// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Test utility functions
//!
//! Fixtures shared by the unit tests: a mock HTTP site, throwaway
//! signing keys, and synthetic signed packages.

use openpgp::cert::prelude::*;
use openpgp::cert::CipherSuite;
use openpgp::packet::signature::SignatureBuilder;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::SerializeInto;
use openpgp::types::SignatureType;
use openpgp::Packet;
use openssl::hash::{hash, MessageDigest};
use rpm_header::{lead_bytes, signature_padding, tags, HeaderBuilder};
use sequoia_openpgp as openpgp;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A wiremock server driven from its own runtime, so that the blocking
/// HTTP client can be used from the test thread.
pub(crate) struct MockSite {
    // Dropped before the runtime
    server: MockServer,
    rt: tokio::runtime::Runtime,
}

impl MockSite {
    pub(crate) fn new() -> Self {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    pub(crate) fn url(&self, p: &str) -> String {
        format!("{}{}", self.server.uri(), p)
    }

    fn respond(&self, p: &str, template: ResponseTemplate) {
        self.rt.block_on(
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(template)
                .mount(&self.server),
        );
    }

    pub(crate) fn serve(&self, p: &str, body: Vec<u8>) {
        self.respond(p, ResponseTemplate::new(200).set_body_bytes(body));
    }

    pub(crate) fn serve_delayed(&self, p: &str, body: Vec<u8>, delay: Duration) {
        self.respond(
            p,
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .set_delay(delay),
        );
    }

    pub(crate) fn fail(&self, p: &str, status: u16) {
        self.respond(p, ResponseTemplate::new(status));
    }

    /// Number of requests received for the given path.
    pub(crate) fn hits(&self, p: &str) -> usize {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == p)
            .count()
    }
}

/// Serve a single request whose response announces `claimed_len` bytes of
/// body but closes the connection after sending `body`.  Returns the URL.
pub(crate) fn serve_cut_off(body: Vec<u8>, claimed_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept");
        // Read the request head
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match conn.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let _ = write!(
            conn,
            "HTTP/1.1 200 OK\r\nContent-Length: {claimed_len}\r\nConnection: close\r\n\r\n"
        );
        let _ = conn.write_all(&body);
        let _ = conn.flush();
        let _ = conn.shutdown(Shutdown::Both);
    });
    format!("http://{addr}/pkg.rpm")
}

/// A generated certificate with a signing subkey.
pub(crate) struct TestSigner {
    cert: Cert,
}

impl TestSigner {
    pub(crate) fn new(userid: &str) -> Self {
        let (cert, _revocation) = CertBuilder::new()
            .set_cipher_suite(CipherSuite::RSA2k)
            .add_userid(userid)
            .add_signing_subkey()
            .generate()
            .expect("generating certificate");
        Self { cert }
    }

    pub(crate) fn cert(&self) -> &Cert {
        &self.cert
    }

    /// Primary key fingerprint.
    pub(crate) fn fingerprint(&self) -> String {
        self.cert.fingerprint().to_hex()
    }

    pub(crate) fn signing_fingerprint(&self) -> String {
        let policy = StandardPolicy::new();
        self.cert
            .keys()
            .with_policy(&policy, None)
            .for_signing()
            .next()
            .expect("signing key")
            .key()
            .fingerprint()
            .to_hex()
    }

    /// The public certificate, ASCII armored.
    pub(crate) fn armored_public(&self) -> Vec<u8> {
        self.cert.armored().to_vec().expect("armoring certificate")
    }

    /// A binary detached signature packet over `data`.
    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        let policy = StandardPolicy::new();
        let mut keypair = self
            .cert
            .keys()
            .with_policy(&policy, None)
            .secret()
            .for_signing()
            .next()
            .expect("signing key")
            .key()
            .clone()
            .into_keypair()
            .expect("keypair");
        let sig = SignatureBuilder::new(SignatureType::Binary)
            .sign_message(&mut keypair, data)
            .expect("signing");
        Packet::from(sig).to_vec().expect("serializing signature")
    }
}

/// Builds a synthetic binary RPM: lead, signature header, main header
/// and an opaque payload.
pub(crate) struct RpmBuilder<'a> {
    name: String,
    payload: Vec<u8>,
    signer: Option<&'a TestSigner>,
    legacy_signature: bool,
    md5: bool,
    raw_signature: Option<Vec<u8>>,
}

impl<'a> RpmBuilder<'a> {
    pub(crate) const DEFAULT_PAYLOAD: &'static [u8] = b"\xfd7zXZ\x00 not really a compressed cpio archive";

    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: Self::DEFAULT_PAYLOAD.to_vec(),
            signer: None,
            legacy_signature: false,
            md5: true,
            raw_signature: None,
        }
    }

    pub(crate) fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Add a header-only RSA signature (as done by current rpmsign).
    pub(crate) fn signed_by(mut self, signer: &'a TestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Also add a header+payload signature (as done by old rpmsign).
    pub(crate) fn legacy_signature(mut self) -> Self {
        self.legacy_signature = true;
        self
    }

    pub(crate) fn without_md5(mut self) -> Self {
        self.md5 = false;
        self
    }

    /// Store arbitrary bytes as the header signature.
    pub(crate) fn raw_signature(mut self, sig: &[u8]) -> Self {
        self.raw_signature = Some(sig.to_vec());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let payload_sha256 = hex::encode(openssl::sha::sha256(&self.payload));
        let hdr = HeaderBuilder::new()
            .string(tags::NAME, &self.name)
            .string(tags::VERSION, "1.0")
            .string(tags::RELEASE, "1")
            .string(tags::ARCH, "x86_64")
            .string_array(tags::PAYLOADDIGEST, &[payload_sha256.as_str()])
            .int32(tags::PAYLOADDIGESTALGO, &[tags::hashalgo::SHA256])
            .build();
        let mut signed = hdr.clone();
        signed.extend_from_slice(&self.payload);

        let mut sig = HeaderBuilder::new()
            .string(tags::SIG_SHA1, &hex::encode(openssl::sha::sha1(&hdr)))
            .string(tags::SIG_SHA256, &hex::encode(openssl::sha::sha256(&hdr)))
            .int32(tags::SIG_SIZE, &[signed.len() as u32]);
        if self.md5 {
            let md5 = hash(MessageDigest::md5(), &signed).expect("md5");
            sig = sig.bin(tags::SIG_MD5, &md5);
        }
        if let Some(raw) = self.raw_signature.as_deref() {
            sig = sig.bin(tags::SIG_RSA, raw);
        } else if let Some(signer) = self.signer {
            sig = sig.bin(tags::SIG_RSA, &signer.sign(&hdr));
            if self.legacy_signature {
                sig = sig.bin(tags::SIG_PGP, &signer.sign(&signed));
            }
        }
        let sig = sig.build();

        let mut out = lead_bytes(&format!("{}-1.0-1", self.name));
        out.extend_from_slice(&sig);
        out.resize(out.len() + signature_padding(sig.len()), 0);
        out.extend_from_slice(&signed);
        out
    }
}
