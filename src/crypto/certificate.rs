//! Local certificates and peer certificate verification.

use std::fmt;
use std::time::SystemTime;

use der::{Decode, Encode};
use spki::ObjectIdentifier;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::Certificate as X509Certificate;

use super::signing::{verify_signature, PrivateKey};
use crate::message::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};
use crate::Error;

const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_ECDSA_WITH_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");

/// A certificate chain (leaf first) with the private key of the leaf.
#[derive(Clone)]
pub struct CertifiedKey {
    pub certificate: Vec<Vec<u8>>,
    pub private_key: PrivateKey,
}

impl CertifiedKey {
    pub fn new(certificate: Vec<Vec<u8>>, private_key: PrivateKey) -> Self {
        CertifiedKey {
            certificate,
            private_key,
        }
    }

    /// Single DER certificate and a DER private key.
    pub fn from_der(certificate: Vec<u8>, private_key: &[u8]) -> Result<Self, Error> {
        Ok(CertifiedKey {
            certificate: vec![certificate],
            private_key: PrivateKey::from_der(private_key)?,
        })
    }
}

impl fmt::Debug for CertifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKey")
            .field("chain_len", &self.certificate.len())
            .field("private_key", &self.private_key)
            .finish()
    }
}

/// Decides whether a peer's certificate chain is trusted.
///
/// Both methods return the verified chains, each running from the leaf to a
/// trust anchor.
pub trait CertificateVerifier: Send + Sync + fmt::Debug {
    fn verify_client_cert(&self, chain: &[Vec<u8>]) -> Result<Vec<Vec<Vec<u8>>>, Error>;

    fn verify_server_cert(
        &self,
        chain: &[Vec<u8>],
        server_name: &str,
    ) -> Result<Vec<Vec<Vec<u8>>>, Error>;
}

/// Verifies chains against a fixed set of DER root certificates.
#[derive(Debug, Clone, Default)]
pub struct RootStoreVerifier {
    roots: Vec<Vec<u8>>,
}

impl RootStoreVerifier {
    pub fn new(roots: Vec<Vec<u8>>) -> Self {
        RootStoreVerifier { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn verify_chain(&self, chain: &[Vec<u8>], now: SystemTime) -> Result<Vec<Vec<u8>>, Error> {
        let leaf_der = chain
            .first()
            .ok_or_else(|| Error::CertificateVerification("Empty certificate chain".into()))?;

        let mut verified = vec![leaf_der.clone()];
        let mut current = parse(leaf_der)?;
        check_validity(&current, now)?;

        // Every step either ends at a root or consumes one intermediate.
        for _ in 0..chain.len() {
            let current_der = verified.last().cloned().unwrap_or_default();

            if self.roots.iter().any(|r| *r == current_der) {
                return Ok(verified);
            }

            for root_der in &self.roots {
                let root = parse(root_der)?;
                if root.tbs_certificate.subject == current.tbs_certificate.issuer
                    && verify_issued_by(&current, root_der).is_ok()
                {
                    check_validity(&root, now)?;
                    verified.push(root_der.clone());
                    return Ok(verified);
                }
            }

            let issuer = chain[1..].iter().find_map(|der| {
                let cert = parse(der).ok()?;
                let is_issuer = cert.tbs_certificate.subject == current.tbs_certificate.issuer
                    && !verified.contains(der)
                    && verify_issued_by(&current, der).is_ok();
                is_issuer.then(|| (der.clone(), cert))
            });

            let Some((issuer_der, issuer)) = issuer else {
                break;
            };
            check_validity(&issuer, now)?;
            verified.push(issuer_der);
            current = issuer;
        }

        Err(Error::CertificateVerification(
            "Certificate is not signed by a trusted root".to_string(),
        ))
    }
}

impl CertificateVerifier for RootStoreVerifier {
    fn verify_client_cert(&self, chain: &[Vec<u8>]) -> Result<Vec<Vec<Vec<u8>>>, Error> {
        let verified = self.verify_chain(chain, SystemTime::now())?;
        Ok(vec![verified])
    }

    fn verify_server_cert(
        &self,
        chain: &[Vec<u8>],
        server_name: &str,
    ) -> Result<Vec<Vec<Vec<u8>>>, Error> {
        let verified = self.verify_chain(chain, SystemTime::now())?;
        if !server_name.is_empty() {
            let leaf = parse(&chain[0])?;
            verify_host_name(&leaf, server_name)?;
        }
        Ok(vec![verified])
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate, Error> {
    X509Certificate::from_der(der)
        .map_err(|e| Error::CertificateVerification(format!("Failed to parse certificate: {e}")))
}

fn check_validity(cert: &X509Certificate, now: SystemTime) -> Result<(), Error> {
    let validity = &cert.tbs_certificate.validity;
    if now < validity.not_before.to_system_time() {
        return Err(Error::CertificateVerification(
            "Certificate is not yet valid".to_string(),
        ));
    }
    if now > validity.not_after.to_system_time() {
        return Err(Error::CertificateVerification(
            "Certificate has expired".to_string(),
        ));
    }
    Ok(())
}

fn signature_scheme(oid: ObjectIdentifier) -> Option<SignatureAndHashAlgorithm> {
    let (hash, signature) = if oid == OID_ECDSA_WITH_SHA256 {
        (HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA)
    } else if oid == OID_ECDSA_WITH_SHA384 {
        (HashAlgorithm::SHA384, SignatureAlgorithm::ECDSA)
    } else if oid == OID_SHA256_WITH_RSA {
        (HashAlgorithm::SHA256, SignatureAlgorithm::RSA)
    } else if oid == OID_SHA384_WITH_RSA {
        (HashAlgorithm::SHA384, SignatureAlgorithm::RSA)
    } else {
        return None;
    };
    Some(SignatureAndHashAlgorithm::new(hash, signature))
}

fn verify_issued_by(cert: &X509Certificate, issuer_der: &[u8]) -> Result<(), Error> {
    let scheme = signature_scheme(cert.signature_algorithm.oid).ok_or_else(|| {
        Error::CertificateVerification(format!(
            "Unsupported certificate signature algorithm: {}",
            cert.signature_algorithm.oid
        ))
    })?;

    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::CertificateVerification(e.to_string()))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::CertificateVerification("Invalid signature bitstring".into()))?;

    verify_signature(issuer_der, &tbs, signature, scheme)
}

fn verify_host_name(cert: &X509Certificate, server_name: &str) -> Result<(), Error> {
    let extensions = cert.tbs_certificate.extensions.as_deref().unwrap_or_default();

    for ext in extensions.iter().filter(|e| e.extn_id == OID_SUBJECT_ALT_NAME) {
        let san = SubjectAltName::from_der(ext.extn_value.as_bytes())
            .map_err(|e| Error::CertificateVerification(e.to_string()))?;

        for name in san.0.iter() {
            if let GeneralName::DnsName(dns) = name {
                if host_matches(&dns.to_string(), server_name) {
                    return Ok(());
                }
            }
        }
    }

    Err(Error::CertificateVerification(format!(
        "Certificate is not valid for {}",
        server_name
    )))
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let host = host.trim_end_matches('.');

    if let Some(suffix) = pattern.strip_prefix("*.") {
        // Wildcard covers exactly one label.
        return match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        };
    }

    pattern.eq_ignore_ascii_case(host)
}
