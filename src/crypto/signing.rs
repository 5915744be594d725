//! Private keys, handshake signatures and their verification.

use std::fmt;

use der::Decode;
use pkcs8::DecodePrivateKey;
use rand::{CryptoRng, RngCore};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use super::hash::digest;
use super::NamedCurve;
use crate::message::{
    ClientCertificateType, CurveType, HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm,
};
use crate::Error;

const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// A private key able to produce handshake signatures.
#[derive(Clone)]
pub enum PrivateKey {
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::EcdsaP256(_) => f.debug_tuple("PrivateKey::EcdsaP256").finish(),
            PrivateKey::EcdsaP384(_) => f.debug_tuple("PrivateKey::EcdsaP384").finish(),
            PrivateKey::Rsa(_) => f.debug_tuple("PrivateKey::Rsa").finish(),
        }
    }
}

impl PrivateKey {
    /// Load a DER private key. PKCS#8 is tried first, then SEC1 (EC) and PKCS#1 (RSA).
    pub fn from_der(key_der: &[u8]) -> Result<Self, Error> {
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::EcdsaP256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::EcdsaP384(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::Rsa(Box::new(key)));
        }
        if let Ok(secret) = p256::SecretKey::from_sec1_der(key_der) {
            return Ok(PrivateKey::EcdsaP256(secret.into()));
        }
        if let Ok(secret) = p384::SecretKey::from_sec1_der(key_der) {
            return Ok(PrivateKey::EcdsaP384(secret.into()));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(key_der) {
            return Ok(PrivateKey::Rsa(Box::new(key)));
        }

        Err(Error::InvalidPrivateKey(
            "Failed to parse private key in any supported format".to_string(),
        ))
    }

    /// Load a PEM encoded PKCS#8 private key.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let (_label, doc) = pkcs8::SecretDocument::from_pem(pem)
            .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
        Self::from_der(doc.as_bytes())
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::EcdsaP256(_) | PrivateKey::EcdsaP384(_) => SignatureAlgorithm::ECDSA,
            PrivateKey::Rsa(_) => SignatureAlgorithm::RSA,
        }
    }

    pub fn certificate_type(&self) -> ClientCertificateType {
        match self {
            PrivateKey::EcdsaP256(_) | PrivateKey::EcdsaP384(_) => {
                ClientCertificateType::ECDSA_SIGN
            }
            PrivateKey::Rsa(_) => ClientCertificateType::RSA_SIGN,
        }
    }

    /// Sign `data` hashed with `hash`. ECDSA signatures are DER encoded.
    pub fn sign<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        hash: HashAlgorithm,
        rng: &mut R,
    ) -> Result<Vec<u8>, Error> {
        match self {
            PrivateKey::EcdsaP256(key) => {
                let prehash = digest(hash, data)?;
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash(&prehash)
                    .map_err(|_| Error::Crypto("ECDSA signing failed".to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            PrivateKey::EcdsaP384(key) => {
                let prehash = digest(hash, data)?;
                let signature: p384::ecdsa::Signature = key
                    .sign_prehash(&prehash)
                    .map_err(|_| Error::Crypto("ECDSA signing failed".to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            PrivateKey::Rsa(key) => match hash {
                HashAlgorithm::SHA256 => {
                    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new((**key).clone());
                    Ok(signing_key.sign_with_rng(rng, data).to_vec())
                }
                HashAlgorithm::SHA384 => {
                    let signing_key = rsa::pkcs1v15::SigningKey::<Sha384>::new((**key).clone());
                    Ok(signing_key.sign_with_rng(rng, data).to_vec())
                }
                HashAlgorithm::Unknown(_) => Err(Error::Crypto(format!(
                    "Unsupported hash algorithm for RSA: {:?}",
                    hash
                ))),
            },
        }
    }
}

/// The first of `schemes` our key can sign with.
pub fn select_signature_scheme(
    schemes: &[SignatureAndHashAlgorithm],
    private_key: &PrivateKey,
) -> Result<SignatureAndHashAlgorithm, Error> {
    schemes
        .iter()
        .find(|s| {
            s.signature == private_key.signature_algorithm()
                && matches!(s.hash, HashAlgorithm::SHA256 | HashAlgorithm::SHA384)
        })
        .copied()
        .ok_or(Error::NoAvailableSignatureSchemes)
}

/// Verify `signature` over `data` with the public key of the DER certificate.
pub fn verify_signature(
    cert_der: &[u8],
    data: &[u8],
    signature: &[u8],
    scheme: SignatureAndHashAlgorithm,
) -> Result<(), Error> {
    let cert = X509Certificate::from_der(cert_der)
        .map_err(|e| Error::CertificateVerification(format!("Failed to parse certificate: {e}")))?;
    let spki = &cert.tbs_certificate.subject_public_key_info;

    let pubkey_bytes = spki.subject_public_key.as_bytes().ok_or_else(|| {
        Error::SignatureVerification("Invalid subject_public_key bitstring".to_string())
    })?;

    let key_oid = spki.algorithm.oid;

    if key_oid == OID_EC_PUBLIC_KEY && scheme.signature == SignatureAlgorithm::ECDSA {
        let curve_oid: ObjectIdentifier = spki
            .algorithm
            .parameters
            .as_ref()
            .ok_or_else(|| Error::SignatureVerification("Missing EC curve parameter".to_string()))?
            .decode_as()
            .map_err(|_| Error::SignatureVerification("Invalid EC curve parameter".into()))?;

        let prehash = digest(scheme.hash, data)?;
        return verify_ecdsa_prehash(curve_oid, pubkey_bytes, &prehash, signature);
    }

    if key_oid == OID_RSA_ENCRYPTION && scheme.signature == SignatureAlgorithm::RSA {
        let public_key = RsaPublicKey::from_pkcs1_der(pubkey_bytes)
            .map_err(|_| Error::SignatureVerification("Invalid RSA public key".into()))?;
        return verify_rsa(public_key, data, signature, scheme.hash);
    }

    Err(Error::SignatureVerification(format!(
        "Key {} cannot verify {:?} signatures",
        key_oid, scheme.signature
    )))
}

fn verify_ecdsa_prehash(
    curve_oid: ObjectIdentifier,
    pubkey_bytes: &[u8],
    prehash: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let failed = || Error::SignatureVerification("ECDSA signature mismatch".to_string());
    let invalid_der = || Error::SignatureVerification("Invalid signature format".to_string());

    if curve_oid == OID_P256 {
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(pubkey_bytes)
            .map_err(|_| Error::SignatureVerification("Invalid P-256 public key".into()))?;
        let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| invalid_der())?;
        key.verify_prehash(prehash, &sig).map_err(|_| failed())
    } else if curve_oid == OID_P384 {
        let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(pubkey_bytes)
            .map_err(|_| Error::SignatureVerification("Invalid P-384 public key".into()))?;
        let sig = p384::ecdsa::Signature::from_der(signature).map_err(|_| invalid_der())?;
        key.verify_prehash(prehash, &sig).map_err(|_| failed())
    } else {
        Err(Error::SignatureVerification(format!(
            "Unsupported EC curve: {}",
            curve_oid
        )))
    }
}

fn verify_rsa(
    public_key: RsaPublicKey,
    data: &[u8],
    signature: &[u8],
    hash: HashAlgorithm,
) -> Result<(), Error> {
    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|_| Error::SignatureVerification("Invalid RSA signature".to_string()))?;
    let failed = |_| Error::SignatureVerification("RSA signature mismatch".to_string());

    match hash {
        HashAlgorithm::SHA256 => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key)
            .verify(data, &signature)
            .map_err(failed),
        HashAlgorithm::SHA384 => rsa::pkcs1v15::VerifyingKey::<Sha384>::new(public_key)
            .verify(data, &signature)
            .map_err(failed),
        HashAlgorithm::Unknown(_) => Err(Error::SignatureVerification(format!(
            "Unsupported hash algorithm for RSA: {:?}",
            hash
        ))),
    }
}

/// The ServerKeyExchange parameters as covered by the signature.
pub fn value_key_message(
    client_random: &[u8],
    server_random: &[u8],
    public_key: &[u8],
    named_curve: NamedCurve,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(client_random.len() + server_random.len() + 4 + public_key.len());
    out.extend_from_slice(client_random);
    out.extend_from_slice(server_random);
    out.push(CurveType::NamedCurve.as_u8());
    out.extend_from_slice(&named_curve.as_u16().to_be_bytes());
    out.push(public_key.len() as u8);
    out.extend_from_slice(public_key);
    out
}

/// Server side signature over the ECDHE parameters.
pub fn generate_key_signature<R: RngCore + CryptoRng>(
    client_random: &[u8],
    server_random: &[u8],
    public_key: &[u8],
    named_curve: NamedCurve,
    private_key: &PrivateKey,
    hash: HashAlgorithm,
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    let message = value_key_message(client_random, server_random, public_key, named_curve);
    private_key.sign(&message, hash, rng)
}

/// Check the ServerKeyExchange signature with the leaf of the server's chain.
pub fn verify_key_signature(
    message: &[u8],
    scheme: SignatureAndHashAlgorithm,
    signature: &[u8],
    raw_certificates: &[Vec<u8>],
) -> Result<(), Error> {
    let leaf = raw_certificates
        .first()
        .ok_or(Error::ServerCertificateMissing)?;
    verify_signature(leaf, message, signature, scheme)
}

/// Client signature over the handshake transcript so far.
pub fn generate_certificate_verify<R: RngCore + CryptoRng>(
    handshake_bodies: &[u8],
    private_key: &PrivateKey,
    hash: HashAlgorithm,
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    private_key.sign(handshake_bodies, hash, rng)
}

/// Check a CertificateVerify with the leaf of the client's chain.
pub fn verify_certificate_verify(
    handshake_bodies: &[u8],
    scheme: SignatureAndHashAlgorithm,
    signature: &[u8],
    raw_certificates: &[Vec<u8>],
) -> Result<(), Error> {
    let leaf = raw_certificates
        .first()
        .ok_or(Error::CertificateVerifyNoCertificate)?;
    verify_signature(leaf, handshake_bodies, signature, scheme)
}
