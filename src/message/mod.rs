mod certificate;
mod certificate_request;
mod certificate_verify;
mod client_hello;
mod client_key_exchange;
pub mod extensions;
mod finished;
mod handshake;
mod hello_verify;
mod id;
mod random;
mod server_hello;
mod server_key_exchange;

use std::fmt;
use std::str::FromStr;

pub use certificate::{Asn1Cert, Certificate};
pub use certificate_request::{CertificateRequest, DistinguishedName};
pub use certificate_verify::{CertificateVerify, DigitallySigned};
pub use client_hello::ClientHello;
pub use client_key_exchange::{ClientKeyExchange, ExchangeKeys};
pub use extensions::ExtensionType;
pub use extensions::HelloExtensions;
pub use finished::Finished;
pub use handshake::{Body, Handshake, Header, MessageType, HEADER_LENGTH};
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, SessionId};
pub use random::Random;
pub use server_hello::ServerHello;
pub use server_key_exchange::{EcdhParams, ServerKeyExchange, ServerKeyExchangeParams};

use nom::combinator::map;
use nom::number::complete::be_u16;
use nom::IResult;
use tinyvec::ArrayVec;

use crate::Error;

code_point! {
    pub enum ProtocolVersion: u16 {
        DTLS1_0 = 0xFEFF,
        DTLS1_2 = 0xFEFD,
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

code_point! {
    pub enum CompressionMethod: u8 {
        Null = 0,
    }
}

code_point! {
    /// Certificate types a server asks for in a CertificateRequest.
    #[allow(non_camel_case_types)]
    pub enum ClientCertificateType: u8 {
        RSA_SIGN = 1,
        ECDSA_SIGN = 64,
    }
}

impl FromStr for ClientCertificateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(ClientCertificateType::RSA_SIGN),
            "ecdsa" => Ok(ClientCertificateType::ECDSA_SIGN),
            _ => Err(Error::CertificateVerification(format!(
                "unknown certificate signature type: {}",
                s
            ))),
        }
    }
}

code_point! {
    #[allow(non_camel_case_types)]
    pub enum SignatureAlgorithm: u8 {
        Anonymous = 0,
        RSA = 1,
        ECDSA = 3,
    }
}

impl Default for SignatureAlgorithm {
    fn default() -> Self {
        Self::Unknown(0xFF)
    }
}

code_point! {
    #[allow(non_camel_case_types)]
    pub enum HashAlgorithm: u8 {
        SHA256 = 4,
        SHA384 = 5,
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::SHA256 => f.write_str("SHA-256"),
            HashAlgorithm::SHA384 => f.write_str("SHA-384"),
            HashAlgorithm::Unknown(v) => write!(f, "hash({})", v),
        }
    }
}

/// A signature scheme as TLS 1.2 spells it: hash in the high byte,
/// signature in the low one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub signature: SignatureAlgorithm,
}

impl SignatureAndHashAlgorithm {
    pub fn new(hash: HashAlgorithm, signature: SignatureAlgorithm) -> Self {
        SignatureAndHashAlgorithm { hash, signature }
    }

    pub fn from_u16(value: u16) -> Self {
        let [hash, signature] = value.to_be_bytes();
        SignatureAndHashAlgorithm::new(hash.into(), signature.into())
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes([self.hash.into(), self.signature.into()])
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAndHashAlgorithm> {
        map(be_u16, SignatureAndHashAlgorithm::from_u16)(input)
    }

    /// The schemes this crate can sign and verify, in preference order.
    pub fn supported() -> ArrayVec<[SignatureAndHashAlgorithm; 8]> {
        let (ecdsa, rsa) = (SignatureAlgorithm::ECDSA, SignatureAlgorithm::RSA);
        let (sha256, sha384) = (HashAlgorithm::SHA256, HashAlgorithm::SHA384);

        [(sha256, ecdsa), (sha384, ecdsa), (sha256, rsa), (sha384, rsa)]
            .into_iter()
            .map(|(hash, signature)| SignatureAndHashAlgorithm::new(hash, signature))
            .collect()
    }
}

code_point! {
    pub enum CurveType: u8 {
        NamedCurve = 3,
    }
}
