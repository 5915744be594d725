//! Cryptographic primitives and helpers used by the handshake engine.

mod certificate;
mod hash;
mod key_exchange;
pub mod prf;
mod signing;

pub use certificate::{CertificateVerifier, CertifiedKey, RootStoreVerifier};
pub use hash::digest;
pub use key_exchange::{
    generate_keypair, pre_master_secret, psk_pre_master_secret, NamedCurve, NamedCurveKeypair,
};
pub use signing::{
    generate_certificate_verify, generate_key_signature, select_signature_scheme,
    value_key_message, verify_certificate_verify, verify_key_signature, verify_signature,
    PrivateKey,
};
