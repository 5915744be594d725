use std::fmt;

use elliptic_curve::sec1::ToEncodedPoint;
use rand::{CryptoRng, RngCore};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::Zeroizing;

use crate::Error;

code_point! {
    /// Named curves for ECDHE, RFC 8422 Section 5.1.1.
    pub enum NamedCurve: u16 {
        P256 = 0x0017,
        P384 = 0x0018,
        X25519 = 0x001D,
    }
}

impl Default for NamedCurve {
    fn default() -> Self {
        NamedCurve::X25519
    }
}

impl NamedCurve {
    pub fn is_supported(&self) -> bool {
        !matches!(self, NamedCurve::Unknown(_))
    }

    /// Curves we offer, in preference order.
    pub fn supported() -> &'static [NamedCurve] {
        &[NamedCurve::X25519, NamedCurve::P256, NamedCurve::P384]
    }
}

impl fmt::Display for NamedCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamedCurve::P256 => write!(f, "P-256"),
            NamedCurve::P384 => write!(f, "P-384"),
            NamedCurve::X25519 => write!(f, "X25519"),
            NamedCurve::Unknown(v) => write!(f, "unknown curve {:#06x}", v),
        }
    }
}

/// Ephemeral key pair for one handshake.
pub struct NamedCurveKeypair {
    pub curve: NamedCurve,
    /// X25519 u-coordinate, or an uncompressed SEC1 point for the P-curves.
    pub public_key: Vec<u8>,
    pub private_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for NamedCurveKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCurveKeypair")
            .field("curve", &self.curve)
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

pub fn generate_keypair<R: RngCore + CryptoRng>(
    curve: NamedCurve,
    rng: &mut R,
) -> Result<NamedCurveKeypair, Error> {
    match curve {
        NamedCurve::X25519 => {
            let mut scalar = Zeroizing::new([0u8; 32]);
            rng.fill_bytes(&mut scalar[..]);
            let public_key = x25519(*scalar, X25519_BASEPOINT_BYTES);
            Ok(NamedCurveKeypair {
                curve,
                public_key: public_key.to_vec(),
                private_key: Zeroizing::new(scalar.to_vec()),
            })
        }
        NamedCurve::P256 => {
            let secret = p256::SecretKey::random(rng);
            let public_key = secret.public_key().to_encoded_point(false);
            Ok(NamedCurveKeypair {
                curve,
                public_key: public_key.as_bytes().to_vec(),
                private_key: Zeroizing::new(secret.to_bytes().to_vec()),
            })
        }
        NamedCurve::P384 => {
            let secret = p384::SecretKey::random(rng);
            let public_key = secret.public_key().to_encoded_point(false);
            Ok(NamedCurveKeypair {
                curve,
                public_key: public_key.as_bytes().to_vec(),
                private_key: Zeroizing::new(secret.to_bytes().to_vec()),
            })
        }
        NamedCurve::Unknown(value) => Err(Error::InvalidNamedCurve(value)),
    }
}

/// ECDH shared secret between our private key and the peer's public key.
pub fn pre_master_secret(
    peer_public_key: &[u8],
    local_private_key: &[u8],
    curve: NamedCurve,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    match curve {
        NamedCurve::X25519 => {
            let scalar: [u8; 32] = local_private_key
                .try_into()
                .map_err(|_| Error::KeyExchange("Invalid X25519 private key".to_string()))?;
            let scalar = Zeroizing::new(scalar);
            let point: [u8; 32] = peer_public_key
                .try_into()
                .map_err(|_| Error::KeyExchange("Invalid X25519 public key".to_string()))?;

            let shared = Zeroizing::new(x25519(*scalar, point));
            // Low order points give an all zero secret.
            if shared.iter().all(|b| *b == 0) {
                return Err(Error::KeyExchange(
                    "X25519 shared secret is all zero".to_string(),
                ));
            }
            Ok(Zeroizing::new(shared.to_vec()))
        }
        NamedCurve::P256 => {
            let secret = p256::SecretKey::from_slice(local_private_key)
                .map_err(|_| Error::KeyExchange("Invalid P-256 private key".to_string()))?;
            let public = p256::PublicKey::from_sec1_bytes(peer_public_key)
                .map_err(|_| Error::KeyExchange("Invalid P-256 public key".to_string()))?;
            let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        NamedCurve::P384 => {
            let secret = p384::SecretKey::from_slice(local_private_key)
                .map_err(|_| Error::KeyExchange("Invalid P-384 private key".to_string()))?;
            let public = p384::PublicKey::from_sec1_bytes(peer_public_key)
                .map_err(|_| Error::KeyExchange("Invalid P-384 public key".to_string()))?;
            let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        NamedCurve::Unknown(value) => Err(Error::InvalidNamedCurve(value)),
    }
}

/// RFC 4279 Section 2: the other_secret is N zero bytes for plain PSK.
///
/// `u16(N) || 0^N || u16(N) || psk`
pub fn psk_pre_master_secret(psk: &[u8]) -> Zeroizing<Vec<u8>> {
    let n = psk.len();
    let mut out = Zeroizing::new(Vec::with_capacity(4 + 2 * n));
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.resize(2 + n, 0);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}
