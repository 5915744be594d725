use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use super::hash::digest;
use crate::message::HashAlgorithm;
use crate::Error;

pub const MASTER_SECRET_LENGTH: usize = 48;
pub const VERIFY_DATA_LENGTH: usize = 12;

const MASTER_SECRET_LABEL: &str = "master secret";
const EXTENDED_MASTER_SECRET_LABEL: &str = "extended master secret";
const KEY_EXPANSION_LABEL: &str = "key expansion";
const CLIENT_FINISHED_LABEL: &str = "client finished";
const SERVER_FINISHED_LABEL: &str = "server finished";

/// PRF for TLS 1.2
/// as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// The label is prepended to `seed` here, callers pass the seed without it.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    match hash {
        HashAlgorithm::SHA256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, output_len),
        HashAlgorithm::SHA384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, output_len),
        HashAlgorithm::Unknown(_) => Err(Error::Crypto(format!(
            "Unsupported PRF hash for TLS1.2: {:?}",
            hash
        ))),
    }
}

fn p_hash<M: Mac + hmac::digest::KeyInit + Clone>(
    secret: &[u8],
    full_seed: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut result = Zeroizing::new(Vec::with_capacity(output_len));

    let key = <M as Mac>::new_from_slice(secret)
        .map_err(|_| Error::Crypto("Invalid HMAC key length".to_string()))?;

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut mac = key.clone();
    mac.update(full_seed);
    let mut a = mac.finalize().into_bytes();

    while result.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let output = mac.finalize().into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        if result.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut mac = key.clone();
            mac.update(&a);
            a = mac.finalize().into_bytes();
        }
    }

    Ok(result)
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random, 48)
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    prf_tls12(
        pre_master_secret,
        MASTER_SECRET_LABEL,
        &seed,
        MASTER_SECRET_LENGTH,
        hash,
    )
}

/// Extended Master Secret calculation for TLS 1.2 (RFC 7627)
///
/// master_secret = PRF(pre_master_secret, "extended master secret", session_hash, 48)
pub fn extended_master_secret(
    pre_master_secret: &[u8],
    session_hash: &[u8],
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    prf_tls12(
        pre_master_secret,
        EXTENDED_MASTER_SECRET_LABEL,
        session_hash,
        MASTER_SECRET_LENGTH,
        hash,
    )
}

/// Key expansion for TLS 1.2
/// as specified in RFC 5246 Section 6.3
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    key_material_length: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    // For key expansion the seed is server_random + client_random.
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    prf_tls12(
        master_secret,
        KEY_EXPANSION_LABEL,
        &seed,
        key_material_length,
        hash,
    )
}

fn verify_data(
    master_secret: &[u8],
    label: &str,
    handshake_bodies: &[u8],
    hash: HashAlgorithm,
) -> Result<Vec<u8>, Error> {
    let transcript_hash = digest(hash, handshake_bodies)?;
    let out = prf_tls12(
        master_secret,
        label,
        &transcript_hash,
        VERIFY_DATA_LENGTH,
        hash,
    )?;
    Ok(out.to_vec())
}

/// verify_data for the client's Finished over the merged transcript.
pub fn verify_data_client(
    master_secret: &[u8],
    handshake_bodies: &[u8],
    hash: HashAlgorithm,
) -> Result<Vec<u8>, Error> {
    verify_data(master_secret, CLIENT_FINISHED_LABEL, handshake_bodies, hash)
}

/// verify_data for the server's Finished over the merged transcript.
pub fn verify_data_server(
    master_secret: &[u8],
    handshake_bodies: &[u8],
    hash: HashAlgorithm,
) -> Result<Vec<u8>, Error> {
    verify_data(master_secret, SERVER_FINISHED_LABEL, handshake_bodies, hash)
}
