use sha2::{Digest, Sha256, Sha384};

use crate::message::HashAlgorithm;
use crate::Error;

/// One-shot digest of `data` with a handshake hash.
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error> {
    match algorithm {
        HashAlgorithm::SHA256 => Ok(Sha256::digest(data).to_vec()),
        HashAlgorithm::SHA384 => Ok(Sha384::digest(data).to_vec()),
        HashAlgorithm::Unknown(v) => Err(Error::Crypto(format!(
            "Unsupported hash algorithm for handshake: {}",
            v
        ))),
    }
}
