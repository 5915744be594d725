//! Cipher suites: wire identifiers, negotiation and record protection.

use std::fmt;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};

use crate::crypto::prf::key_expansion;
use crate::message::{ClientCertificateType, HashAlgorithm};
use crate::record::{ContentType, RecordHeader, RECORD_HEADER_LENGTH};
use crate::Error;

/// Explicit nonce carried in front of every AEAD record fragment.
pub const EXPLICIT_NONCE_LENGTH: usize = 8;
const GCM_TAG_LENGTH: usize = 16;
const GCM_IMPLICIT_IV_LENGTH: usize = 4;

/// Per record expansion of the AES-GCM suites.
pub const GCM_OVERHEAD: usize = EXPLICIT_NONCE_LENGTH + GCM_TAG_LENGTH;

code_point! {
    #[allow(non_camel_case_types)]
    pub enum CipherSuiteId: u16 {
        TLS_NULL_WITH_NULL_NULL = 0x0000,
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 = 0xC02B,
        TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 = 0xC02C,
        TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 = 0xC02F,
        TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 = 0xC030,
        TLS_PSK_WITH_AES_128_GCM_SHA256 = 0x00A8,
    }
}

impl Default for CipherSuiteId {
    fn default() -> Self {
        Self::TLS_NULL_WITH_NULL_NULL
    }
}

impl CipherSuiteId {
    /// All negotiable suites in preference order.
    pub const fn all() -> &'static [CipherSuiteId; 5] {
        &[
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256,
        ]
    }

    pub fn is_supported(&self) -> bool {
        Self::all().contains(self)
    }

    /// PRF and transcript hash. The null suite has none.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
            | CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
            | CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256 => Some(HashAlgorithm::SHA256),
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            | CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => Some(HashAlgorithm::SHA384),
            CipherSuiteId::TLS_NULL_WITH_NULL_NULL | CipherSuiteId::Unknown(_) => None,
        }
    }

    /// The certificate key type the suite authenticates with.
    pub fn certificate_type(&self) -> Option<ClientCertificateType> {
        match self {
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
            | CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => {
                Some(ClientCertificateType::ECDSA_SIGN)
            }
            CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
            | CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => {
                Some(ClientCertificateType::RSA_SIGN)
            }
            _ => None,
        }
    }

    pub fn is_psk(&self) -> bool {
        matches!(self, CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256)
    }

    fn key_length(&self) -> usize {
        match self {
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            | CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => 32,
            _ => 16,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CipherSuiteId::TLS_NULL_WITH_NULL_NULL => "TLS_NULL_WITH_NULL_NULL",
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => {
                "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"
            }
            CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => {
                "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"
            }
            CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => {
                "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"
            }
            CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => {
                "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"
            }
            CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256 => "TLS_PSK_WITH_AES_128_GCM_SHA256",
            CipherSuiteId::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for CipherSuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuiteId::Unknown(v) => write!(f, "Unknown({:#06x})", v),
            _ => f.write_str(self.name()),
        }
    }
}

/// First suite of `remote` that also appears in `local`.
pub fn find_matching(remote: &[CipherSuiteId], local: &[CipherSuiteId]) -> Option<CipherSuiteId> {
    remote
        .iter()
        .find(|id| id.is_supported() && local.contains(id))
        .copied()
}

enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl AesGcm {
    fn new(key: &[u8]) -> Result<Self, Error> {
        let invalid = |_| Error::Crypto(format!("Invalid key size for AES-GCM: {}", key.len()));
        match key.len() {
            16 => Ok(AesGcm::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            32 => Ok(AesGcm::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            _ => Err(Error::Crypto(format!(
                "Invalid key size for AES-GCM: {}",
                key.len()
            ))),
        }
    }

    fn seal(&self, nonce: &[u8; 12], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload { msg, aad };
        let sealed = match self {
            AesGcm::Aes128(c) => c.encrypt(nonce, payload),
            AesGcm::Aes256(c) => c.encrypt(nonce, payload),
        };
        sealed.map_err(|_| Error::Crypto("AES-GCM encryption failed".to_string()))
    }

    fn open(&self, nonce: &[u8; 12], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload { msg, aad };
        let opened = match self {
            AesGcm::Aes128(c) => c.decrypt(nonce, payload),
            AesGcm::Aes256(c) => c.decrypt(nonce, payload),
        };
        opened.map_err(|_| Error::Crypto("AES-GCM decryption failed".to_string()))
    }
}

/// Directional keys derived by [`CipherSuite::init`].
pub struct GcmKeys {
    local: AesGcm,
    remote: AesGcm,
    local_iv: [u8; GCM_IMPLICIT_IV_LENGTH],
    remote_iv: [u8; GCM_IMPLICIT_IV_LENGTH],
}

impl fmt::Debug for GcmKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcmKeys").finish_non_exhaustive()
    }
}

/// The negotiated cipher suite of a connection.
///
/// Starts out as [`CipherSuite::Null`], which passes records through untouched.
/// An AES-GCM suite protects records only after [`CipherSuite::init`] ran.
#[derive(Debug, Default)]
pub enum CipherSuite {
    #[default]
    Null,
    Gcm {
        id: CipherSuiteId,
        keys: Option<GcmKeys>,
    },
}

impl CipherSuite {
    pub fn new(id: CipherSuiteId) -> Result<Self, Error> {
        match id {
            CipherSuiteId::TLS_NULL_WITH_NULL_NULL => Ok(CipherSuite::Null),
            CipherSuiteId::Unknown(_) => Err(Error::InvalidCipherSuite),
            _ => Ok(CipherSuite::Gcm { id, keys: None }),
        }
    }

    pub fn id(&self) -> CipherSuiteId {
        match self {
            CipherSuite::Null => CipherSuiteId::TLS_NULL_WITH_NULL_NULL,
            CipherSuite::Gcm { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        self.id().name()
    }

    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.id().hash_algorithm()
    }

    pub fn certificate_type(&self) -> Option<ClientCertificateType> {
        self.id().certificate_type()
    }

    pub fn is_psk(&self) -> bool {
        self.id().is_psk()
    }

    pub fn is_initialized(&self) -> bool {
        match self {
            CipherSuite::Null => true,
            CipherSuite::Gcm { keys, .. } => keys.is_some(),
        }
    }

    /// Derive the record keys. Runs once; a second call is rejected.
    pub fn init(
        &mut self,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
        is_client: bool,
    ) -> Result<(), Error> {
        let CipherSuite::Gcm { id, keys } = self else {
            return Err(Error::CipherSuiteAlreadyInitialized);
        };
        if keys.is_some() {
            return Err(Error::CipherSuiteAlreadyInitialized);
        }

        let hash = id.hash_algorithm().ok_or(Error::InvalidCipherSuite)?;
        let key_len = id.key_length();
        let block = key_expansion(
            master_secret,
            client_random,
            server_random,
            2 * key_len + 2 * GCM_IMPLICIT_IV_LENGTH,
            hash,
        )?;

        let (client_key, rest) = block.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_iv, server_iv) = rest.split_at(GCM_IMPLICIT_IV_LENGTH);

        let mut c_iv = [0u8; GCM_IMPLICIT_IV_LENGTH];
        c_iv.copy_from_slice(client_iv);
        let mut s_iv = [0u8; GCM_IMPLICIT_IV_LENGTH];
        s_iv.copy_from_slice(server_iv);

        let new_keys = if is_client {
            GcmKeys {
                local: AesGcm::new(client_key)?,
                remote: AesGcm::new(server_key)?,
                local_iv: c_iv,
                remote_iv: s_iv,
            }
        } else {
            GcmKeys {
                local: AesGcm::new(server_key)?,
                remote: AesGcm::new(client_key)?,
                local_iv: s_iv,
                remote_iv: c_iv,
            }
        };

        debug!("Initialized cipher suite {}", id);
        *keys = Some(new_keys);
        Ok(())
    }

    /// Protect one record. Returns the complete record, header included.
    pub fn encrypt(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let keys = match self {
            CipherSuite::Null => return Ok(plain_record(header, plaintext)),
            CipherSuite::Gcm { keys: Some(keys), .. } => keys,
            CipherSuite::Gcm { keys: None, .. } => return Err(Error::CipherSuiteNotInitialized),
        };

        let explicit_nonce = explicit_nonce(header.epoch, header.sequence_number);
        let nonce = nonce(&keys.local_iv, &explicit_nonce);
        let aad = aad(header, plaintext.len());
        let sealed = keys.local.seal(&nonce, &aad, plaintext)?;

        let mut out_header = *header;
        out_header.length = (EXPLICIT_NONCE_LENGTH + sealed.len()) as u16;

        let mut out = Vec::with_capacity(RECORD_HEADER_LENGTH + out_header.length as usize);
        out_header.serialize(&mut out);
        out.extend_from_slice(&explicit_nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open one record. Returns the record with its plaintext fragment.
    ///
    /// ChangeCipherSpec records are never protected and pass through.
    pub fn decrypt(&self, record: &[u8]) -> Result<Vec<u8>, Error> {
        let keys = match self {
            CipherSuite::Null => return Ok(record.to_vec()),
            CipherSuite::Gcm { keys: Some(keys), .. } => keys,
            CipherSuite::Gcm { keys: None, .. } => return Err(Error::CipherSuiteNotInitialized),
        };

        let (_, (header, fragment)) = RecordHeader::parse_record(record)?;
        if header.content_type == ContentType::ChangeCipherSpec {
            return Ok(record.to_vec());
        }

        if fragment.len() < GCM_OVERHEAD {
            return Err(Error::Crypto(format!(
                "Record fragment too short for AES-GCM: {}",
                fragment.len()
            )));
        }

        let (explicit_nonce, ciphertext) = fragment.split_at(EXPLICIT_NONCE_LENGTH);
        let nonce = nonce(&keys.remote_iv, explicit_nonce);
        let aad = aad(&header, ciphertext.len() - GCM_TAG_LENGTH);
        let plaintext = keys.remote.open(&nonce, &aad, ciphertext)?;

        Ok(plain_record(&header, &plaintext))
    }
}

fn plain_record(header: &RecordHeader, fragment: &[u8]) -> Vec<u8> {
    let mut out_header = *header;
    out_header.length = fragment.len() as u16;

    let mut out = Vec::with_capacity(RECORD_HEADER_LENGTH + fragment.len());
    out_header.serialize(&mut out);
    out.extend_from_slice(fragment);
    out
}

fn explicit_nonce(epoch: u16, sequence_number: u64) -> [u8; EXPLICIT_NONCE_LENGTH] {
    let mut out = sequence_number.to_be_bytes();
    out[..2].copy_from_slice(&epoch.to_be_bytes());
    out
}

fn nonce(iv: &[u8; GCM_IMPLICIT_IV_LENGTH], explicit_nonce: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..GCM_IMPLICIT_IV_LENGTH].copy_from_slice(iv);
    nonce[GCM_IMPLICIT_IV_LENGTH..].copy_from_slice(explicit_nonce);
    nonce
}

/// seq_num(epoch + sequence) || type || version || length
fn aad(header: &RecordHeader, plaintext_len: usize) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&explicit_nonce(header.epoch, header.sequence_number));
    aad[8] = header.content_type.as_u8();
    aad[9..11].copy_from_slice(&header.version.as_u16().to_be_bytes());
    aad[11..].copy_from_slice(&(plaintext_len as u16).to_be_bytes());
    aad
}
