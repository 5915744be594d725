use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::cipher_suite::CipherSuite;
use crate::crypto::{CertifiedKey, NamedCurve, NamedCurveKeypair};
use crate::message::extensions::SrtpProtectionProfile;
use crate::message::Random;
use crate::rng::SeededRng;

/// Record layer epochs, shared with whoever reads and writes records.
///
/// Only ever raised.
#[derive(Debug, Default)]
pub struct Epochs {
    local: AtomicU16,
    remote: AtomicU16,
}

impl Epochs {
    pub fn local(&self) -> u16 {
        self.local.load(Ordering::Acquire)
    }

    pub fn remote(&self) -> u16 {
        self.remote.load(Ordering::Acquire)
    }

    pub fn set_local(&self, epoch: u16) {
        self.local.fetch_max(epoch, Ordering::AcqRel);
    }

    pub fn set_remote(&self, epoch: u16) {
        self.remote.fetch_max(epoch, Ordering::AcqRel);
    }
}

/// Everything the flights negotiate, owned by one handshake.
pub struct State {
    pub(crate) is_client: bool,
    pub(crate) epochs: Arc<Epochs>,

    /// Sequence number of the next handshake message we send.
    pub(crate) handshake_send_sequence: u16,
    /// Sequence number of the next peer handshake message we expect.
    pub(crate) handshake_recv_sequence: u16,

    pub(crate) cookie: Vec<u8>,
    pub(crate) local_random: Random,
    pub(crate) remote_random: Random,

    pub(crate) named_curve: NamedCurve,
    pub(crate) local_keypair: Option<NamedCurveKeypair>,

    pub(crate) pre_master_secret: Zeroizing<Vec<u8>>,
    pub(crate) master_secret: Zeroizing<Vec<u8>>,
    pub(crate) local_verify_data: Vec<u8>,
    /// Memoised ServerKeyExchange signature.
    pub(crate) local_key_signature: Vec<u8>,

    pub(crate) cipher_suite: CipherSuite,

    pub(crate) local_certificate: Option<CertifiedKey>,
    pub(crate) remote_certificate: Option<Vec<Vec<u8>>>,
    pub(crate) remote_certificate_verified: bool,
    pub(crate) remote_requested_certificate: bool,

    pub(crate) extended_master_secret: bool,
    pub(crate) srtp_protection_profile: Option<SrtpProtectionProfile>,

    /// PSK identity hint (client) or identity (server) received from the peer.
    pub(crate) identity_hint: Vec<u8>,
    /// SNI name the client asked for.
    pub(crate) server_name: String,

    pub(crate) rng: SeededRng,
}

impl State {
    pub fn new(is_client: bool, rng_seed: Option<u64>) -> Self {
        State {
            is_client,
            epochs: Arc::new(Epochs::default()),
            handshake_send_sequence: 0,
            handshake_recv_sequence: 0,
            cookie: Vec::new(),
            local_random: Random::default(),
            remote_random: Random::default(),
            named_curve: NamedCurve::default(),
            local_keypair: None,
            pre_master_secret: Zeroizing::new(Vec::new()),
            master_secret: Zeroizing::new(Vec::new()),
            local_verify_data: Vec::new(),
            local_key_signature: Vec::new(),
            cipher_suite: CipherSuite::Null,
            local_certificate: None,
            remote_certificate: None,
            remote_certificate_verified: false,
            remote_requested_certificate: false,
            extended_master_secret: false,
            srtp_protection_profile: None,
            identity_hint: Vec::new(),
            server_name: String::new(),
            rng: SeededRng::new(rng_seed),
        }
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    /// Shared handle for the record layer.
    pub fn epochs(&self) -> Arc<Epochs> {
        self.epochs.clone()
    }

    pub fn local_epoch(&self) -> u16 {
        self.epochs.local()
    }

    pub fn remote_epoch(&self) -> u16 {
        self.epochs.remote()
    }

    pub fn cipher_suite(&self) -> &CipherSuite {
        &self.cipher_suite
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    /// Verify data of the Finished message we sent.
    pub fn local_verify_data(&self) -> &[u8] {
        &self.local_verify_data
    }

    pub fn local_random(&self) -> &Random {
        &self.local_random
    }

    pub fn remote_random(&self) -> &Random {
        &self.remote_random
    }

    /// Peer chain, leaf first.
    pub fn remote_certificate(&self) -> Option<&[Vec<u8>]> {
        self.remote_certificate.as_deref()
    }

    pub fn remote_certificate_verified(&self) -> bool {
        self.remote_certificate_verified
    }

    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    pub fn srtp_protection_profile(&self) -> Option<SrtpProtectionProfile> {
        self.srtp_protection_profile
    }

    pub fn identity_hint(&self) -> &[u8] {
        &self.identity_hint
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn named_curve(&self) -> NamedCurve {
        self.named_curve
    }

    /// (client_random, server_random) as they go into the PRF.
    pub(crate) fn randoms(&self) -> ([u8; 32], [u8; 32]) {
        let local = self.local_random.to_bytes();
        let remote = self.remote_random.to_bytes();
        if self.is_client {
            (local, remote)
        } else {
            (remote, local)
        }
    }

    /// Next outgoing handshake message sequence number.
    pub(crate) fn next_send_sequence(&mut self) -> u16 {
        let seq = self.handshake_send_sequence;
        self.handshake_send_sequence = seq.wrapping_add(1);
        seq
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("is_client", &self.is_client)
            .field("local_epoch", &self.local_epoch())
            .field("remote_epoch", &self.remote_epoch())
            .field("handshake_send_sequence", &self.handshake_send_sequence)
            .field("handshake_recv_sequence", &self.handshake_recv_sequence)
            .field("cipher_suite", &self.cipher_suite.id())
            .field("named_curve", &self.named_curve)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("srtp_protection_profile", &self.srtp_protection_profile)
            .finish_non_exhaustive()
    }
}
