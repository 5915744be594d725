//! The seven handshake flights.
//!
//! ```text
//! Client                                          Server
//!
//! Flight 1  ClientHello             -------->                  Flight 0
//!                                   <--------  HelloVerifyRequest  Flight 2
//! Flight 3  ClientHello             -------->
//!                                                  ServerHello  Flight 4
//!                                                 Certificate*
//!                                           ServerKeyExchange*
//!                                          CertificateRequest*
//!                                   <--------   ServerHelloDone
//! Flight 5  Certificate*
//!           ClientKeyExchange
//!           CertificateVerify*
//!           [ChangeCipherSpec]
//!           Finished                -------->
//!                                           [ChangeCipherSpec]  Flight 6
//!                                   <--------          Finished
//! ```
//!
//! Every flight has a `generate`, producing what we send while in the
//! flight, and a `parse`, looking in the cache for the peer's answer.
//! `parse` returning `Ok(None)` means the answer is not complete yet.

use std::fmt;

use crate::cache::{HandshakeCache, PullRule};
use crate::config::HandshakeConfig;
use crate::conn::{FlightConn, HandshakeMessage, Packet};
use crate::context::Context;
use crate::message::{Body, ClientHello, Handshake, Header, MessageType};
use crate::state::State;
use crate::Error;

mod flight0;
mod flight1;
mod flight2;
mod flight3;
mod flight4;
mod flight5;
mod flight6;

/// Epoch of the plaintext handshake.
pub(crate) const INITIAL_EPOCH: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flight {
    Flight0,
    Flight1,
    Flight2,
    Flight3,
    Flight4,
    Flight5,
    Flight6,
}

impl Flight {
    /// After sending this flight there is nothing more to wait for.
    pub fn is_last_send_flight(&self) -> bool {
        matches!(self, Flight::Flight6)
    }

    /// Parsing this flight successfully completes the handshake.
    pub fn is_last_recv_flight(&self) -> bool {
        matches!(self, Flight::Flight5)
    }

    /// The server's HelloVerifyRequest is stateless and not resent on timeout.
    pub fn has_retransmit(&self) -> bool {
        !matches!(self, Flight::Flight2)
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Flight::Flight1 | Flight::Flight3 | Flight::Flight5)
    }

    pub(crate) fn parse(
        &self,
        conn: &mut dyn FlightConn,
        ctx: &Context,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Option<Flight>, Error> {
        match self {
            Flight::Flight0 => flight0::parse(state, cache, cfg),
            Flight::Flight1 => flight1::parse(state, cache, cfg),
            Flight::Flight2 => flight2::parse(state, cache, cfg),
            Flight::Flight3 => flight3::parse(state, cache, cfg),
            Flight::Flight4 => flight4::parse(conn, ctx, state, cache, cfg),
            Flight::Flight5 => flight5::parse(state, cache),
            Flight::Flight6 => flight6::parse(state, cache),
        }
    }

    pub(crate) fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, Error> {
        match self {
            Flight::Flight0 => flight0::generate(state, cfg),
            Flight::Flight1 => flight1::generate(state, cache, cfg),
            Flight::Flight2 => flight2::generate(state, cache),
            Flight::Flight3 => flight3::generate(state, cache, cfg),
            Flight::Flight4 => flight4::generate(state, cache, cfg),
            Flight::Flight5 => flight5::generate(state, cache, cfg),
            Flight::Flight6 => flight6::generate(state, cache),
        }
    }
}

impl fmt::Display for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Flight::Flight0 => 0,
            Flight::Flight1 => 1,
            Flight::Flight2 => 2,
            Flight::Flight3 => 3,
            Flight::Flight4 => 4,
            Flight::Flight5 => 5,
            Flight::Flight6 => 6,
        };
        write!(f, "Flight {}", n)
    }
}

/// What happened when received messages were pushed into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Received {
    /// Messages that were not cached before.
    pub new: usize,
    /// Duplicates of messages we already consumed.
    pub stale: usize,
}

impl Received {
    /// Only old messages arrived, the peer is resending its previous flight.
    pub fn is_stale_retransmit(&self) -> bool {
        self.new == 0 && self.stale > 0
    }
}

/// Push peer handshake messages into the cache.
///
/// Fragments and unparseable headers are dropped; reassembly belongs to the
/// record layer.
pub(crate) fn cache_received(
    cache: &mut HandshakeCache,
    state: &State,
    messages: Vec<HandshakeMessage>,
) -> Received {
    let mut received = Received::default();

    for message in messages {
        let Ok((_, header)) = Header::parse(&message.data) else {
            debug!("Dropping handshake message with a broken header");
            continue;
        };
        if header.is_fragment() {
            debug!("Dropping fragmented {:?}", header.msg_type);
            continue;
        }

        let seq = header.message_seq;
        let is_new = cache.push(
            message.data,
            message.epoch,
            seq,
            header.msg_type,
            !state.is_client,
        );

        if is_new {
            received.new += 1;
        } else if seq < state.handshake_recv_sequence {
            received.stale += 1;
        }
    }

    received
}

/// Number a handshake message, record it in the cache and wrap it for sending.
fn handshake_packet(
    state: &mut State,
    cache: &mut HandshakeCache,
    epoch: u16,
    body: Body<'_>,
) -> Packet {
    let seq = state.next_send_sequence();
    let typ = body.message_type();
    let data = Handshake::new(seq, body).to_bytes();
    cache.push(data.clone(), epoch, seq, typ, state.is_client);
    Packet::handshake(epoch, data)
}

/// ChangeCipherSpec followed by our Finished in epoch 1.
fn finished_packets(state: &mut State, cache: &mut HandshakeCache) -> Vec<Packet> {
    let verify_data = state.local_verify_data.clone();
    let mut finished = handshake_packet(
        state,
        cache,
        INITIAL_EPOCH + 1,
        Body::Finished(crate::message::Finished::new(&verify_data)),
    );
    finished.reset_local_sequence_number = true;
    vec![Packet::change_cipher_spec(), finished]
}

/// Transcript rules up to and including ClientKeyExchange, as signed by
/// CertificateVerify.
pub(crate) const CERTIFICATE_VERIFY_RULES: [PullRule; 8] = [
    PullRule::new(MessageType::ClientHello, INITIAL_EPOCH, true, false),
    PullRule::new(MessageType::ServerHello, INITIAL_EPOCH, false, false),
    PullRule::new(MessageType::Certificate, INITIAL_EPOCH, false, false),
    PullRule::new(MessageType::ServerKeyExchange, INITIAL_EPOCH, false, false),
    PullRule::new(MessageType::CertificateRequest, INITIAL_EPOCH, false, false),
    PullRule::new(MessageType::ServerHelloDone, INITIAL_EPOCH, false, false),
    PullRule::new(MessageType::Certificate, INITIAL_EPOCH, true, false),
    PullRule::new(MessageType::ClientKeyExchange, INITIAL_EPOCH, true, false),
];

/// Transcript covered by the client's Finished.
pub(crate) fn client_finished_rules() -> Vec<PullRule> {
    let mut rules = CERTIFICATE_VERIFY_RULES.to_vec();
    rules.push(PullRule::new(
        MessageType::CertificateVerify,
        INITIAL_EPOCH,
        true,
        false,
    ));
    rules
}

/// Transcript covered by the server's Finished.
pub(crate) fn server_finished_rules() -> Vec<PullRule> {
    let mut rules = client_finished_rules();
    rules.push(PullRule::new(
        MessageType::Finished,
        INITIAL_EPOCH + 1,
        true,
        false,
    ));
    rules
}

/// The ClientHello of flights 1 and 3.
fn client_hello(state: &State, cfg: &HandshakeConfig) -> Result<ClientHello, Error> {
    use crate::message::extensions::{
        ECPointFormatsExtension, ServerNameExtension, SignatureAlgorithmsExtension,
        SupportedGroupsExtension, UseSrtpExtension,
    };
    use crate::message::{Cookie, HelloExtensions, ProtocolVersion};

    let cookie =
        Cookie::try_new(&state.cookie).map_err(|_| Error::CookieTooLong(state.cookie.len()))?;

    let mut extensions = HelloExtensions {
        signature_algorithms: Some(SignatureAlgorithmsExtension::new(cfg.signature_schemes())),
        renegotiation_info: true,
        ..Default::default()
    };

    if cfg.cipher_suites().iter().any(|id| !id.is_psk()) {
        extensions.supported_groups = Some(SupportedGroupsExtension::new(cfg.named_curves()));
        extensions.ec_point_formats = Some(ECPointFormatsExtension::default());
    }
    if !cfg.srtp_protection_profiles().is_empty() {
        extensions.use_srtp = Some(UseSrtpExtension::new(cfg.srtp_protection_profiles()));
    }
    if cfg.extended_master_secret() != crate::config::ExtendedMasterSecretType::Disable {
        extensions.extended_master_secret = true;
    }
    if !cfg.server_name().is_empty() {
        extensions.server_name = Some(ServerNameExtension::new(cfg.server_name()));
    }

    Ok(ClientHello::new(
        ProtocolVersion::DTLS1_2,
        state.local_random,
        cookie,
        cfg.cipher_suites().to_vec(),
        extensions,
    ))
}

/// First profile of ours that the peer also offers.
fn find_matching_srtp_profile(
    remote: &[crate::message::extensions::SrtpProtectionProfile],
    local: &[crate::message::extensions::SrtpProtectionProfile],
) -> Option<crate::message::extensions::SrtpProtectionProfile> {
    local.iter().find(|p| remote.contains(p)).copied()
}
