use super::{client_hello, flight3, handshake_packet, Flight, INITIAL_EPOCH};
use crate::cache::{HandshakeCache, PullRule};
use crate::config::HandshakeConfig;
use crate::conn::Packet;
use crate::crypto::NamedCurve;
use crate::message::{Body, MessageType, ProtocolVersion, Random};
use crate::state::State;
use crate::Error;

/// The client's first ClientHello, without cookie.
pub(super) fn generate(
    state: &mut State,
    cache: &mut HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Vec<Packet>, Error> {
    state.named_curve = NamedCurve::default();
    state.cookie.clear();
    state.local_random = Random::new(&mut state.rng);

    let hello = client_hello(state, cfg)?;
    Ok(vec![handshake_packet(
        state,
        cache,
        INITIAL_EPOCH,
        Body::ClientHello(hello),
    )])
}

pub(super) fn parse(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Option<Flight>, Error> {
    // A server may skip the HelloVerifyRequest and answer with ServerHello.
    let rules = [
        PullRule::new(MessageType::HelloVerifyRequest, INITIAL_EPOCH, false, true),
        PullRule::new(MessageType::ServerHello, INITIAL_EPOCH, false, true),
    ];
    let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &rules) else {
        return Ok(None);
    };

    if msgs.contains(MessageType::ServerHello) {
        return flight3::parse(state, cache, cfg);
    }

    let Some(hello_verify) = msgs.hello_verify_request() else {
        return Err(Error::UnexpectedMessage(
            "Expected HelloVerifyRequest".to_string(),
        ));
    };
    accept_hello_verify(state, hello_verify.server_version, &hello_verify.cookie)?;
    state.handshake_recv_sequence = seq;

    Ok(Some(Flight::Flight3))
}

/// DTLS 1.2 clients must accept a HelloVerifyRequest carrying either
/// version, RFC 6347 Section 4.2.1.
pub(super) fn accept_hello_verify(
    state: &mut State,
    version: ProtocolVersion,
    cookie: &[u8],
) -> Result<(), Error> {
    if version != ProtocolVersion::DTLS1_0 && version != ProtocolVersion::DTLS1_2 {
        return Err(Error::UnsupportedProtocolVersion);
    }
    state.cookie = cookie.to_vec();
    Ok(())
}
