use super::{flight0, handshake_packet, Flight, INITIAL_EPOCH};
use crate::cache::{HandshakeCache, PullRule};
use crate::config::HandshakeConfig;
use crate::conn::Packet;
use crate::message::{Body, Cookie, HelloVerifyRequest, MessageType, ProtocolVersion};
use crate::state::State;
use crate::Error;

/// HelloVerifyRequest carrying the cookie drawn in flight 0.
pub(super) fn generate(state: &mut State, cache: &mut HandshakeCache) -> Result<Vec<Packet>, Error> {
    // The HelloVerifyRequest always answers ClientHello 0.
    state.handshake_send_sequence = 0;

    let cookie =
        Cookie::try_new(&state.cookie).map_err(|_| Error::CookieTooLong(state.cookie.len()))?;
    let hello_verify = HelloVerifyRequest::new(ProtocolVersion::DTLS1_2, cookie);

    Ok(vec![handshake_packet(
        state,
        cache,
        INITIAL_EPOCH,
        Body::HelloVerifyRequest(hello_verify),
    )])
}

pub(super) fn parse(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Option<Flight>, Error> {
    let rules = [PullRule::new(
        MessageType::ClientHello,
        INITIAL_EPOCH,
        true,
        false,
    )];
    let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &rules) else {
        // Only the first ClientHello again, our HelloVerifyRequest was
        // probably lost. Parsing it as flight 0 sends it once more.
        return flight0::parse(state, cache, cfg);
    };
    let Some(client_hello) = msgs.client_hello() else {
        return Err(Error::UnexpectedMessage("Expected ClientHello".to_string()));
    };

    state.handshake_recv_sequence = seq;

    if client_hello.client_version != ProtocolVersion::DTLS1_2 {
        return Err(Error::UnsupportedProtocolVersion);
    }
    if client_hello.cookie.is_empty() {
        return Ok(None);
    }
    if client_hello.cookie[..] != state.cookie[..] {
        return Err(Error::CookieMismatch);
    }

    Ok(Some(Flight::Flight4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;
    use crate::cipher_suite::CipherSuiteId;
    use crate::message::{ClientHello, Handshake, HelloExtensions, Random};
    use crate::test_util::certified_key;

    fn config() -> HandshakeConfig {
        HandshakeConfig::builder()
            .certificate(certified_key("server"))
            .build()
            .unwrap()
    }

    fn client_hello(seq: u16, cookie: &[u8]) -> Vec<u8> {
        let hello = ClientHello::new(
            ProtocolVersion::DTLS1_2,
            Random::default(),
            Cookie::try_new(cookie).unwrap(),
            vec![CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
            HelloExtensions::default(),
        );
        Handshake::new(seq, Body::ClientHello(hello)).to_bytes()
    }

    /// Server that answered ClientHello 0 with a HelloVerifyRequest.
    fn server_after_flight2() -> (State, HandshakeCache, HandshakeConfig) {
        let cfg = config();
        let mut state = State::new(false, Some(5));
        let mut cache = HandshakeCache::new();

        flight0::generate(&mut state, &cfg).unwrap();
        cache.push(client_hello(0, &[]), 0, 0, MessageType::ClientHello, true);
        assert_eq!(
            flight0::parse(&mut state, &cache, &cfg).unwrap(),
            Some(Flight::Flight2)
        );
        let packets = generate(&mut state, &mut cache).unwrap();
        assert_eq!(packets.len(), 1);

        (state, cache, cfg)
    }

    #[test]
    fn cookie_round_trip() {
        let (mut state, mut cache, cfg) = server_after_flight2();
        let cookie = state.cookie.clone();

        cache.push(client_hello(1, &cookie), 0, 1, MessageType::ClientHello, true);
        assert_eq!(
            parse(&mut state, &cache, &cfg).unwrap(),
            Some(Flight::Flight4)
        );
        assert_eq!(state.handshake_recv_sequence, 2);
    }

    #[test]
    fn cookie_mismatch_is_access_denied() {
        let (mut state, mut cache, cfg) = server_after_flight2();

        cache.push(client_hello(1, &[0xEE; 20]), 0, 1, MessageType::ClientHello, true);
        let err = parse(&mut state, &cache, &cfg).unwrap_err();
        assert_eq!(err, Error::CookieMismatch);
        assert_eq!(err.alert_description(), Some(AlertDescription::AccessDenied));
    }

    #[test]
    fn empty_cookie_keeps_waiting() {
        let (mut state, mut cache, cfg) = server_after_flight2();

        cache.push(client_hello(1, &[]), 0, 1, MessageType::ClientHello, true);
        assert_eq!(parse(&mut state, &cache, &cfg).unwrap(), None);
    }

    #[test]
    fn repeated_first_client_hello_restarts_flight2() {
        let (mut state, cache, cfg) = server_after_flight2();
        assert_eq!(
            parse(&mut state, &cache, &cfg).unwrap(),
            Some(Flight::Flight2)
        );
    }
}
