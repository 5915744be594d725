use super::{
    client_finished_rules, finished_packets, handshake_packet, server_finished_rules, Flight,
    CERTIFICATE_VERIFY_RULES, INITIAL_EPOCH,
};
use crate::cache::{HandshakeCache, PullRule};
use crate::config::HandshakeConfig;
use crate::conn::Packet;
use crate::crypto::prf::{extended_master_secret, master_secret, verify_data_client, verify_data_server};
use crate::crypto::{
    generate_certificate_verify, select_signature_scheme, value_key_message, verify_key_signature,
};
use crate::message::{
    Asn1Cert, Body, Certificate, CertificateVerify, ClientKeyExchange, DigitallySigned,
    ExchangeKeys, Handshake, MessageType,
};
use crate::state::State;
use crate::Error;

/// Certificate?, ClientKeyExchange, CertificateVerify?, ChangeCipherSpec and
/// Finished.
pub(super) fn generate(
    state: &mut State,
    cache: &mut HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Vec<Packet>, Error> {
    let mut packets = Vec::new();

    let certificate = cfg.client_certificate().cloned();
    if state.remote_requested_certificate {
        // Without a certificate of our own the list stays empty.
        let chain = certificate
            .iter()
            .flat_map(|c| c.certificate.iter())
            .map(|c| Asn1Cert(c))
            .collect();
        packets.push(handshake_packet(
            state,
            cache,
            INITIAL_EPOCH,
            Body::Certificate(Certificate::new(chain)),
        ));
    }

    let public_key = state.local_keypair.as_ref().map(|k| k.public_key.clone());
    let exchange_keys = match &public_key {
        Some(public_key) => ExchangeKeys::Ecdh { public_key },
        None => ExchangeKeys::Psk {
            identity: cfg.psk_identity_hint().unwrap_or_default(),
        },
    };
    packets.push(handshake_packet(
        state,
        cache,
        INITIAL_EPOCH,
        Body::ClientKeyExchange(ClientKeyExchange::new(exchange_keys)),
    ));

    if !state.cipher_suite.is_initialized() {
        init_cipher_suite(state, cache, cfg)?;
    }

    if let Some(certificate) = certificate.filter(|_| state.remote_requested_certificate) {
        let schemes = requested_signature_schemes(cache)?;
        let scheme = select_signature_scheme(&schemes, &certificate.private_key)?;
        let transcript = cache.pull_and_merge(&CERTIFICATE_VERIFY_RULES);
        let signature = generate_certificate_verify(
            &transcript,
            &certificate.private_key,
            scheme.hash,
            &mut state.rng,
        )?;
        packets.push(handshake_packet(
            state,
            cache,
            INITIAL_EPOCH,
            Body::CertificateVerify(CertificateVerify::new(DigitallySigned::new(
                scheme, &signature,
            ))),
        ));
    }

    if state.local_verify_data.is_empty() {
        let hash = state
            .cipher_suite
            .hash_algorithm()
            .ok_or(Error::InvalidCipherSuite)?;
        let transcript = cache.pull_and_merge(&client_finished_rules());
        state.local_verify_data = verify_data_client(&state.master_secret, &transcript, hash)?;
    }

    packets.extend(finished_packets(state, cache));
    Ok(packets)
}

/// Signature algorithms the server listed in its CertificateRequest.
fn requested_signature_schemes(
    cache: &HandshakeCache,
) -> Result<Vec<crate::message::SignatureAndHashAlgorithm>, Error> {
    let raw = cache.pull_and_merge(&[PullRule::new(
        MessageType::CertificateRequest,
        INITIAL_EPOCH,
        false,
        false,
    )]);
    let (_, handshake) = Handshake::parse(&raw)?;
    match handshake.body {
        Body::CertificateRequest(request) => Ok(request.supported_signature_algorithms),
        _ => Err(Error::UnexpectedMessage(
            "Expected CertificateRequest".to_string(),
        )),
    }
}

/// Master secret, the server's key signature and certificate, then the
/// record keys.
fn init_cipher_suite(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<(), Error> {
    let hash = state
        .cipher_suite
        .hash_algorithm()
        .ok_or(Error::InvalidCipherSuite)?;
    let (client_random, server_random) = state.randoms();

    state.master_secret = if state.extended_master_secret {
        let session_hash = cache.session_hash(hash, INITIAL_EPOCH, &[])?;
        extended_master_secret(&state.pre_master_secret, &session_hash, hash)?
    } else {
        master_secret(&state.pre_master_secret, &client_random, &server_random, hash)?
    };

    if !state.cipher_suite.is_psk() {
        verify_server(state, cache, cfg, &client_random, &server_random)?;
    }

    state
        .cipher_suite
        .init(&state.master_secret, &client_random, &server_random, true)?;
    debug!(
        "[handshake:client] cipher suite {} initialized",
        state.cipher_suite.name()
    );

    Ok(())
}

/// Check the ServerKeyExchange signature and the server's chain.
fn verify_server(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
    client_random: &[u8],
    server_random: &[u8],
) -> Result<(), Error> {
    let raw = cache.pull_and_merge(&[PullRule::new(
        MessageType::ServerKeyExchange,
        INITIAL_EPOCH,
        false,
        false,
    )]);
    let (_, handshake) = Handshake::parse(&raw)?;
    let Body::ServerKeyExchange(server_key_exchange) = handshake.body else {
        return Err(Error::UnexpectedMessage(
            "Expected ServerKeyExchange".to_string(),
        ));
    };
    let Some(params) = server_key_exchange.ecdh_params() else {
        return Err(Error::UnexpectedMessage(
            "ServerKeyExchange without ECDH parameters".to_string(),
        ));
    };
    let Some(signed) = &params.signature else {
        return Err(Error::SignatureVerification(
            "ServerKeyExchange is not signed".to_string(),
        ));
    };

    if !cfg.signature_schemes().contains(&signed.algorithm) {
        return Err(Error::NoAvailableSignatureSchemes);
    }

    let Some(chain) = &state.remote_certificate else {
        return Err(Error::ServerCertificateMissing);
    };

    let message = value_key_message(
        client_random,
        server_random,
        params.public_key,
        params.named_curve,
    );
    verify_key_signature(&message, signed.algorithm, signed.signature, chain)?;

    let mut chains = Vec::new();
    if !cfg.insecure_skip_verify() {
        chains = cfg
            .server_cert_verifier()
            .verify_server_cert(chain, cfg.server_name())?;
    }
    if let Some(verify_peer_certificate) = cfg.verify_peer_certificate() {
        verify_peer_certificate(chain, &chains)
            .map_err(|e| Error::PeerCertificateRejected(e.to_string()))?;
    }

    state.remote_certificate_verified = !cfg.insecure_skip_verify();
    Ok(())
}

pub(super) fn parse(state: &mut State, cache: &HandshakeCache) -> Result<Option<Flight>, Error> {
    let rule = [PullRule::new(
        MessageType::Finished,
        INITIAL_EPOCH + 1,
        false,
        false,
    )];
    let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &rule) else {
        return Ok(None);
    };
    let Some(finished) = msgs.finished() else {
        return Err(Error::UnexpectedMessage("Expected Finished".to_string()));
    };

    let hash = state
        .cipher_suite
        .hash_algorithm()
        .ok_or(Error::InvalidCipherSuite)?;
    let transcript = cache.pull_and_merge(&server_finished_rules());
    let expected = verify_data_server(&state.master_secret, &transcript, hash)?;
    if expected != finished.verify_data {
        return Err(Error::VerifyDataMismatch);
    }

    state.handshake_recv_sequence = seq;
    Ok(Some(Flight::Flight5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;
    use crate::cipher_suite::{CipherSuite, CipherSuiteId};
    use crate::message::Finished;

    fn psk_state() -> State {
        let mut state = State::new(true, Some(9));
        state.cipher_suite = CipherSuite::new(CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256)
            .unwrap();
        state.pre_master_secret = crate::crypto::psk_pre_master_secret(&[1, 2, 3]);
        state.handshake_recv_sequence = 2;
        state.handshake_send_sequence = 1;
        state
    }

    #[test]
    fn psk_flight_layout() {
        let cfg = HandshakeConfig::builder()
            .psk(std::sync::Arc::new(|_: &[u8]| Ok::<_, Error>(vec![1, 2, 3])))
            .psk_identity_hint(b"client")
            .build()
            .unwrap();
        let mut state = psk_state();
        let mut cache = HandshakeCache::new();

        let packets = generate(&mut state, &mut cache, &cfg).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].epoch, 0);
        assert_eq!(packets[1], Packet::change_cipher_spec());
        assert_eq!(packets[2].epoch, 1);
        assert!(packets[2].should_encrypt);
        assert!(packets[2].reset_local_sequence_number);

        assert!(state.cipher_suite.is_initialized());
        assert_eq!(state.local_verify_data.len(), 12);
        assert_eq!(state.handshake_send_sequence, 3);
    }

    #[test]
    fn wrong_server_finished() {
        let cfg = HandshakeConfig::builder()
            .psk(std::sync::Arc::new(|_: &[u8]| Ok::<_, Error>(vec![1, 2, 3])))
            .build()
            .unwrap();
        let mut state = psk_state();
        let mut cache = HandshakeCache::new();
        generate(&mut state, &mut cache, &cfg).unwrap();

        let finished = Handshake::new(2, Body::Finished(Finished::new(&[0; 12]))).to_bytes();
        cache.push(finished, 1, 2, MessageType::Finished, false);

        let err = parse(&mut state, &cache).unwrap_err();
        assert_eq!(err, Error::VerifyDataMismatch);
        assert_eq!(err.alert_description(), Some(AlertDescription::HandshakeFailure));
    }
}
