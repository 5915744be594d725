use super::flight1::accept_hello_verify;
use super::{client_hello, find_matching_srtp_profile, handshake_packet, Flight, INITIAL_EPOCH};
use crate::cache::{HandshakeCache, PullRule};
use crate::cipher_suite::CipherSuite;
use crate::config::{ExtendedMasterSecretType, HandshakeConfig};
use crate::conn::Packet;
use crate::crypto::{generate_keypair, pre_master_secret, psk_pre_master_secret};
use crate::message::{Body, MessageType, ProtocolVersion, ServerHello, ServerKeyExchange};
use crate::state::State;
use crate::Error;

/// ClientHello again, now with the server's cookie.
pub(super) fn generate(
    state: &mut State,
    cache: &mut HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Vec<Packet>, Error> {
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
    // A server may answer the new ClientHello with yet another cookie,
    // RFC 6347 Section 4.2.1.
    let hello_verify_rule = [PullRule::new(
        MessageType::HelloVerifyRequest,
        INITIAL_EPOCH,
        false,
        true,
    )];
    if let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &hello_verify_rule)
    {
        if let Some(hello_verify) = msgs.hello_verify_request() {
            accept_hello_verify(state, hello_verify.server_version, &hello_verify.cookie)?;
            state.handshake_recv_sequence = seq;
            return Ok(Some(Flight::Flight3));
        }
    }

    let server_hello_rule = [PullRule::new(
        MessageType::ServerHello,
        INITIAL_EPOCH,
        false,
        false,
    )];
    let Some((_, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &server_hello_rule)
    else {
        return Ok(None);
    };
    let Some(server_hello) = msgs.server_hello() else {
        return Err(Error::UnexpectedMessage("Expected ServerHello".to_string()));
    };
    handle_server_hello(state, server_hello, cfg)?;

    let rules = server_flight_rules(state.cipher_suite.is_psk());
    let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &rules) else {
        // Part of the server's flight is still missing.
        return Ok(None);
    };
    state.handshake_recv_sequence = seq;

    if let Some(certificate) = msgs.certificate() {
        state.remote_certificate = Some(certificate.to_der_chain());
    } else if !state.cipher_suite.is_psk() {
        return Err(Error::ServerCertificateMissing);
    }

    let server_key_exchange = msgs.server_key_exchange(state.cipher_suite.is_psk())?;
    handle_server_key_exchange(state, server_key_exchange.as_ref(), cfg)?;

    state.remote_requested_certificate = msgs.contains(MessageType::CertificateRequest);

    Ok(Some(Flight::Flight5))
}

fn server_flight_rules(is_psk: bool) -> Vec<PullRule> {
    if is_psk {
        vec![
            PullRule::new(MessageType::ServerHello, INITIAL_EPOCH, false, false),
            PullRule::new(MessageType::ServerKeyExchange, INITIAL_EPOCH, false, true),
            PullRule::new(MessageType::ServerHelloDone, INITIAL_EPOCH, false, false),
        ]
    } else {
        vec![
            PullRule::new(MessageType::ServerHello, INITIAL_EPOCH, false, false),
            PullRule::new(MessageType::Certificate, INITIAL_EPOCH, false, true),
            PullRule::new(MessageType::ServerKeyExchange, INITIAL_EPOCH, false, false),
            PullRule::new(MessageType::CertificateRequest, INITIAL_EPOCH, false, true),
            PullRule::new(MessageType::ServerHelloDone, INITIAL_EPOCH, false, false),
        ]
    }
}

fn handle_server_hello(
    state: &mut State,
    server_hello: &ServerHello,
    cfg: &HandshakeConfig,
) -> Result<(), Error> {
    if server_hello.server_version != ProtocolVersion::DTLS1_2 {
        return Err(Error::UnsupportedProtocolVersion);
    }

    let extensions = &server_hello.extensions;

    state.srtp_protection_profile = None;
    if let Some(use_srtp) = &extensions.use_srtp {
        let profile = find_matching_srtp_profile(&use_srtp.profiles, cfg.srtp_protection_profiles())
            .ok_or(Error::ClientNoMatchingSrtpProfile)?;
        state.srtp_protection_profile = Some(profile);
    }

    state.extended_master_secret = extensions.extended_master_secret
        && cfg.extended_master_secret() != ExtendedMasterSecretType::Disable;

    if cfg.extended_master_secret() == ExtendedMasterSecretType::Require
        && !state.extended_master_secret
    {
        return Err(Error::ClientRequiredButNoServerEms);
    }
    if !cfg.srtp_protection_profiles().is_empty() && state.srtp_protection_profile.is_none() {
        return Err(Error::RequestedButNoSrtpExtension);
    }

    let id = server_hello.cipher_suite;
    if !id.is_supported() {
        return Err(Error::CipherSuiteNoIntersection);
    }
    if !cfg.cipher_suites().contains(&id) {
        return Err(Error::InvalidCipherSuite);
    }
    state.cipher_suite = CipherSuite::new(id)?;
    state.remote_random = server_hello.random;
    trace!("[handshake:client] use cipher suite: {}", id);

    Ok(())
}

/// Derive the premaster secret from the server's key exchange parameters,
/// or from the PSK. A PSK server may omit the ServerKeyExchange entirely.
fn handle_server_key_exchange(
    state: &mut State,
    server_key_exchange: Option<&ServerKeyExchange<'_>>,
    cfg: &HandshakeConfig,
) -> Result<(), Error> {
    if let Some(psk_callback) = cfg.psk() {
        let hint = server_key_exchange
            .and_then(|ske| ske.identity_hint())
            .unwrap_or_default();
        let psk = psk_callback(hint)?;
        state.identity_hint = hint.to_vec();
        state.pre_master_secret = psk_pre_master_secret(&psk);
        return Ok(());
    }

    let Some(params) = server_key_exchange.and_then(|ske| ske.ecdh_params()) else {
        return Err(Error::UnexpectedMessage(
            "ServerKeyExchange without ECDH parameters".to_string(),
        ));
    };

    let curve = params.named_curve;
    if !curve.is_supported() || !cfg.named_curves().contains(&curve) {
        return Err(Error::InvalidNamedCurve(curve.as_u16()));
    }

    let keypair = generate_keypair(curve, &mut state.rng)?;
    state.pre_master_secret = pre_master_secret(params.public_key, &keypair.private_key, curve)?;
    state.named_curve = curve;
    state.local_keypair = Some(keypair);

    Ok(())
}
