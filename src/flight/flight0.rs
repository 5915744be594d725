use super::{find_matching_srtp_profile, Flight, INITIAL_EPOCH};
use crate::cache::{HandshakeCache, PullRule};
use crate::cipher_suite::{find_matching, CipherSuite, CipherSuiteId};
use crate::config::{ExtendedMasterSecretType, HandshakeConfig};
use crate::conn::Packet;
use crate::crypto::{generate_keypair, NamedCurve};
use crate::message::{ClientHello, Cookie, MessageType, ProtocolVersion, Random};
use crate::state::State;
use crate::Error;

/// Server at rest, waiting for the first ClientHello.
pub(super) fn generate(state: &mut State, cfg: &HandshakeConfig) -> Result<Vec<Packet>, Error> {
    state.cookie = Cookie::random(&mut state.rng, cfg.cookie_length()).to_vec();
    state.named_curve = NamedCurve::default();
    state.local_random = Random::new(&mut state.rng);

    Ok(Vec::new())
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

    // The client may resend its first ClientHello when our
    // HelloVerifyRequest was lost, so always look from sequence 0.
    let Some((seq, msgs)) = cache.full_pull_map(0, &rules) else {
        return Ok(None);
    };
    let Some(client_hello) = msgs.client_hello() else {
        return Err(Error::UnexpectedMessage("Expected ClientHello".to_string()));
    };

    state.handshake_recv_sequence = seq;

    if client_hello.client_version != ProtocolVersion::DTLS1_2 {
        return Err(Error::UnsupportedProtocolVersion);
    }

    state.remote_random = client_hello.random;

    negotiate_extensions(state, client_hello, cfg)?;
    negotiate_cipher_suite(state, client_hello, cfg)?;

    if !state.cipher_suite.is_psk() && state.local_keypair.is_none() {
        state.local_keypair = Some(generate_keypair(state.named_curve, &mut state.rng)?);
    }

    if cfg.insecure_skip_hello_verify() {
        Ok(Some(Flight::Flight4))
    } else {
        Ok(Some(Flight::Flight2))
    }
}

fn negotiate_extensions(
    state: &mut State,
    client_hello: &ClientHello,
    cfg: &HandshakeConfig,
) -> Result<(), Error> {
    let extensions = &client_hello.extensions;

    if let Some(groups) = &extensions.supported_groups {
        state.named_curve = groups
            .groups
            .iter()
            .find(|c| c.is_supported() && cfg.named_curves().contains(c))
            .copied()
            .ok_or(Error::NoSupportedEllipticCurves)?;
    }

    let local_profiles = cfg.srtp_protection_profiles();
    if let (Some(use_srtp), false) = (&extensions.use_srtp, local_profiles.is_empty()) {
        let profile = find_matching_srtp_profile(&use_srtp.profiles, local_profiles)
            .ok_or(Error::ServerNoMatchingSrtpProfile)?;
        state.srtp_protection_profile = Some(profile);
    }

    if extensions.extended_master_secret
        && cfg.extended_master_secret() != ExtendedMasterSecretType::Disable
    {
        state.extended_master_secret = true;
    }
    if cfg.extended_master_secret() == ExtendedMasterSecretType::Require
        && !state.extended_master_secret
    {
        return Err(Error::ServerRequiredButNoClientEms);
    }

    if let Some(server_name) = &extensions.server_name {
        state.server_name = server_name.host_name.clone();
    }

    Ok(())
}

/// Pick the first client suite we support. In certificate mode only suites
/// matching the type of our key are candidates.
fn negotiate_cipher_suite(
    state: &mut State,
    client_hello: &ClientHello,
    cfg: &HandshakeConfig,
) -> Result<(), Error> {
    let local: Vec<CipherSuiteId> = if cfg.is_psk() {
        cfg.cipher_suites().to_vec()
    } else {
        let certificate = cfg.certificate_for(&state.server_name)?;
        let key_type = certificate.private_key.certificate_type();
        state.local_certificate = Some(certificate);
        cfg.cipher_suites()
            .iter()
            .filter(|id| id.certificate_type() == Some(key_type))
            .copied()
            .collect()
    };

    let id = find_matching(&client_hello.cipher_suites, &local)
        .ok_or(Error::CipherSuiteNoIntersection)?;
    state.cipher_suite = CipherSuite::new(id)?;
    trace!("[handshake:server] use cipher suite: {}", id);

    Ok(())
}
