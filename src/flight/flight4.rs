use super::{
    cache_received, client_finished_rules, handshake_packet, Flight, CERTIFICATE_VERIFY_RULES,
    INITIAL_EPOCH,
};
use crate::cache::{HandshakeCache, PullRule, PulledMessages};
use crate::config::{ClientAuthType, HandshakeConfig};
use crate::conn::{FlightConn, Packet};
use crate::context::Context;
use crate::crypto::prf::{extended_master_secret, master_secret, verify_data_client};
use crate::crypto::{
    generate_key_signature, pre_master_secret, psk_pre_master_secret, select_signature_scheme,
    verify_certificate_verify,
};
use crate::message::extensions::{ECPointFormatsExtension, UseSrtpExtension};
use crate::message::{
    Asn1Cert, Body, Certificate, CertificateRequest, ClientCertificateType, DigitallySigned,
    HelloExtensions, MessageType, ProtocolVersion, ServerHello, ServerKeyExchange,
    SignatureAndHashAlgorithm,
};
use crate::state::State;
use crate::Error;

/// ServerHello through ServerHelloDone.
pub(super) fn generate(
    state: &mut State,
    cache: &mut HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Vec<Packet>, Error> {
    let mut extensions = HelloExtensions {
        renegotiation_info: true,
        extended_master_secret: state.extended_master_secret,
        ..Default::default()
    };
    if let Some(profile) = state.srtp_protection_profile {
        extensions.use_srtp = Some(UseSrtpExtension::new(&[profile]));
    }
    if !state.cipher_suite.is_psk() {
        extensions.ec_point_formats = Some(ECPointFormatsExtension::default());
    }

    let server_hello = ServerHello::new(
        ProtocolVersion::DTLS1_2,
        state.local_random,
        state.cipher_suite.id(),
        extensions,
    );
    let mut packets = vec![handshake_packet(
        state,
        cache,
        INITIAL_EPOCH,
        Body::ServerHello(server_hello),
    )];

    if state.cipher_suite.is_psk() {
        // The identity hint helps the client pick a key. Without one the
        // ServerKeyExchange is omitted.
        if let Some(hint) = cfg.psk_identity_hint() {
            packets.push(handshake_packet(
                state,
                cache,
                INITIAL_EPOCH,
                Body::ServerKeyExchange(ServerKeyExchange::psk(hint)),
            ));
        }
    } else {
        let certificate = match &state.local_certificate {
            Some(certificate) => certificate.clone(),
            None => cfg.certificate_for(&state.server_name)?,
        };

        let chain = certificate.certificate.iter().map(|c| Asn1Cert(c)).collect();
        packets.push(handshake_packet(
            state,
            cache,
            INITIAL_EPOCH,
            Body::Certificate(Certificate::new(chain)),
        ));

        let scheme = select_signature_scheme(cfg.signature_schemes(), &certificate.private_key)?;
        let Some(keypair) = &state.local_keypair else {
            return Err(Error::KeyExchange("No local key pair".to_string()));
        };
        let public_key = keypair.public_key.clone();
        let curve = keypair.curve;

        if state.local_key_signature.is_empty() {
            let (client_random, server_random) = state.randoms();
            state.local_key_signature = generate_key_signature(
                &client_random,
                &server_random,
                &public_key,
                curve,
                &certificate.private_key,
                scheme.hash,
                &mut state.rng,
            )?;
        }
        let signature = state.local_key_signature.clone();
        let server_key_exchange = ServerKeyExchange::ecdh(
            curve,
            &public_key,
            Some(DigitallySigned::new(scheme, &signature)),
        );
        packets.push(handshake_packet(
            state,
            cache,
            INITIAL_EPOCH,
            Body::ServerKeyExchange(server_key_exchange),
        ));

        if cfg.client_auth().requests_certificate() {
            // No authorities listed, the client may send any certificate.
            let request = CertificateRequest::new(
                vec![
                    ClientCertificateType::RSA_SIGN,
                    ClientCertificateType::ECDSA_SIGN,
                ],
                cfg.signature_schemes().to_vec(),
                Vec::new(),
            );
            packets.push(handshake_packet(
                state,
                cache,
                INITIAL_EPOCH,
                Body::CertificateRequest(request),
            ));
        }

        state.local_certificate = Some(certificate);
    }

    packets.push(handshake_packet(
        state,
        cache,
        INITIAL_EPOCH,
        Body::ServerHelloDone,
    ));

    Ok(packets)
}

/// The epoch 0 part of the client's flight 5, owned so the cache can be
/// written to while it is processed.
struct ClientFlight {
    certificate: Option<Vec<Vec<u8>>>,
    public_key: Option<Vec<u8>>,
    identity: Option<Vec<u8>>,
    certificate_verify: Option<(SignatureAndHashAlgorithm, Vec<u8>)>,
}

impl ClientFlight {
    fn from_pulled(msgs: &PulledMessages<'_>, psk: bool) -> Result<Self, Error> {
        let Some(client_key_exchange) = msgs.client_key_exchange(psk)? else {
            return Err(Error::UnexpectedMessage(
                "Expected ClientKeyExchange".to_string(),
            ));
        };

        Ok(ClientFlight {
            certificate: msgs
                .certificate()
                .map(|c| c.to_der_chain())
                .filter(|chain| !chain.is_empty()),
            public_key: client_key_exchange.public_key().map(|k| k.to_vec()),
            identity: client_key_exchange.identity().map(|i| i.to_vec()),
            certificate_verify: msgs.certificate_verify().map(|cv| {
                let signed = &cv.digitally_signed;
                (signed.algorithm, signed.signature.to_vec())
            }),
        })
    }
}

pub(super) fn parse(
    conn: &mut dyn FlightConn,
    ctx: &Context,
    state: &mut State,
    cache: &mut HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<Option<Flight>, Error> {
    let rules = [
        PullRule::new(MessageType::Certificate, INITIAL_EPOCH, true, true),
        PullRule::new(MessageType::ClientKeyExchange, INITIAL_EPOCH, true, false),
        PullRule::new(MessageType::CertificateVerify, INITIAL_EPOCH, true, true),
    ];
    let (seq, client) = {
        let Some((seq, msgs)) = cache.full_pull_map(state.handshake_recv_sequence, &rules) else {
            return Ok(None);
        };
        (seq, ClientFlight::from_pulled(&msgs, state.cipher_suite.is_psk())?)
    };

    if client.certificate.is_some() {
        state.remote_certificate = client.certificate;
    }

    match client.certificate_verify {
        Some((scheme, signature)) => {
            verify_client_certificate(state, cache, cfg, scheme, &signature)?;
        }
        None if state.remote_certificate.is_some() => {
            // The CertificateVerify for this certificate is still on its way.
            return Ok(None);
        }
        None => {}
    }

    if !state.cipher_suite.is_initialized() {
        init_cipher_suite(state, cache, cfg, client.public_key, client.identity)?;
    }

    // Records of epoch 1 can be decrypted now.
    let queued = conn.handle_queued_packets(ctx, state)?;
    cache_received(cache, state, queued);

    let finished_rule = [PullRule::new(
        MessageType::Finished,
        INITIAL_EPOCH + 1,
        true,
        false,
    )];
    let (seq, verify_data) = {
        let Some((seq, msgs)) = cache.full_pull_map(seq, &finished_rule) else {
            return Ok(None);
        };
        let Some(finished) = msgs.finished() else {
            return Err(Error::UnexpectedMessage("Expected Finished".to_string()));
        };
        (seq, finished.verify_data.to_vec())
    };

    let hash = state
        .cipher_suite
        .hash_algorithm()
        .ok_or(Error::InvalidCipherSuite)?;
    let transcript = cache.pull_and_merge(&client_finished_rules());
    let expected = verify_data_client(&state.master_secret, &transcript, hash)?;
    if expected != verify_data {
        return Err(Error::VerifyDataMismatch);
    }

    state.handshake_recv_sequence = seq;

    if !state.cipher_suite.is_psk() {
        check_client_auth(state, cfg.client_auth())?;
    }

    Ok(Some(Flight::Flight6))
}

/// Check the CertificateVerify signature, then the chain as far as the
/// client auth policy asks for it.
fn verify_client_certificate(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
    scheme: SignatureAndHashAlgorithm,
    signature: &[u8],
) -> Result<(), Error> {
    let Some(chain) = &state.remote_certificate else {
        return Err(Error::CertificateVerifyNoCertificate);
    };

    let transcript = cache.pull_and_merge(&CERTIFICATE_VERIFY_RULES);
    verify_certificate_verify(&transcript, scheme, signature, chain)?;

    let mut verified = false;
    let mut chains = Vec::new();
    if matches!(
        cfg.client_auth(),
        ClientAuthType::RequireAndVerifyClientCert | ClientAuthType::VerifyClientCertIfGiven
    ) {
        chains = cfg.client_cert_verifier().verify_client_cert(chain)?;
        verified = true;
    }

    if let Some(verify_peer_certificate) = cfg.verify_peer_certificate() {
        verify_peer_certificate(chain, &chains)
            .map_err(|e| Error::PeerCertificateRejected(e.to_string()))?;
    }

    state.remote_certificate_verified = verified;
    Ok(())
}

fn init_cipher_suite(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
    public_key: Option<Vec<u8>>,
    identity: Option<Vec<u8>>,
) -> Result<(), Error> {
    let pre_master = if state.cipher_suite.is_psk() {
        let Some(identity) = identity else {
            return Err(Error::UnexpectedMessage(
                "ClientKeyExchange without PSK identity".to_string(),
            ));
        };
        let Some(psk_callback) = cfg.psk() else {
            return Err(Error::Psk("No PSK callback configured".to_string()));
        };
        let psk = psk_callback(&identity)?;
        state.identity_hint = identity;
        psk_pre_master_secret(&psk)
    } else {
        let Some(public_key) = public_key else {
            return Err(Error::UnexpectedMessage(
                "ClientKeyExchange without public key".to_string(),
            ));
        };
        let Some(keypair) = &state.local_keypair else {
            return Err(Error::KeyExchange("No local key pair".to_string()));
        };
        pre_master_secret(&public_key, &keypair.private_key, keypair.curve)?
    };

    let hash = state
        .cipher_suite
        .hash_algorithm()
        .ok_or(Error::InvalidCipherSuite)?;
    let (client_random, server_random) = state.randoms();

    state.master_secret = if state.extended_master_secret {
        let session_hash = cache.session_hash(hash, INITIAL_EPOCH, &[])?;
        extended_master_secret(&pre_master, &session_hash, hash)?
    } else {
        master_secret(&pre_master, &client_random, &server_random, hash)?
    };
    state.pre_master_secret = pre_master;

    state
        .cipher_suite
        .init(&state.master_secret, &client_random, &server_random, false)?;
    debug!(
        "[handshake:server] cipher suite {} initialized",
        state.cipher_suite.name()
    );

    Ok(())
}

fn check_client_auth(state: &State, client_auth: ClientAuthType) -> Result<(), Error> {
    let presented = state.remote_certificate.is_some();
    let verified = state.remote_certificate_verified;

    match client_auth {
        ClientAuthType::RequireAndVerifyClientCert if !presented => {
            Err(Error::ClientCertificateRequired)
        }
        ClientAuthType::RequireAndVerifyClientCert if !verified => {
            Err(Error::ClientCertificateNotVerified)
        }
        ClientAuthType::VerifyClientCertIfGiven if presented && !verified => {
            Err(Error::ClientCertificateNotVerified)
        }
        ClientAuthType::RequireAnyClientCert if !presented => {
            Err(Error::ClientCertificateRequired)
        }
        _ => Ok(()),
    }
}
