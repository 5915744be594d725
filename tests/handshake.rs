mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use flightdtls::{
    AlertDescription, CipherSuiteId, ClientAuthType, Context, Error, HandshakeConfig,
    HandshakeConfigBuilder, HandshakeFsm, HandshakeState, SrtpProtectionProfile, State,
};

fn config() -> HandshakeConfigBuilder {
    HandshakeConfig::builder()
        .flight_start_rto(Duration::from_millis(500))
        .flight_retries(6)
        .handshake_timeout(Duration::from_secs(10))
}

fn assert_same_session(client: &State, server: &State) {
    assert_eq!(client.master_secret().len(), 48);
    assert_eq!(client.master_secret(), server.master_secret());
    assert_eq!(client.cipher_suite().id(), server.cipher_suite().id());
    assert_eq!(client.local_random(), server.remote_random());
    assert_eq!(client.remote_random(), server.local_random());
    assert_eq!(client.local_epoch(), 1);
    assert_eq!(server.local_epoch(), 1);
}

#[test]
fn certificate_handshake() {
    init_log();
    let (server_der, server_key) = certificate("localhost");

    let server_cfg = config()
        .certificate(server_key)
        .srtp_protection_profiles(&[SrtpProtectionProfile::AeadAes128Gcm])
        .build()
        .unwrap();
    let client_cfg = config()
        .root_cas(vec![server_der.clone()])
        .server_name("localhost")
        .srtp_protection_profiles(&[
            SrtpProtectionProfile::Aes128CmHmacSha1_80,
            SrtpProtectionProfile::AeadAes128Gcm,
        ])
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 1);
    let client = outcome.client.unwrap();
    let server = outcome.server.unwrap();

    assert_same_session(&client, &server);
    assert_eq!(
        client.cipher_suite().id(),
        CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    );
    assert!(client.extended_master_secret());
    assert!(server.extended_master_secret());
    assert_eq!(client.remote_certificate(), Some(&[server_der][..]));
    assert!(client.remote_certificate_verified());
    assert_eq!(server.server_name(), "localhost");
    assert_eq!(
        client.srtp_protection_profile(),
        Some(SrtpProtectionProfile::AeadAes128Gcm)
    );
    assert_eq!(
        server.srtp_protection_profile(),
        Some(SrtpProtectionProfile::AeadAes128Gcm)
    );
    assert_eq!(client.named_curve(), server.named_curve());

    // Clean channel, every flight goes out exactly once.
    assert_eq!(outcome.client_conn.flights_written, 3);
    assert_eq!(outcome.server_conn.flights_written, 3);
    assert!(outcome.client_conn.alerts_sent.is_empty());
    assert!(outcome.server_conn.alerts_sent.is_empty());
}

#[test]
fn psk_handshake() {
    init_log();
    let server_cfg = config()
        .psk(Arc::new(|identity: &[u8]| {
            assert_eq!(identity, b"client");
            Ok::<_, Error>(vec![0xAB, 0xC1, 0x23])
        }))
        .psk_identity_hint(b"hint!")
        .build()
        .unwrap();
    let client_cfg = config()
        .psk(Arc::new(|hint: &[u8]| {
            assert_eq!(hint, b"hint!");
            Ok::<_, Error>(vec![0xAB, 0xC1, 0x23])
        }))
        .psk_identity_hint(b"client")
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 2);
    let client = outcome.client.unwrap();
    let server = outcome.server.unwrap();

    assert_same_session(&client, &server);
    assert_eq!(
        client.cipher_suite().id(),
        CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256
    );
    assert_eq!(client.identity_hint(), b"hint!");
    assert_eq!(server.identity_hint(), b"client");
    assert!(client.remote_certificate().is_none());
}

#[test]
fn psk_mismatch() {
    init_log();
    let server_cfg = config()
        .psk(Arc::new(|_: &[u8]| Ok::<_, Error>(vec![1, 2, 3])))
        .handshake_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client_cfg = config()
        .psk(Arc::new(|_: &[u8]| Ok::<_, Error>(vec![3, 2, 1])))
        .handshake_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 3);

    // Different keys, so neither side can open the other's Finished.
    assert!(outcome.client.unwrap_err().is_timeout());
    assert!(outcome.server.unwrap_err().is_timeout());
}

#[test]
fn verified_client_certificate() {
    init_log();
    let (server_der, server_key) = certificate("localhost");
    let (client_der, client_key) = certificate("client");

    let server_cfg = config()
        .certificate(server_key)
        .client_auth(ClientAuthType::RequireAndVerifyClientCert)
        .client_cas(vec![client_der.clone()])
        .build()
        .unwrap();
    let client_cfg = config()
        .certificate(client_key)
        .root_cas(vec![server_der])
        .server_name("localhost")
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 4);
    let client = outcome.client.unwrap();
    let server = outcome.server.unwrap();

    assert_same_session(&client, &server);
    assert_eq!(server.remote_certificate(), Some(&[client_der][..]));
    assert!(server.remote_certificate_verified());
}

#[test]
fn missing_client_certificate() {
    init_log();
    let (server_der, server_key) = certificate("localhost");

    let server_cfg = config()
        .certificate(server_key)
        .client_auth(ClientAuthType::RequireAnyClientCert)
        .build()
        .unwrap();
    let client_cfg = config()
        .root_cas(vec![server_der])
        .server_name("localhost")
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 5);

    assert_eq!(outcome.server.err(), Some(Error::ClientCertificateRequired));
    assert_eq!(
        outcome.client.err(),
        Some(Error::AlertReceived(AlertDescription::NoCertificate))
    );
    assert_eq!(
        outcome.server_conn.alerts_sent,
        vec![AlertDescription::NoCertificate]
    );
}

#[test]
fn untrusted_server_certificate() {
    init_log();
    let (_, server_key) = certificate("localhost");
    let (other_der, _) = certificate("localhost");

    let server_cfg = config()
        .certificate(server_key)
        .handshake_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client_cfg = config()
        .root_cas(vec![other_der])
        .server_name("localhost")
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 6);

    assert!(matches!(
        outcome.client.err(),
        Some(Error::CertificateVerification(_))
    ));
    assert_eq!(
        outcome.client_conn.alerts_sent,
        vec![AlertDescription::BadCertificate]
    );
    assert_eq!(
        outcome.server.err(),
        Some(Error::AlertReceived(AlertDescription::BadCertificate))
    );
}

#[test]
fn untrusted_client_certificate() {
    init_log();
    let (server_der, server_key) = certificate("localhost");
    let (_, client_key) = certificate("client");
    let (other_der, _) = certificate("client");

    let server_cfg = config()
        .certificate(server_key)
        .client_auth(ClientAuthType::RequireAndVerifyClientCert)
        .client_cas(vec![other_der])
        .build()
        .unwrap();
    let client_cfg = config()
        .certificate(client_key)
        .root_cas(vec![server_der])
        .server_name("localhost")
        .handshake_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 12);

    assert!(matches!(
        outcome.server.err(),
        Some(Error::CertificateVerification(_))
    ));
    assert_eq!(
        outcome.server_conn.alerts_sent,
        vec![AlertDescription::BadCertificate]
    );
    assert_eq!(
        outcome.client.err(),
        Some(Error::AlertReceived(AlertDescription::BadCertificate))
    );
    assert!(outcome.client_conn.alerts_sent.is_empty());
}

#[test]
fn no_shared_cipher_suite() {
    init_log();
    let (_, server_key) = certificate("localhost");

    // An ECDSA certificate rules out the RSA suites.
    let server_cfg = config()
        .certificate(server_key)
        .build()
        .unwrap();
    let client_cfg = config()
        .cipher_suites(&[CipherSuiteId::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256])
        .insecure_skip_verify(true)
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 7);

    assert_eq!(outcome.server.err(), Some(Error::CipherSuiteNoIntersection));
    assert_eq!(
        outcome.client.err(),
        Some(Error::AlertReceived(AlertDescription::InsufficientSecurity))
    );
}

#[test]
fn without_hello_verify() {
    init_log();
    let (_, server_key) = certificate("localhost");

    let server_cfg = config()
        .certificate(server_key)
        .insecure_skip_hello_verify(true)
        .build()
        .unwrap();
    let client_cfg = config()
        .insecure_skip_verify(true)
        .build()
        .unwrap();

    let outcome = handshake(client_cfg, server_cfg, |_, _| {}, Impairment::none(), 8);
    let client = outcome.client.unwrap();
    let server = outcome.server.unwrap();

    assert_same_session(&client, &server);
    assert!(!client.remote_certificate_verified());
    // ClientHello, then Certificate, ClientKeyExchange and Finished.
    assert_eq!(outcome.client_conn.flights_written, 2);
}

#[test]
fn lost_server_finished_is_resent() {
    init_log();
    let (_, server_key) = certificate("localhost");

    let server_cfg = config()
        .certificate(server_key)
        .build()
        .unwrap();
    let client_cfg = config()
        .insecure_skip_verify(true)
        .build()
        .unwrap();

    let outcome = handshake(
        client_cfg,
        server_cfg,
        |_, server| server.drop_encrypted_handshakes(1),
        Impairment::none(),
        9,
    );
    let client = outcome.client.unwrap();
    let server = outcome.server.unwrap();

    assert_same_session(&client, &server);
    // The client repeated flight 5 and the lingering server answered it.
    assert!(outcome.client_conn.flights_written >= 4);
    assert!(outcome.server_conn.flights_written >= 4);

    // Answering from linger resends flight 6 as it was, nothing is derived again.
    let finished = outcome.server_finished.unwrap();
    assert_eq!(finished.local_verify_data.len(), 12);
    assert_eq!(server.master_secret(), finished.master_secret);
    assert_eq!(server.local_verify_data(), finished.local_verify_data);
    assert_eq!(outcome.server_after_linger, Some(HandshakeState::Finished));
}

#[test]
fn lossy_channel() {
    init_log();
    let (server_der, server_key) = certificate("localhost");

    let impairment = Impairment {
        loss: 0.1,
        duplicate: 0.2,
        reorder: 0.2,
    };

    for seed in 0..4 {
        let server_cfg = config()
            .certificate(server_key.clone())
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed)
            .build()
            .unwrap();
        let client_cfg = config()
            .root_cas(vec![server_der.clone()])
            .server_name("localhost")
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed + 100)
            .build()
            .unwrap();

        let outcome = handshake(client_cfg, server_cfg, |_, _| {}, impairment, seed);
        let client = outcome.client.unwrap();
        let server = outcome.server.unwrap();
        assert_same_session(&client, &server);
    }
}

#[test]
fn psk_lossy_channel() {
    init_log();
    let impairment = Impairment {
        loss: 0.1,
        duplicate: 0.2,
        reorder: 0.2,
    };

    for seed in 0..4 {
        let server_cfg = config()
            .psk(Arc::new(|identity: &[u8]| {
                assert_eq!(identity, b"client");
                Ok::<_, Error>(vec![0xAB, 0xC1, 0x23])
            }))
            .psk_identity_hint(b"hint!")
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed)
            .build()
            .unwrap();
        let client_cfg = config()
            .psk(Arc::new(|_: &[u8]| Ok::<_, Error>(vec![0xAB, 0xC1, 0x23])))
            .psk_identity_hint(b"client")
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed + 100)
            .build()
            .unwrap();

        let outcome = handshake(client_cfg, server_cfg, |_, _| {}, impairment, seed + 20);
        let client = outcome.client.unwrap();
        let server = outcome.server.unwrap();
        assert_same_session(&client, &server);
        assert_eq!(client.identity_hint(), b"hint!");
        assert_eq!(server.identity_hint(), b"client");
    }
}

#[test]
fn client_auth_lossy_channel() {
    init_log();
    let (server_der, server_key) = certificate("localhost");
    let (client_der, client_key) = certificate("client");

    let impairment = Impairment {
        loss: 0.1,
        duplicate: 0.2,
        reorder: 0.2,
    };

    for seed in 0..4 {
        let server_cfg = config()
            .certificate(server_key.clone())
            .client_auth(ClientAuthType::RequireAndVerifyClientCert)
            .client_cas(vec![client_der.clone()])
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed)
            .build()
            .unwrap();
        let client_cfg = config()
            .certificate(client_key.clone())
            .root_cas(vec![server_der.clone()])
            .server_name("localhost")
            .flight_start_rto(Duration::from_millis(50))
            .flight_retries(10)
            .rng_seed(seed + 100)
            .build()
            .unwrap();

        let outcome = handshake(client_cfg, server_cfg, |_, _| {}, impairment, seed + 40);
        let client = outcome.client.unwrap();
        let server = outcome.server.unwrap();
        assert_same_session(&client, &server);
        assert_eq!(server.remote_certificate(), Some(&[client_der.clone()][..]));
        assert!(server.remote_certificate_verified());
    }
}

#[test]
fn cancelled_client() {
    init_log();
    let (mut client_conn, _server_conn) = pipe(Impairment::none(), 10);
    let cfg = config()
        .flight_start_rto(Duration::from_millis(50))
        .build()
        .unwrap();

    let ctx = Context::new();
    let token = ctx.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        token.cancel();
    });

    let mut fsm = HandshakeFsm::client(cfg);
    let err = fsm.run(&mut client_conn, &ctx).unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err, Error::Cancelled);
    assert!(err.is_cancelled());
    assert!(client_conn.alerts_sent.is_empty());
    assert!(client_conn.flights_written >= 1);
}

#[test]
fn unanswered_client_gives_up() {
    init_log();
    let (mut client_conn, _server_conn) = pipe(Impairment::none(), 11);
    let cfg = HandshakeConfig::builder()
        .flight_start_rto(Duration::from_millis(10))
        .flight_retries(2)
        .build()
        .unwrap();

    let mut fsm = HandshakeFsm::client(cfg);
    let err = fsm.run(&mut client_conn, &Context::new()).unwrap_err();

    assert_eq!(err, Error::RetransmitLimit);
    assert!(err.is_timeout());
    assert_eq!(client_conn.flights_written, 3);
}
