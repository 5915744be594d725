use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cipher_suite::CipherSuiteId;
use crate::crypto::{CertificateVerifier, CertifiedKey, NamedCurve, RootStoreVerifier};
use crate::message::extensions::SrtpProtectionProfile;
use crate::message::{Cookie, SignatureAndHashAlgorithm};
use crate::Error;

/// Looks up the pre-shared key for an identity hint (client) or identity (server).
pub type PskCallback = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, Error> + Send + Sync>;

/// Picks the server certificate for the SNI name the client sent.
pub type GetCertificate = Arc<dyn Fn(&str) -> Result<CertifiedKey, Error> + Send + Sync>;

/// Extra check of the peer chain, called with the raw chain and the verified chains.
pub type VerifyPeerCertificate =
    Arc<dyn Fn(&[Vec<u8>], &[Vec<Vec<u8>>]) -> Result<(), Error> + Send + Sync>;

/// Server policy for client certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthType {
    /// Do not ask for a certificate.
    #[default]
    NoClientCert,
    /// Ask, but do not require or verify.
    RequestClientCert,
    /// Require a certificate but do not verify it.
    RequireAnyClientCert,
    /// Verify the certificate if the client sends one.
    VerifyClientCertIfGiven,
    /// Require a certificate and verify it.
    RequireAndVerifyClientCert,
}

impl ClientAuthType {
    pub fn requests_certificate(&self) -> bool {
        !matches!(self, ClientAuthType::NoClientCert)
    }
}

/// Policy for the extended master secret extension (RFC 7627).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedMasterSecretType {
    /// Offer the extension and use it if the peer does.
    #[default]
    Request,
    /// Fail the handshake unless the peer supports it.
    Require,
    /// Never offer or accept it.
    Disable,
}

/// Handshake configuration, shared by the client and server roles.
#[derive(Clone)]
pub struct HandshakeConfig {
    cipher_suites: Vec<CipherSuiteId>,
    certificates: Vec<CertifiedKey>,
    get_certificate: Option<GetCertificate>,
    psk: Option<PskCallback>,
    psk_identity_hint: Option<Vec<u8>>,
    client_auth: ClientAuthType,
    extended_master_secret: ExtendedMasterSecretType,
    srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    server_name: String,
    insecure_skip_verify: bool,
    insecure_skip_hello_verify: bool,
    server_cert_verifier: Arc<dyn CertificateVerifier>,
    client_cert_verifier: Arc<dyn CertificateVerifier>,
    verify_peer_certificate: Option<VerifyPeerCertificate>,
    signature_schemes: Vec<SignatureAndHashAlgorithm>,
    named_curves: Vec<NamedCurve>,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    cookie_length: usize,
    rng_seed: Option<u64>,
}

impl HandshakeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HandshakeConfigBuilder {
        HandshakeConfigBuilder {
            cipher_suites: CipherSuiteId::all().to_vec(),
            certificates: Vec::new(),
            get_certificate: None,
            psk: None,
            psk_identity_hint: None,
            client_auth: ClientAuthType::default(),
            extended_master_secret: ExtendedMasterSecretType::default(),
            srtp_protection_profiles: Vec::new(),
            server_name: String::new(),
            insecure_skip_verify: false,
            insecure_skip_hello_verify: false,
            root_cas: Vec::new(),
            client_cas: Vec::new(),
            server_cert_verifier: None,
            client_cert_verifier: None,
            verify_peer_certificate: None,
            signature_schemes: SignatureAndHashAlgorithm::supported().to_vec(),
            named_curves: NamedCurve::supported().to_vec(),
            flight_start_rto: Duration::from_secs(1),
            flight_retries: 7,
            handshake_timeout: Duration::from_secs(30),
            cookie_length: 20,
            rng_seed: None,
        }
    }

    /// Cipher suites we offer (client) or accept (server), in preference order.
    ///
    /// Already filtered by authentication mode.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuiteId] {
        &self.cipher_suites
    }

    /// Local certificate chains with their private keys.
    #[inline(always)]
    pub fn certificates(&self) -> &[CertifiedKey] {
        &self.certificates
    }

    #[inline(always)]
    pub fn psk(&self) -> Option<&PskCallback> {
        self.psk.as_ref()
    }

    #[inline(always)]
    pub fn psk_identity_hint(&self) -> Option<&[u8]> {
        self.psk_identity_hint.as_deref()
    }

    #[inline(always)]
    pub fn client_auth(&self) -> ClientAuthType {
        self.client_auth
    }

    #[inline(always)]
    pub fn extended_master_secret(&self) -> ExtendedMasterSecretType {
        self.extended_master_secret
    }

    /// SRTP profiles in preference order. Empty disables use_srtp.
    #[inline(always)]
    pub fn srtp_protection_profiles(&self) -> &[SrtpProtectionProfile] {
        &self.srtp_protection_profiles
    }

    /// Name the client sends as SNI and checks the server certificate against.
    #[inline(always)]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Client: accept any server certificate.
    #[inline(always)]
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    /// Server: skip the HelloVerifyRequest cookie exchange.
    #[inline(always)]
    pub fn insecure_skip_hello_verify(&self) -> bool {
        self.insecure_skip_hello_verify
    }

    #[inline(always)]
    pub fn server_cert_verifier(&self) -> &dyn CertificateVerifier {
        self.server_cert_verifier.as_ref()
    }

    #[inline(always)]
    pub fn client_cert_verifier(&self) -> &dyn CertificateVerifier {
        self.client_cert_verifier.as_ref()
    }

    #[inline(always)]
    pub fn verify_peer_certificate(&self) -> Option<&VerifyPeerCertificate> {
        self.verify_peer_certificate.as_ref()
    }

    /// Signature schemes we offer and sign with.
    #[inline(always)]
    pub fn signature_schemes(&self) -> &[SignatureAndHashAlgorithm] {
        &self.signature_schemes
    }

    /// ECDHE curves in preference order.
    #[inline(always)]
    pub fn named_curves(&self) -> &[NamedCurve] {
        &self.named_curves
    }

    /// Time of first retransmission.
    ///
    /// Every flight restarts with this value and it doubles for every retry.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Max number of retransmissions per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Length of the cookies the server hands out.
    #[inline(always)]
    pub fn cookie_length(&self) -> usize {
        self.cookie_length
    }

    /// Seed for randoms, cookies and retransmission jitter.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Whether the configuration authenticates with a pre-shared key.
    pub fn is_psk(&self) -> bool {
        self.psk.is_some()
    }

    /// The certificate the server presents for `server_name`.
    pub fn certificate_for(&self, server_name: &str) -> Result<CertifiedKey, Error> {
        if let Some(get_certificate) = &self.get_certificate {
            return get_certificate(server_name);
        }
        self.certificates
            .first()
            .cloned()
            .ok_or(Error::NoCertificates)
    }

    /// Whether a server could present a certificate at all.
    pub fn has_certificate(&self) -> bool {
        !self.certificates.is_empty() || self.get_certificate.is_some()
    }

    /// The certificate a client presents when asked for one.
    pub fn client_certificate(&self) -> Option<&CertifiedKey> {
        self.certificates.first()
    }
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("cipher_suites", &self.cipher_suites)
            .field("certificates", &self.certificates.len())
            .field("psk", &self.psk.is_some())
            .field("client_auth", &self.client_auth)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("srtp_protection_profiles", &self.srtp_protection_profiles)
            .field("server_name", &self.server_name)
            .field("flight_start_rto", &self.flight_start_rto)
            .field("flight_retries", &self.flight_retries)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HandshakeConfig`].
pub struct HandshakeConfigBuilder {
    cipher_suites: Vec<CipherSuiteId>,
    certificates: Vec<CertifiedKey>,
    get_certificate: Option<GetCertificate>,
    psk: Option<PskCallback>,
    psk_identity_hint: Option<Vec<u8>>,
    client_auth: ClientAuthType,
    extended_master_secret: ExtendedMasterSecretType,
    srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    server_name: String,
    insecure_skip_verify: bool,
    insecure_skip_hello_verify: bool,
    root_cas: Vec<Vec<u8>>,
    client_cas: Vec<Vec<u8>>,
    server_cert_verifier: Option<Arc<dyn CertificateVerifier>>,
    client_cert_verifier: Option<Arc<dyn CertificateVerifier>>,
    verify_peer_certificate: Option<VerifyPeerCertificate>,
    signature_schemes: Vec<SignatureAndHashAlgorithm>,
    named_curves: Vec<NamedCurve>,
    flight_start_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    cookie_length: usize,
    rng_seed: Option<u64>,
}

impl HandshakeConfigBuilder {
    /// Restrict the cipher suites.
    ///
    /// Defaults to every supported suite.
    pub fn cipher_suites(mut self, suites: &[CipherSuiteId]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Add a certificate chain and key.
    pub fn certificate(mut self, certificate: CertifiedKey) -> Self {
        self.certificates.push(certificate);
        self
    }

    /// Choose the server certificate per SNI name.
    pub fn get_certificate(mut self, callback: GetCertificate) -> Self {
        self.get_certificate = Some(callback);
        self
    }

    /// Authenticate with a pre-shared key instead of certificates.
    pub fn psk(mut self, callback: PskCallback) -> Self {
        self.psk = Some(callback);
        self
    }

    /// Client: the identity sent. Server: the hint sent.
    pub fn psk_identity_hint(mut self, hint: &[u8]) -> Self {
        self.psk_identity_hint = Some(hint.to_vec());
        self
    }

    /// Defaults to [`ClientAuthType::NoClientCert`].
    pub fn client_auth(mut self, client_auth: ClientAuthType) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// Defaults to [`ExtendedMasterSecretType::Request`].
    pub fn extended_master_secret(mut self, ems: ExtendedMasterSecretType) -> Self {
        self.extended_master_secret = ems;
        self
    }

    /// Offer or accept DTLS-SRTP (RFC 5764) with these profiles.
    ///
    /// Defaults to none.
    pub fn srtp_protection_profiles(mut self, profiles: &[SrtpProtectionProfile]) -> Self {
        self.srtp_protection_profiles = profiles.to_vec();
        self
    }

    pub fn server_name(mut self, server_name: &str) -> Self {
        self.server_name = server_name.to_string();
        self
    }

    /// Defaults to false.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Defaults to false.
    pub fn insecure_skip_hello_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_hello_verify = skip;
        self
    }

    /// DER roots the client trusts for server certificates.
    pub fn root_cas(mut self, roots: Vec<Vec<u8>>) -> Self {
        self.root_cas = roots;
        self
    }

    /// DER roots the server trusts for client certificates.
    pub fn client_cas(mut self, roots: Vec<Vec<u8>>) -> Self {
        self.client_cas = roots;
        self
    }

    /// Replace the root store check of server certificates.
    pub fn server_cert_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.server_cert_verifier = Some(verifier);
        self
    }

    /// Replace the root store check of client certificates.
    pub fn client_cert_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.client_cert_verifier = Some(verifier);
        self
    }

    pub fn verify_peer_certificate(mut self, callback: VerifyPeerCertificate) -> Self {
        self.verify_peer_certificate = Some(callback);
        self
    }

    pub fn signature_schemes(mut self, schemes: &[SignatureAndHashAlgorithm]) -> Self {
        self.signature_schemes = schemes.to_vec();
        self
    }

    /// Defaults to X25519, P-256, P-384.
    pub fn named_curves(mut self, curves: &[NamedCurve]) -> Self {
        self.named_curves = curves.to_vec();
        self
    }

    /// Set the time of first retransmission.
    ///
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the max number of retransmissions per flight.
    ///
    /// Defaults to 7.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake.
    ///
    /// Defaults to 30 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the server cookie length, at most 255.
    ///
    /// Defaults to 20.
    pub fn cookie_length(mut self, length: usize) -> Self {
        self.cookie_length = length;
        self
    }

    /// Make randoms and timers reproducible. Tests only.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// Rejects a PSK combined with certificates, an identity hint without a
    /// PSK, over long cookies and configurations that leave no usable cipher
    /// suite.
    pub fn build(self) -> Result<HandshakeConfig, Error> {
        let has_certificate = !self.certificates.is_empty() || self.get_certificate.is_some();

        if self.psk.is_some() && has_certificate {
            return Err(Error::PskAndCertificate);
        }
        if self.psk_identity_hint.is_some() && self.psk.is_none() {
            return Err(Error::IdentityHintWithoutPsk);
        }
        if self.cookie_length > Cookie::MAX_LEN {
            return Err(Error::CookieTooLong(self.cookie_length));
        }

        let is_psk = self.psk.is_some();
        let cipher_suites: Vec<CipherSuiteId> = self
            .cipher_suites
            .into_iter()
            .filter(|id| id.is_supported() && id.is_psk() == is_psk)
            .collect();
        if cipher_suites.is_empty() {
            return Err(Error::NoAvailableCipherSuites);
        }

        let server_cert_verifier = self
            .server_cert_verifier
            .unwrap_or_else(|| Arc::new(RootStoreVerifier::new(self.root_cas)));
        let client_cert_verifier = self
            .client_cert_verifier
            .unwrap_or_else(|| Arc::new(RootStoreVerifier::new(self.client_cas)));

        Ok(HandshakeConfig {
            cipher_suites,
            certificates: self.certificates,
            get_certificate: self.get_certificate,
            psk: self.psk,
            psk_identity_hint: self.psk_identity_hint,
            client_auth: self.client_auth,
            extended_master_secret: self.extended_master_secret,
            srtp_protection_profiles: self.srtp_protection_profiles,
            server_name: self.server_name,
            insecure_skip_verify: self.insecure_skip_verify,
            insecure_skip_hello_verify: self.insecure_skip_hello_verify,
            server_cert_verifier,
            client_cert_verifier,
            verify_peer_certificate: self.verify_peer_certificate,
            signature_schemes: self.signature_schemes,
            named_curves: self.named_curves,
            flight_start_rto: self.flight_start_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            cookie_length: self.cookie_length,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig::builder()
            .build()
            .expect("Default config should always validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::certified_key;

    fn psk() -> PskCallback {
        Arc::new(|_: &[u8]| Ok::<_, Error>(vec![0xAB, 0xC1, 0x23]))
    }

    #[test]
    fn defaults() {
        let config = HandshakeConfig::default();
        assert_eq!(config.cookie_length(), 20);
        assert_eq!(config.flight_start_rto(), Duration::from_secs(1));
        assert_eq!(config.client_auth(), ClientAuthType::NoClientCert);
        assert_eq!(
            config.extended_master_secret(),
            ExtendedMasterSecretType::Request
        );
        assert!(config.cipher_suites().iter().all(|id| !id.is_psk()));
        assert!(!config.has_certificate());
        assert!(matches!(
            config.certificate_for(""),
            Err(Error::NoCertificates)
        ));
    }

    #[test]
    fn psk_filters_cipher_suites() {
        let config = HandshakeConfig::builder()
            .psk(psk())
            .psk_identity_hint(b"hint!")
            .build()
            .unwrap();
        assert_eq!(
            config.cipher_suites(),
            &[CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256]
        );
        assert_eq!(config.psk_identity_hint(), Some(&b"hint!"[..]));
        assert!(config.is_psk());
    }

    #[test]
    fn psk_and_certificate_are_exclusive() {
        let err = HandshakeConfig::builder()
            .psk(psk())
            .certificate(certified_key("localhost"))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::PskAndCertificate);
    }

    #[test]
    fn hint_requires_psk() {
        let err = HandshakeConfig::builder()
            .psk_identity_hint(b"hint")
            .build()
            .unwrap_err();
        assert_eq!(err, Error::IdentityHintWithoutPsk);
    }

    #[test]
    fn no_usable_cipher_suite() {
        let err = HandshakeConfig::builder()
            .cipher_suites(&[CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256])
            .build()
            .unwrap_err();
        assert_eq!(err, Error::NoAvailableCipherSuites);
    }

    #[test]
    fn cookie_length_limit() {
        assert!(HandshakeConfig::builder().cookie_length(255).build().is_ok());
        let err = HandshakeConfig::builder()
            .cookie_length(256)
            .build()
            .unwrap_err();
        assert_eq!(err, Error::CookieTooLong(256));
    }

    #[test]
    fn client_auth_requests() {
        assert!(!ClientAuthType::NoClientCert.requests_certificate());
        assert!(ClientAuthType::RequestClientCert.requests_certificate());
        assert!(ClientAuthType::RequireAndVerifyClientCert.requests_certificate());
    }
}
