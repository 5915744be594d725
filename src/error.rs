use thiserror::Error;

use crate::alert::AlertDescription;

/// Every way a handshake can fail.
///
/// [`Error::alert_description`] picks the fatal alert (if any) that is sent to the
/// peer before the handshake is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Handshake cancelled")]
    Cancelled,

    #[error("Handshake deadline exceeded")]
    DeadlineExceeded,

    #[error("Flight retransmission limit reached")]
    RetransmitLimit,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Peer sent fatal alert: {0}")]
    AlertReceived(AlertDescription),

    #[error("Client sent certificate verify but did not send a certificate")]
    CertificateVerifyNoCertificate,

    #[error("Cookie mismatch")]
    CookieMismatch,

    #[error("Cookie must not be longer than 255 bytes: {0}")]
    CookieTooLong(usize),

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("Client and server do not share a cipher suite")]
    CipherSuiteNoIntersection,

    #[error("Server selected a cipher suite we did not offer")]
    InvalidCipherSuite,

    #[error("Cipher suite is already initialized")]
    CipherSuiteAlreadyInitialized,

    #[error("Cipher suite is not initialized")]
    CipherSuiteNotInitialized,

    #[error("Client offered no supported elliptic curves")]
    NoSupportedEllipticCurves,

    #[error("Invalid named curve {0:#06x}")]
    InvalidNamedCurve(u16),

    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    #[error("Server has no matching SRTP protection profile")]
    ServerNoMatchingSrtpProfile,

    #[error("Client has no matching SRTP protection profile")]
    ClientNoMatchingSrtpProfile,

    #[error("SRTP was requested but the server did not send use_srtp")]
    RequestedButNoSrtpExtension,

    #[error("Server requires extended master secret but the client does not support it")]
    ServerRequiredButNoClientEms,

    #[error("Client requires extended master secret but the server does not support it")]
    ClientRequiredButNoServerEms,

    #[error("No certificate configured")]
    NoCertificates,

    #[error("Server did not send a certificate")]
    ServerCertificateMissing,

    #[error("Client certificate required but none was sent")]
    ClientCertificateRequired,

    #[error("Client certificate was not verified")]
    ClientCertificateNotVerified,

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Certificate verification failed: {0}")]
    CertificateVerification(String),

    #[error("Peer certificate rejected: {0}")]
    PeerCertificateRejected(String),

    #[error("Finished verify data mismatch")]
    VerifyDataMismatch,

    #[error("No available signature schemes")]
    NoAvailableSignatureSchemes,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Failed to parse handshake message: {0}")]
    Parse(String),

    #[error("PSK callback failed: {0}")]
    Psk(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("PSK and certificate are mutually exclusive")]
    PskAndCertificate,

    #[error("PSK identity hint configured without a PSK callback")]
    IdentityHintWithoutPsk,

    #[error("No cipher suite is usable with this configuration")]
    NoAvailableCipherSuites,

    #[error("Server must have a certificate or a PSK")]
    ServerMustHaveCertificate,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}

impl Error {
    /// The fatal alert sent to the peer for this error.
    ///
    /// `None` means the failure is local (cancellation, timeout, transport) or was
    /// reported by the peer, and no alert should be sent.
    pub fn alert_description(&self) -> Option<AlertDescription> {
        use AlertDescription as A;

        let desc = match self {
            Error::Cancelled
            | Error::DeadlineExceeded
            | Error::RetransmitLimit
            | Error::Transport(_)
            | Error::AlertReceived(_) => return None,

            Error::CookieMismatch => A::AccessDenied,
            Error::UnsupportedProtocolVersion => A::ProtocolVersion,

            Error::CipherSuiteNoIntersection
            | Error::InvalidCipherSuite
            | Error::NoSupportedEllipticCurves
            | Error::ServerNoMatchingSrtpProfile
            | Error::RequestedButNoSrtpExtension
            | Error::ServerRequiredButNoClientEms
            | Error::ClientRequiredButNoServerEms
            | Error::NoAvailableSignatureSchemes => A::InsufficientSecurity,

            Error::InvalidNamedCurve(_)
            | Error::KeyExchange(_)
            | Error::ClientNoMatchingSrtpProfile => A::IllegalParameter,

            Error::ServerCertificateMissing
            | Error::ClientCertificateRequired
            | Error::CertificateVerifyNoCertificate => A::NoCertificate,

            Error::ClientCertificateNotVerified
            | Error::SignatureVerification(_)
            | Error::CertificateVerification(_)
            | Error::PeerCertificateRejected(_) => A::BadCertificate,

            Error::NoCertificates | Error::VerifyDataMismatch => A::HandshakeFailure,
            Error::UnexpectedMessage(_) => A::UnexpectedMessage,
            Error::Parse(_) => A::DecodeError,

            Error::CookieTooLong(_)
            | Error::CipherSuiteAlreadyInitialized
            | Error::CipherSuiteNotInitialized
            | Error::Psk(_)
            | Error::Crypto(_)
            | Error::PskAndCertificate
            | Error::IdentityHintWithoutPsk
            | Error::NoAvailableCipherSuites
            | Error::ServerMustHaveCertificate
            | Error::InvalidPrivateKey(_) => A::InternalError,
        };

        Some(desc)
    }

    /// The handshake was stopped locally through its [`crate::Context`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The peer never completed the handshake in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DeadlineExceeded | Error::RetransmitLimit)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        let kind = match value {
            nom::Err::Incomplete(_) => "incomplete".to_string(),
            nom::Err::Error(e) | nom::Err::Failure(e) => format!("{:?}", e.code),
        };
        Error::Parse(kind)
    }
}
