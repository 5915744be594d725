use std::fmt;

use nom::combinator::map;
use nom::sequence::pair;
use nom::IResult;

code_point! {
    pub enum AlertLevel: u8 {
        Warning = 1,
        Fatal = 2,
    }
}

code_point! {
    /// Alert descriptions from RFC 5246 section 7.2.
    pub enum AlertDescription: u8 {
        CloseNotify = 0,
        UnexpectedMessage = 10,
        BadRecordMac = 20,
        DecryptionFailed = 21,
        RecordOverflow = 22,
        DecompressionFailure = 30,
        HandshakeFailure = 40,
        NoCertificate = 41,
        BadCertificate = 42,
        UnsupportedCertificate = 43,
        CertificateRevoked = 44,
        CertificateExpired = 45,
        CertificateUnknown = 46,
        IllegalParameter = 47,
        UnknownCa = 48,
        AccessDenied = 49,
        DecodeError = 50,
        DecryptError = 51,
        ExportRestriction = 60,
        ProtocolVersion = 70,
        InsufficientSecurity = 71,
        InternalError = 80,
        UserCanceled = 90,
        NoRenegotiation = 100,
        UnsupportedExtension = 110,
    }
}

impl Default for AlertLevel {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl Default for AlertDescription {
    fn default() -> Self {
        Self::Unknown(255)
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDescription::Unknown(v) => write!(f, "unknown alert {}", v),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Alert { level, description }
    }

    pub fn fatal(description: AlertDescription) -> Self {
        Self::new(AlertLevel::Fatal, description)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Alert> {
        map(
            pair(AlertLevel::parse, AlertDescription::parse),
            |(level, description)| Alert::new(level, description),
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.level.serialize(output);
        self.description.serialize(output);
    }
}
