use nom::combinator::map;
use nom::sequence::pair;
use nom::IResult;

use super::id::Cookie;
use super::ProtocolVersion;

/// The server's stateless cookie challenge, answered by a second ClientHello.
///
/// `server_version` is fixed at DTLS 1.0 on the wire so that old clients
/// accept it regardless of what is negotiated later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(server_version: ProtocolVersion, cookie: Cookie) -> Self {
        HelloVerifyRequest {
            server_version,
            cookie,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        map(
            pair(ProtocolVersion::parse, Cookie::parse),
            |(server_version, cookie)| HelloVerifyRequest::new(server_version, cookie),
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.cookie.serialize(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_read_from_wire() {
        let wire = [0xFE, 0xFD, 0x03, 0x0A, 0x0B, 0x0C];
        let (rest, hvr) = HelloVerifyRequest::parse(&wire).unwrap();

        assert!(rest.is_empty());
        assert_eq!(hvr.server_version, ProtocolVersion::DTLS1_2);
        assert_eq!(&*hvr.cookie, &[0x0A, 0x0B, 0x0C]);

        let mut out = Vec::new();
        hvr.serialize(&mut out);
        assert_eq!(out, wire);
    }

    #[test]
    fn empty_cookie() {
        let (_, hvr) = HelloVerifyRequest::parse(&[0xFE, 0xFF, 0x00]).unwrap();
        assert!(hvr.cookie.is_empty());
    }

    #[test]
    fn cookie_length_past_end() {
        assert!(HelloVerifyRequest::parse(&[0xFE, 0xFF, 0x09, 0x01]).is_err());
    }
}
