use nom::combinator::{all_consuming, map};
use nom::multi::{length_data, length_value, many0};
use nom::number::complete::{be_u16, be_u8};
use nom::sequence::tuple;
use nom::IResult;

use super::{CompressionMethod, Cookie, HelloExtensions, ProtocolVersion, Random, SessionId};
use crate::cipher_suite::CipherSuiteId;

/// Sent in flights 1 and 3. The second copy echoes the server's cookie and
/// must otherwise match the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: Vec<CipherSuiteId>,
    pub compression_methods: Vec<CompressionMethod>,
    pub extensions: HelloExtensions,
}

impl ClientHello {
    pub fn new(
        client_version: ProtocolVersion,
        random: Random,
        cookie: Cookie,
        cipher_suites: Vec<CipherSuiteId>,
        extensions: HelloExtensions,
    ) -> Self {
        ClientHello {
            client_version,
            random,
            session_id: SessionId::empty(),
            cookie,
            cipher_suites,
            compression_methods: vec![CompressionMethod::Null],
            extensions,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, (client_version, random, session_id, cookie)) = tuple((
            ProtocolVersion::parse,
            Random::parse,
            SessionId::parse,
            Cookie::parse,
        ))(input)?;

        // An odd suite list length leaves a partial entry and fails.
        let (input, cipher_suites) =
            length_value(be_u16, all_consuming(many0(CipherSuiteId::parse)))(input)?;

        let (input, compression_methods) = map(length_data(be_u8), |methods: &[u8]| {
            methods.iter().copied().map(CompressionMethod::from).collect()
        })(input)?;

        let (input, extensions) = HelloExtensions::parse(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cookie.serialize(output);

        output.extend_from_slice(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for suite in &self.cipher_suites {
            suite.serialize(output);
        }

        output.push(self.compression_methods.len() as u8);
        output.extend(self.compression_methods.iter().map(|m| m.as_u8()));

        self.extensions.serialize(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0xFE, 0xFD, // ProtocolVersion::DTLS1_2
        // Random
        0x00, 0x00, 0x00, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        0x02, 0x02, //
        0x00, // SessionId length
        0x02, // Cookie length
        0xAA, 0xBB, // Cookie
        0x00, 0x04, // CipherSuites length
        0xC0, 0x2B, // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
        0x00, 0xA8, // TLS_PSK_WITH_AES_128_GCM_SHA256
        0x01, // CompressionMethods length
        0x00, // CompressionMethod::Null
        0x00, 0x04, // Extensions length
        0x00, 0x17, 0x00, 0x00, // extended_master_secret
    ];

    fn client_hello() -> ClientHello {
        let random = Random {
            gmt_unix_time: 1,
            random_bytes: [0x02; 28],
        };
        let extensions = HelloExtensions {
            extended_master_secret: true,
            ..Default::default()
        };
        ClientHello::new(
            ProtocolVersion::DTLS1_2,
            random,
            Cookie::try_new(&[0xAA, 0xBB]).unwrap(),
            vec![
                CipherSuiteId::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                CipherSuiteId::TLS_PSK_WITH_AES_128_GCM_SHA256,
            ],
            extensions,
        )
    }

    #[test]
    fn roundtrip() {
        let client_hello = client_hello();

        let mut serialized = Vec::new();
        client_hello.serialize(&mut serialized);
        assert_eq!(serialized, MESSAGE);

        let (rest, parsed) = ClientHello::parse(&serialized).unwrap();
        assert_eq!(parsed, client_hello);
        assert!(rest.is_empty());
    }

    #[test]
    fn odd_cipher_suite_length() {
        let mut message = MESSAGE.to_vec();
        // CipherSuites length sits after version, random, session id and cookie.
        message[39] = 0x03;
        assert!(ClientHello::parse(&message).is_err());
    }
}
