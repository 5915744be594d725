use nom::sequence::tuple;
use nom::IResult;

use super::{CompressionMethod, HelloExtensions, ProtocolVersion, Random, SessionId};
use crate::cipher_suite::CipherSuiteId;

/// The server's choice of version, suite and extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuiteId,
    pub compression_method: CompressionMethod,
    pub extensions: HelloExtensions,
}

impl ServerHello {
    pub fn new(
        server_version: ProtocolVersion,
        random: Random,
        cipher_suite: CipherSuiteId,
        extensions: HelloExtensions,
    ) -> Self {
        ServerHello {
            server_version,
            random,
            session_id: SessionId::empty(),
            cipher_suite,
            compression_method: CompressionMethod::Null,
            extensions,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, (server_version, random, session_id, cipher_suite, compression_method)) =
            tuple((
                ProtocolVersion::parse,
                Random::parse,
                SessionId::parse,
                CipherSuiteId::parse,
                CompressionMethod::parse,
            ))(input)?;
        let (input, extensions) = HelloExtensions::parse(input)?;

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cipher_suite.serialize(output);
        self.compression_method.serialize(output);
        self.extensions.serialize(output);
    }
}
