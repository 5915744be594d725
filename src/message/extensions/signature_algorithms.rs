use nom::combinator::map;
use nom::IResult;

use super::{u16_list, write_u16_list};
use crate::message::SignatureAndHashAlgorithm;

/// signature_algorithms, RFC 5246 Section 7.4.1.4.1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureAlgorithmsExtension {
    pub supported_signature_algorithms: Vec<SignatureAndHashAlgorithm>,
}

impl SignatureAlgorithmsExtension {
    pub fn new(supported_signature_algorithms: &[SignatureAndHashAlgorithm]) -> Self {
        SignatureAlgorithmsExtension {
            supported_signature_algorithms: supported_signature_algorithms.to_vec(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SignatureAlgorithmsExtension> {
        map(
            u16_list(SignatureAndHashAlgorithm::parse),
            |supported_signature_algorithms| SignatureAlgorithmsExtension {
                supported_signature_algorithms,
            },
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        write_u16_list(output, &self.supported_signature_algorithms, |a| {
            a.as_u16()
        });
    }
}
