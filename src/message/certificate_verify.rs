use nom::combinator::map;
use nom::multi::length_data;
use nom::number::complete::be_u16;
use nom::sequence::pair;
use nom::IResult;

use super::SignatureAndHashAlgorithm;

/// A signature tagged with the scheme that produced it.
///
/// Carried by CertificateVerify and at the end of a ServerKeyExchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned<'a> {
    pub algorithm: SignatureAndHashAlgorithm,
    pub signature: &'a [u8],
}

impl<'a> DigitallySigned<'a> {
    pub fn new(algorithm: SignatureAndHashAlgorithm, signature: &'a [u8]) -> Self {
        DigitallySigned {
            algorithm,
            signature,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DigitallySigned<'a>> {
        map(
            pair(SignatureAndHashAlgorithm::parse, length_data(be_u16)),
            |(algorithm, signature)| DigitallySigned::new(algorithm, signature),
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.algorithm.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        output.extend_from_slice(self.signature);
    }
}

/// Proof from the client that it holds the key of the certificate it sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify<'a> {
    pub digitally_signed: DigitallySigned<'a>,
}

impl<'a> CertificateVerify<'a> {
    pub fn new(digitally_signed: DigitallySigned<'a>) -> Self {
        CertificateVerify { digitally_signed }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], CertificateVerify<'a>> {
        map(DigitallySigned::parse, CertificateVerify::new)(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.digitally_signed.serialize(output);
    }
}
