use std::ops::Deref;

use nom::combinator::{all_consuming, cond, map};
use nom::multi::{length_data, length_value, many0};
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::{ClientCertificateType, SignatureAndHashAlgorithm};

/// A DER encoded X.501 name of an acceptable certificate authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistinguishedName<'a>(pub &'a [u8]);

impl Deref for DistinguishedName<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateRequest<'a> {
    pub certificate_types: Vec<ClientCertificateType>,
    pub supported_signature_algorithms: Vec<SignatureAndHashAlgorithm>,
    pub certificate_authorities: Vec<DistinguishedName<'a>>,
}

impl<'a> CertificateRequest<'a> {
    pub fn new(
        certificate_types: Vec<ClientCertificateType>,
        supported_signature_algorithms: Vec<SignatureAndHashAlgorithm>,
        certificate_authorities: Vec<DistinguishedName<'a>>,
    ) -> Self {
        CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], CertificateRequest<'a>> {
        let (input, types) = length_data(be_u8)(input)?;
        let certificate_types = types.iter().copied().map(ClientCertificateType::from).collect();

        let (input, supported_signature_algorithms) = length_value(
            be_u16,
            all_consuming(many0(SignatureAndHashAlgorithm::parse)),
        )(input)?;

        // Some peers leave out the certificate_authorities block entirely.
        let names = map(length_data(be_u16), DistinguishedName);
        let (input, certificate_authorities) = cond(
            !input.is_empty(),
            length_value(be_u16, all_consuming(many0(names))),
        )(input)?;

        Ok((
            input,
            CertificateRequest::new(
                certificate_types,
                supported_signature_algorithms,
                certificate_authorities.unwrap_or_default(),
            ),
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.certificate_types.len() as u8);
        output.extend(self.certificate_types.iter().map(|t| t.as_u8()));

        let algorithms = &self.supported_signature_algorithms;
        output.extend_from_slice(&((algorithms.len() * 2) as u16).to_be_bytes());
        for algorithm in algorithms {
            output.extend_from_slice(&algorithm.as_u16().to_be_bytes());
        }

        let names: usize = self.certificate_authorities.iter().map(|n| 2 + n.len()).sum();
        output.extend_from_slice(&(names as u16).to_be_bytes());
        for name in &self.certificate_authorities {
            output.extend_from_slice(&(name.len() as u16).to_be_bytes());
            output.extend_from_slice(name);
        }
    }
}
