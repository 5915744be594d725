use std::ops::Deref;

use nom::combinator::{all_consuming, map};
use nom::multi::{length_data, length_value, many0};
use nom::number::complete::be_u24;
use nom::IResult;

/// One DER encoded certificate, borrowed from the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asn1Cert<'a>(pub &'a [u8]);

impl Deref for Asn1Cert<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

/// The sender's chain, leaf first. May be empty when a client has nothing
/// to answer a CertificateRequest with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Certificate<'a> {
    pub certificate_list: Vec<Asn1Cert<'a>>,
}

impl<'a> Certificate<'a> {
    pub fn new(certificate_list: Vec<Asn1Cert<'a>>) -> Self {
        Certificate { certificate_list }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Certificate<'a>> {
        let entry = map(length_data(be_u24), Asn1Cert);
        map(
            length_value(be_u24, all_consuming(many0(entry))),
            Certificate::new,
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let u24 = |n: usize| (n as u32).to_be_bytes()[1..].to_vec();

        let total: usize = self.certificate_list.iter().map(|c| 3 + c.len()).sum();
        output.extend(u24(total));
        for cert in &self.certificate_list {
            output.extend(u24(cert.len()));
            output.extend_from_slice(cert);
        }
    }

    /// The chain as owned DER blobs, leaf first.
    pub fn to_der_chain(&self) -> Vec<Vec<u8>> {
        self.certificate_list.iter().map(|c| c.to_vec()).collect()
    }
}
