use nom::error::{Error, ErrorKind};
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u8};
use nom::Err;
use nom::{bytes::complete::take, IResult};

use super::{CurveType, DigitallySigned};
use crate::crypto::NamedCurve;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange<'a> {
    pub params: ServerKeyExchangeParams<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKeyExchangeParams<'a> {
    Ecdh(EcdhParams<'a>),
    Psk { identity_hint: &'a [u8] },
}

impl<'a> ServerKeyExchange<'a> {
    pub fn ecdh(
        named_curve: NamedCurve,
        public_key: &'a [u8],
        signature: Option<DigitallySigned<'a>>,
    ) -> Self {
        ServerKeyExchange {
            params: ServerKeyExchangeParams::Ecdh(EcdhParams {
                curve_type: CurveType::NamedCurve,
                named_curve,
                public_key,
                signature,
            }),
        }
    }

    pub fn psk(identity_hint: &'a [u8]) -> Self {
        ServerKeyExchange {
            params: ServerKeyExchangeParams::Psk { identity_hint },
        }
    }

    /// Parse without knowing the negotiated suite.
    ///
    /// A body that is exactly a u16 length prefixed blob is read as a PSK
    /// identity hint, anything else as ECDH parameters. ECDH parameters start
    /// with `0x03 0x00`, so an ECDH body of exactly 770 bytes is misread as a
    /// hint. Handshake flights use [`parse_as`](Self::parse_as) instead.
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ServerKeyExchange<'a>> {
        let psk = input.len() >= 2
            && input.len() == u16::from_be_bytes([input[0], input[1]]) as usize + 2;
        Self::parse_as(input, psk)
    }

    /// Parse the shape the negotiated suite dictates.
    pub fn parse_as(input: &'a [u8], psk: bool) -> IResult<&'a [u8], ServerKeyExchange<'a>> {
        if psk {
            let (input, identity_hint) = length_data(be_u16)(input)?;
            return Ok((input, ServerKeyExchange::psk(identity_hint)));
        }

        let (input, ecdh_params) = EcdhParams::parse(input)?;
        Ok((
            input,
            ServerKeyExchange {
                params: ServerKeyExchangeParams::Ecdh(ecdh_params),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match &self.params {
            ServerKeyExchangeParams::Ecdh(ecdh_params) => ecdh_params.serialize(output),
            ServerKeyExchangeParams::Psk { identity_hint } => {
                output.extend_from_slice(&(identity_hint.len() as u16).to_be_bytes());
                output.extend_from_slice(identity_hint);
            }
        }
    }

    pub fn ecdh_params(&self) -> Option<&EcdhParams<'a>> {
        match &self.params {
            ServerKeyExchangeParams::Ecdh(p) => Some(p),
            ServerKeyExchangeParams::Psk { .. } => None,
        }
    }

    pub fn identity_hint(&self) -> Option<&'a [u8]> {
        match &self.params {
            ServerKeyExchangeParams::Ecdh(_) => None,
            ServerKeyExchangeParams::Psk { identity_hint } => Some(identity_hint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhParams<'a> {
    pub curve_type: CurveType,
    pub named_curve: NamedCurve,
    pub public_key: &'a [u8],
    pub signature: Option<DigitallySigned<'a>>,
}

impl<'a> EcdhParams<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], EcdhParams<'a>> {
        let (input, curve_type) = CurveType::parse(input)?;
        if curve_type != CurveType::NamedCurve {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, named_curve) = be_u16(input)?;

        let (input, public_key_len) = be_u8(input)?;
        let (input, public_key) = take(public_key_len as usize)(input)?;

        let (input, signature) = if !input.is_empty() {
            let (rest, signed) = DigitallySigned::parse(input)?;
            (rest, Some(signed))
        } else {
            (input, None)
        };

        Ok((
            input,
            EcdhParams {
                curve_type,
                named_curve: NamedCurve::from_u16(named_curve),
                public_key,
                signature,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.curve_type.as_u8());
        output.extend_from_slice(&self.named_curve.as_u16().to_be_bytes());
        output.push(self.public_key.len() as u8);
        output.extend_from_slice(self.public_key);

        if let Some(signed) = &self.signature {
            signed.serialize(output);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};

    const MESSAGE_ECDH: &[u8] = &[
        0x03, // curve_type
        0x00, 0x17, // named_curve
        0x04, // public_key length
        0x01, 0x02, 0x03, 0x04, // public_key
        0x04, 0x03, // SHA256/ECDSA
        0x00, 0x02, // signature length
        0x05, 0x06, // signature
    ];

    const MESSAGE_PSK: &[u8] = &[
        0x00, 0x03, // identity hint length
        0x01, 0x02, 0x03, // identity hint
    ];

    #[test]
    fn roundtrip_ecdh() {
        let algorithm =
            SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA);
        let ske = ServerKeyExchange::ecdh(
            NamedCurve::P256,
            &MESSAGE_ECDH[4..8],
            Some(DigitallySigned::new(algorithm, &MESSAGE_ECDH[12..])),
        );

        let mut serialized = Vec::new();
        ske.serialize(&mut serialized);
        assert_eq!(serialized, MESSAGE_ECDH);

        let (rest, parsed) = ServerKeyExchange::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ske);
    }

    #[test]
    fn roundtrip_psk_hint() {
        let ske = ServerKeyExchange::psk(&MESSAGE_PSK[2..]);

        let mut serialized = Vec::new();
        ske.serialize(&mut serialized);
        assert_eq!(serialized, MESSAGE_PSK);

        let (rest, parsed) = ServerKeyExchange::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.identity_hint(), Some(&MESSAGE_PSK[2..]));
    }

    #[test]
    fn bad_curve_type() {
        let mut message = MESSAGE_ECDH.to_vec();
        message[0] = 0x01;
        assert!(ServerKeyExchange::parse(&message).is_err());
    }

    #[test]
    fn ecdh_body_shaped_like_a_hint() {
        // 0x0300 bytes after the first two: the length prefix of a PSK hint.
        let mut message = vec![0x03, 0x00, 0x17, 0xFF];
        message.extend_from_slice(&[0x04; 0xFF]);
        message.extend_from_slice(&[0x04, 0x03]);
        let signature_len = 0x0300 + 2 - message.len() - 2;
        message.extend_from_slice(&(signature_len as u16).to_be_bytes());
        message.resize(0x0300 + 2, 0x5A);
        assert_eq!(message.len(), 770);

        let (_, guessed) = ServerKeyExchange::parse(&message).unwrap();
        assert!(guessed.identity_hint().is_some());

        let (rest, parsed) = ServerKeyExchange::parse_as(&message, false).unwrap();
        assert!(rest.is_empty());
        let params = parsed.ecdh_params().unwrap();
        assert_eq!(params.named_curve, NamedCurve::P256);
        assert_eq!(params.public_key.len(), 0xFF);
        assert_eq!(params.signature.as_ref().unwrap().signature.len(), signature_len);
    }

    #[test]
    fn psk_hint_must_fill_length() {
        assert!(ServerKeyExchange::parse_as(&[0x00, 0x04, 0x01], true).is_err());
        let (rest, parsed) = ServerKeyExchange::parse_as(MESSAGE_PSK, true).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.identity_hint(), Some(&MESSAGE_PSK[2..]));
    }
}
