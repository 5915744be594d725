use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange<'a> {
    pub exchange_keys: ExchangeKeys<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKeys<'a> {
    /// The client's ephemeral public key. Curve and point format are fixed by the
    /// ServerKeyExchange, so only the length prefixed point is on the wire.
    Ecdh { public_key: &'a [u8] },
    Psk { identity: &'a [u8] },
}

impl<'a> ClientKeyExchange<'a> {
    pub fn new(exchange_keys: ExchangeKeys<'a>) -> Self {
        ClientKeyExchange { exchange_keys }
    }

    /// Parse without knowing the negotiated suite.
    ///
    /// Same shape check as [`ServerKeyExchange::parse`](super::ServerKeyExchange::parse).
    /// Unlike there it cannot misread: an ECDH body is one byte longer than its
    /// first byte, a PSK body is at least 256 times that plus two. Handshake
    /// flights still use [`parse_as`](Self::parse_as).
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientKeyExchange<'a>> {
        let psk = input.len() >= 2
            && input.len() == u16::from_be_bytes([input[0], input[1]]) as usize + 2;
        Self::parse_as(input, psk)
    }

    /// Parse the shape the negotiated suite dictates.
    pub fn parse_as(input: &'a [u8], psk: bool) -> IResult<&'a [u8], ClientKeyExchange<'a>> {
        if psk {
            let (rest, identity) = length_data(be_u16)(input)?;
            return Ok((rest, ClientKeyExchange::new(ExchangeKeys::Psk { identity })));
        }

        let (rest, public_key_len) = be_u8(input)?;
        if rest.len() != public_key_len as usize {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (rest, public_key) = take(public_key_len)(rest)?;

        Ok((
            rest,
            ClientKeyExchange::new(ExchangeKeys::Ecdh { public_key }),
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match &self.exchange_keys {
            ExchangeKeys::Ecdh { public_key } => {
                output.push(public_key.len() as u8);
                output.extend_from_slice(public_key);
            }
            ExchangeKeys::Psk { identity } => {
                output.extend_from_slice(&(identity.len() as u16).to_be_bytes());
                output.extend_from_slice(identity);
            }
        }
    }

    pub fn public_key(&self) -> Option<&'a [u8]> {
        match &self.exchange_keys {
            ExchangeKeys::Ecdh { public_key } => Some(public_key),
            ExchangeKeys::Psk { .. } => None,
        }
    }

    pub fn identity(&self) -> Option<&'a [u8]> {
        match &self.exchange_keys {
            ExchangeKeys::Ecdh { .. } => None,
            ExchangeKeys::Psk { identity } => Some(identity),
        }
    }
}
