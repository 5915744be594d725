use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u24};
use nom::sequence::tuple;
use nom::{Err, IResult};

use super::{
    Certificate, CertificateRequest, CertificateVerify, ClientHello, ClientKeyExchange, Finished,
    HelloVerifyRequest, ServerHello, ServerKeyExchange,
};

pub const HEADER_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, (msg_type, length, message_seq, fragment_offset, fragment_length)) =
            tuple((MessageType::parse, be_u24, be_u16, be_u24, be_u24))(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.msg_type.serialize(output);
        output.extend_from_slice(&self.length.to_be_bytes()[1..]);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        output.extend_from_slice(&self.fragment_offset.to_be_bytes()[1..]);
        output.extend_from_slice(&self.fragment_length.to_be_bytes()[1..]);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length < self.length
    }
}

/// A complete (unfragmented) handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake<'a> {
    pub header: Header,
    pub body: Body<'a>,
}

impl<'a> Handshake<'a> {
    pub fn new(message_seq: u16, body: Body<'a>) -> Self {
        Handshake {
            header: Header {
                msg_type: body.message_type(),
                length: 0,
                message_seq,
                fragment_offset: 0,
                fragment_length: 0,
            },
            body,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Handshake<'a>> {
        let (input, header) = Header::parse(input)?;

        if header.is_fragment() {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }

        let (input, body_bytes) = take(header.length as usize)(input)?;
        let (rest, body) = Body::parse(body_bytes, header.msg_type)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::Eof)));
        }

        Ok((input, Handshake { header, body }))
    }

    /// Write header and body. The header lengths are computed from the body.
    pub fn serialize(&self, output: &mut Vec<u8>) {
        let mut body = Vec::new();
        self.body.serialize(&mut body);

        let header = Header {
            msg_type: self.body.message_type(),
            length: body.len() as u32,
            message_seq: self.header.message_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        header.serialize(output);
        output.extend_from_slice(&body);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }
}

code_point! {
    pub enum MessageType: u8 {
        HelloRequest = 0,
        ClientHello = 1,
        ServerHello = 2,
        HelloVerifyRequest = 3,
        Certificate = 11,
        ServerKeyExchange = 12,
        CertificateRequest = 13,
        ServerHelloDone = 14,
        CertificateVerify = 15,
        ClientKeyExchange = 16,
        Finished = 20,
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Body<'a> {
    HelloRequest,
    ClientHello(ClientHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerHello(ServerHello),
    Certificate(Certificate<'a>),
    ServerKeyExchange(ServerKeyExchange<'a>),
    CertificateRequest(CertificateRequest<'a>),
    ServerHelloDone,
    CertificateVerify(CertificateVerify<'a>),
    ClientKeyExchange(ClientKeyExchange<'a>),
    Finished(Finished<'a>),
}

impl<'a> Body<'a> {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::HelloRequest => MessageType::HelloRequest,
            Body::ClientHello(_) => MessageType::ClientHello,
            Body::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            Body::ServerHello(_) => MessageType::ServerHello,
            Body::Certificate(_) => MessageType::Certificate,
            Body::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Body::CertificateRequest(_) => MessageType::CertificateRequest,
            Body::ServerHelloDone => MessageType::ServerHelloDone,
            Body::CertificateVerify(_) => MessageType::CertificateVerify,
            Body::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            Body::Finished(_) => MessageType::Finished,
        }
    }

    pub fn parse(input: &'a [u8], m: MessageType) -> IResult<&'a [u8], Body<'a>> {
        match m {
            MessageType::HelloRequest => Ok((input, Body::HelloRequest)),
            MessageType::ClientHello => {
                let (input, client_hello) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(client_hello)))
            }
            MessageType::HelloVerifyRequest => {
                let (input, hello_verify_request) = HelloVerifyRequest::parse(input)?;
                Ok((input, Body::HelloVerifyRequest(hello_verify_request)))
            }
            MessageType::ServerHello => {
                let (input, server_hello) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(server_hello)))
            }
            MessageType::Certificate => {
                let (input, certificate) = Certificate::parse(input)?;
                Ok((input, Body::Certificate(certificate)))
            }
            MessageType::ServerKeyExchange => {
                let (input, server_key_exchange) = ServerKeyExchange::parse(input)?;
                Ok((input, Body::ServerKeyExchange(server_key_exchange)))
            }
            MessageType::CertificateRequest => {
                let (input, certificate_request) = CertificateRequest::parse(input)?;
                Ok((input, Body::CertificateRequest(certificate_request)))
            }
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::CertificateVerify => {
                let (input, certificate_verify) = CertificateVerify::parse(input)?;
                Ok((input, Body::CertificateVerify(certificate_verify)))
            }
            MessageType::ClientKeyExchange => {
                let (input, client_key_exchange) = ClientKeyExchange::parse(input)?;
                Ok((input, Body::ClientKeyExchange(client_key_exchange)))
            }
            MessageType::Finished => {
                let (input, finished) = Finished::parse(input)?;
                Ok((input, Body::Finished(finished)))
            }
            MessageType::Unknown(_) => Err(Err::Failure(Error::new(input, ErrorKind::Switch))),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            Body::HelloRequest | Body::ServerHelloDone => {}
            Body::ClientHello(client_hello) => client_hello.serialize(output),
            Body::HelloVerifyRequest(hello_verify_request) => {
                hello_verify_request.serialize(output)
            }
            Body::ServerHello(server_hello) => server_hello.serialize(output),
            Body::Certificate(certificate) => certificate.serialize(output),
            Body::ServerKeyExchange(server_key_exchange) => server_key_exchange.serialize(output),
            Body::CertificateRequest(certificate_request) => certificate_request.serialize(output),
            Body::CertificateVerify(certificate_verify) => certificate_verify.serialize(output),
            Body::ClientKeyExchange(client_key_exchange) => client_key_exchange.serialize(output),
            Body::Finished(finished) => finished.serialize(output),
        }
    }
}
