use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::sequence::tuple;
use nom::IResult;

use crate::message::ProtocolVersion;

pub const RECORD_HEADER_LENGTH: usize = 13;

/// Big-endian 48-bit unsigned integer (nom does not provide one).
fn be_u48(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, bytes) = take(6usize)(input)?;
    Ok((input, bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)))
}

code_point! {
    pub enum ContentType: u8 {
        ChangeCipherSpec = 20,
        Alert = 21,
        Handshake = 22,
        ApplicationData = 23,
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

/// DTLS record header, RFC 6347 Section 4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48 bits on the wire.
    pub sequence_number: u64,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, (content_type, version, epoch, sequence_number, length)) = tuple((
            ContentType::parse,
            ProtocolVersion::parse,
            be_u16,
            be_u48,
            be_u16,
        ))(input)?;

        Ok((
            input,
            RecordHeader {
                content_type,
                version,
                epoch,
                sequence_number,
                length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.content_type.serialize(output);
        self.version.serialize(output);
        output.extend_from_slice(&self.epoch.to_be_bytes());
        output.extend_from_slice(&self.sequence_number.to_be_bytes()[2..]);
        output.extend_from_slice(&self.length.to_be_bytes());
    }

    /// Parse a header and split off its fragment.
    pub fn parse_record(input: &[u8]) -> IResult<&[u8], (RecordHeader, &[u8])> {
        let (input, header) = RecordHeader::parse(input)?;
        let (input, fragment) = take(header.length as usize)(input)?;
        Ok((input, (header, fragment)))
    }
}
