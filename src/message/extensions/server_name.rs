use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u8},
    IResult,
};

const HOST_NAME: u8 = 0;

/// Server Name Indication, RFC 6066 Section 3
///
/// Only the host_name entry is kept, other name types are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerNameExtension {
    pub host_name: String,
}

impl ServerNameExtension {
    pub fn new(host_name: &str) -> Self {
        ServerNameExtension {
            host_name: host_name.to_string(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerNameExtension> {
        let (input, list_len) = be_u16(input)?;
        let (input, mut list) = take(list_len)(input)?;

        let mut host_name = String::new();
        while !list.is_empty() {
            let (rest, name_type) = be_u8(list)?;
            let (rest, name_len) = be_u16(rest)?;
            let (rest, name) = take(name_len)(rest)?;
            list = rest;

            if name_type == HOST_NAME && host_name.is_empty() {
                host_name = String::from_utf8_lossy(name).into_owned();
            }
        }

        Ok((input, ServerNameExtension { host_name }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let name = self.host_name.as_bytes();
        output.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        output.push(HOST_NAME);
        output.extend_from_slice(&(name.len() as u16).to_be_bytes());
        output.extend_from_slice(name);
    }
}
