use nom::combinator::{map, rest};
use nom::IResult;

/// verify_data over the handshake transcript, 12 bytes for every suite we
/// support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished<'a> {
    pub verify_data: &'a [u8],
}

impl<'a> Finished<'a> {
    pub fn new(verify_data: &'a [u8]) -> Self {
        Finished { verify_data }
    }

    /// The verify data is the whole body.
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Finished<'a>> {
        map(rest, Finished::new)(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(self.verify_data);
    }
}
