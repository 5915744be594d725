use nom::combinator::map;
use nom::multi::length_data;
use nom::number::complete::be_u8;
use nom::IResult;

code_point! {
    /// EC point format, RFC 4492 Section 5.1.2.
    pub enum ECPointFormat: u8 {
        Uncompressed = 0,
    }
}

/// ECPointFormats extension as defined in RFC 4492
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ECPointFormatsExtension {
    pub formats: Vec<ECPointFormat>,
}

impl Default for ECPointFormatsExtension {
    fn default() -> Self {
        ECPointFormatsExtension {
            formats: vec![ECPointFormat::Uncompressed],
        }
    }
}

impl ECPointFormatsExtension {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ECPointFormatsExtension> {
        map(length_data(be_u8), |list: &[u8]| ECPointFormatsExtension {
            formats: list.iter().copied().map(ECPointFormat::from).collect(),
        })(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.formats.len() as u8);
        output.extend(self.formats.iter().map(|f| f.as_u8()));
    }
}
