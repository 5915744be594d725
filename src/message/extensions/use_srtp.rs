use nom::combinator::map;
use nom::multi::length_data;
use nom::number::complete::be_u8;
use nom::sequence::pair;
use nom::IResult;

use super::{u16_list, write_u16_list};

code_point! {
    /// DTLS-SRTP protection profiles, RFC 5764 Section 4.1.2 and RFC 7714.
    pub enum SrtpProtectionProfile: u16 {
        Aes128CmHmacSha1_80 = 0x0001,
        Aes128CmHmacSha1_32 = 0x0002,
        AeadAes128Gcm = 0x0007,
        AeadAes256Gcm = 0x0008,
    }
}

/// UseSrtp extension as defined in RFC 5764
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UseSrtpExtension {
    pub profiles: Vec<SrtpProtectionProfile>,
    pub mki: Vec<u8>,
}

impl UseSrtpExtension {
    pub fn new(profiles: &[SrtpProtectionProfile]) -> Self {
        UseSrtpExtension {
            profiles: profiles.to_vec(),
            mki: Vec::new(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], UseSrtpExtension> {
        map(
            pair(u16_list(SrtpProtectionProfile::parse), length_data(be_u8)),
            |(profiles, mki)| UseSrtpExtension {
                profiles,
                mki: mki.to_vec(),
            },
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        write_u16_list(output, &self.profiles, u16::from);
        output.push(self.mki.len() as u8);
        output.extend_from_slice(&self.mki);
    }
}
