use std::array::from_fn;
use std::time::{SystemTime, UNIX_EPOCH};

use nom::bytes::complete::take;
use nom::combinator::map;
use nom::number::complete::be_u32;
use nom::sequence::pair;
use nom::IResult;
use rand::Rng;

pub const RANDOM_LENGTH: usize = 32;

/// Hello random: seconds since the epoch followed by 28 random bytes.
///
/// Both randoms feed the master secret and the key expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let gmt_unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        Self {
            gmt_unix_time,
            random_bytes: from_fn(|_| rng.gen()),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        map(
            pair(be_u32, take(28_usize)),
            |(gmt_unix_time, bytes): (u32, &[u8])| Random {
                gmt_unix_time,
                random_bytes: from_fn(|i| bytes[i]),
            },
        )(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.to_bytes());
    }

    pub fn to_bytes(&self) -> [u8; RANDOM_LENGTH] {
        let mut out = [0u8; RANDOM_LENGTH];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }
}
