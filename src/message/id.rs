use std::fmt;
use std::ops::Deref;

use nom::combinator::{map, verify};
use nom::multi::length_data;
use nom::number::complete::be_u8;
use nom::IResult;
use rand::Rng;

/// An opaque value of at most `MAX` bytes, written with a one byte length.
#[derive(Clone, Copy)]
pub struct ShortOpaque<const MAX: usize> {
    bytes: [u8; MAX],
    len: usize,
}

/// Always empty: this engine neither offers nor resumes sessions.
pub type SessionId = ShortOpaque<32>;

/// The server's HelloVerifyRequest challenge, echoed in the second ClientHello.
pub type Cookie = ShortOpaque<255>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLength {
    pub max: usize,
    pub len: usize,
}

impl std::error::Error for InvalidLength {}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes does not fit in {}", self.len, self.max)
    }
}

impl<const MAX: usize> ShortOpaque<MAX> {
    pub const MAX_LEN: usize = MAX;

    pub fn empty() -> Self {
        ShortOpaque {
            bytes: [0; MAX],
            len: 0,
        }
    }

    pub fn try_new(data: &[u8]) -> Result<Self, InvalidLength> {
        if data.len() > MAX {
            return Err(InvalidLength {
                max: MAX,
                len: data.len(),
            });
        }
        let mut value = Self::empty();
        value.bytes[..data.len()].copy_from_slice(data);
        value.len = data.len();
        Ok(value)
    }

    /// `len` random bytes, clamped to `MAX`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let mut value = Self::empty();
        value.len = len.min(MAX);
        rng.fill(&mut value.bytes[..value.len]);
        value
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let fits = verify(length_data(be_u8), |data: &[u8]| data.len() <= MAX);
        map(fits, |data: &[u8]| {
            let mut value = Self::empty();
            value.bytes[..data.len()].copy_from_slice(data);
            value.len = data.len();
            value
        })(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.len as u8);
        output.extend_from_slice(self);
    }
}

impl<const MAX: usize> Default for ShortOpaque<MAX> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const MAX: usize> Deref for ShortOpaque<MAX> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl<const MAX: usize> PartialEq for ShortOpaque<MAX> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<const MAX: usize> Eq for ShortOpaque<MAX> {}

impl<const MAX: usize> fmt::Debug for ShortOpaque<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x?}", &**self)
    }
}
