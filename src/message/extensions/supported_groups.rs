use nom::combinator::map;
use nom::number::complete::be_u16;
use nom::IResult;

use super::{u16_list, write_u16_list};
use crate::crypto::NamedCurve;

/// Supported Groups (formerly EllipticCurves), RFC 8422 Section 5.1.1.
///
/// Unknown groups are kept so a server can walk the list in client order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SupportedGroupsExtension {
    pub groups: Vec<NamedCurve>,
}

impl SupportedGroupsExtension {
    pub fn new(groups: &[NamedCurve]) -> Self {
        SupportedGroupsExtension {
            groups: groups.to_vec(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], SupportedGroupsExtension> {
        map(u16_list(map(be_u16, NamedCurve::from_u16)), |groups| {
            SupportedGroupsExtension { groups }
        })(input)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        write_u16_list(output, &self.groups, |g| g.as_u16());
    }
}
