pub mod ec_point_formats;
pub mod server_name;
pub mod signature_algorithms;
pub mod supported_groups;
pub mod use_srtp;

pub use ec_point_formats::{ECPointFormat, ECPointFormatsExtension};
pub use server_name::ServerNameExtension;
pub use signature_algorithms::SignatureAlgorithmsExtension;
pub use supported_groups::SupportedGroupsExtension;
pub use use_srtp::{SrtpProtectionProfile, UseSrtpExtension};

use nom::bytes::complete::take;
use nom::multi::{length_data, length_value, many0};
use nom::number::complete::be_u16;
use nom::sequence::pair;
use nom::IResult;

code_point! {
    /// Hello extension code points, IANA "TLS ExtensionType Values".
    pub enum ExtensionType: u16 {
        ServerName = 0x0000,
        SupportedGroups = 0x000A,
        EcPointFormats = 0x000B,
        SignatureAlgorithms = 0x000D,
        UseSrtp = 0x000E,
        ExtendedMasterSecret = 0x0017,
        RenegotiationInfo = 0xFF01,
    }
}

/// A `u16` length prefixed vector of fixed size items. A trailing partial
/// item is ignored.
fn u16_list<'a, T, F>(item: F) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Vec<T>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    length_value(be_u16, many0(item))
}

fn write_u16_list<T: Copy>(output: &mut Vec<u8>, items: &[T], code: impl Fn(T) -> u16) {
    output.extend_from_slice(&((items.len() * 2) as u16).to_be_bytes());
    for item in items {
        output.extend_from_slice(&code(*item).to_be_bytes());
    }
}

/// type(2) length(2) data
fn write_extension(list: &mut Vec<u8>, typ: ExtensionType, body: &[u8]) {
    typ.serialize(list);
    list.extend_from_slice(&(body.len() as u16).to_be_bytes());
    list.extend_from_slice(body);
}

/// The hello extensions this engine understands, decoded.
///
/// Extensions we do not know are skipped when parsing and never written back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HelloExtensions {
    pub server_name: Option<ServerNameExtension>,
    pub supported_groups: Option<SupportedGroupsExtension>,
    pub ec_point_formats: Option<ECPointFormatsExtension>,
    pub signature_algorithms: Option<SignatureAlgorithmsExtension>,
    pub use_srtp: Option<UseSrtpExtension>,
    pub extended_master_secret: bool,
    pub renegotiation_info: bool,
}

impl HelloExtensions {
    pub fn is_empty(&self) -> bool {
        *self == HelloExtensions::default()
    }

    /// Parse the optional extensions block that ends a hello message.
    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloExtensions> {
        let mut extensions = HelloExtensions::default();

        if input.is_empty() {
            return Ok((input, extensions));
        }

        let (input, total_len) = be_u16(input)?;
        let (input, mut data) = take(total_len)(input)?;

        while !data.is_empty() {
            let (rest, (typ, body)) = pair(ExtensionType::parse, length_data(be_u16))(data)?;
            data = rest;

            match typ {
                ExtensionType::ServerName => {
                    // A ServerHello echoes server_name with an empty body.
                    if !body.is_empty() {
                        let (_, ext) = ServerNameExtension::parse(body)?;
                        extensions.server_name = Some(ext);
                    }
                }
                ExtensionType::SupportedGroups => {
                    let (_, ext) = SupportedGroupsExtension::parse(body)?;
                    extensions.supported_groups = Some(ext);
                }
                ExtensionType::EcPointFormats => {
                    let (_, ext) = ECPointFormatsExtension::parse(body)?;
                    extensions.ec_point_formats = Some(ext);
                }
                ExtensionType::SignatureAlgorithms => {
                    let (_, ext) = SignatureAlgorithmsExtension::parse(body)?;
                    extensions.signature_algorithms = Some(ext);
                }
                ExtensionType::UseSrtp => {
                    let (_, ext) = UseSrtpExtension::parse(body)?;
                    extensions.use_srtp = Some(ext);
                }
                ExtensionType::ExtendedMasterSecret => {
                    extensions.extended_master_secret = true;
                }
                ExtensionType::RenegotiationInfo => {
                    extensions.renegotiation_info = true;
                }
                ExtensionType::Unknown(value) => {
                    trace!("Skipping unknown extension: {:#06x}", value);
                }
            }
        }

        Ok((input, extensions))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        if self.is_empty() {
            return;
        }

        let mut list = Vec::new();
        let mut body = Vec::new();

        if let Some(ext) = &self.server_name {
            ext.serialize(&mut body);
            write_extension(&mut list, ExtensionType::ServerName, &body);
            body.clear();
        }
        if let Some(ext) = &self.supported_groups {
            ext.serialize(&mut body);
            write_extension(&mut list, ExtensionType::SupportedGroups, &body);
            body.clear();
        }
        if let Some(ext) = &self.ec_point_formats {
            ext.serialize(&mut body);
            write_extension(&mut list, ExtensionType::EcPointFormats, &body);
            body.clear();
        }
        if let Some(ext) = &self.signature_algorithms {
            ext.serialize(&mut body);
            write_extension(&mut list, ExtensionType::SignatureAlgorithms, &body);
            body.clear();
        }
        if let Some(ext) = &self.use_srtp {
            ext.serialize(&mut body);
            write_extension(&mut list, ExtensionType::UseSrtp, &body);
            body.clear();
        }
        if self.extended_master_secret {
            write_extension(&mut list, ExtensionType::ExtendedMasterSecret, &[]);
        }
        if self.renegotiation_info {
            // Initial handshake, empty renegotiated_connection.
            write_extension(&mut list, ExtensionType::RenegotiationInfo, &[0]);
        }

        output.extend_from_slice(&(list.len() as u16).to_be_bytes());
        output.extend_from_slice(&list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NamedCurve;

    #[test]
    fn no_extensions_serializes_nothing() {
        let mut out = Vec::new();
        HelloExtensions::default().serialize(&mut out);
        assert!(out.is_empty());

        let (rest, parsed) = HelloExtensions::parse(&[]).unwrap();
        assert!(rest.is_empty());
        assert!(parsed.is_empty());
    }

    #[test]
    fn roundtrip() {
        let extensions = HelloExtensions {
            server_name: Some(ServerNameExtension::new("example.com")),
            supported_groups: Some(SupportedGroupsExtension::new(&[NamedCurve::X25519])),
            ec_point_formats: Some(ECPointFormatsExtension::default()),
            use_srtp: Some(UseSrtpExtension::new(&[
                SrtpProtectionProfile::Aes128CmHmacSha1_80,
            ])),
            extended_master_secret: true,
            ..Default::default()
        };

        let mut out = Vec::new();
        extensions.serialize(&mut out);

        let (rest, parsed) = HelloExtensions::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, extensions);
    }

    #[test]
    fn extension_type_code_points() {
        assert_eq!(ExtensionType::from(0x0017u16), ExtensionType::ExtendedMasterSecret);
        assert_eq!(u16::from(ExtensionType::RenegotiationInfo), 0xFF01);
        assert_eq!(ExtensionType::from(0x1234u16), ExtensionType::Unknown(0x1234));
    }

    #[test]
    fn truncated_extension_body() {
        let data = [
            0x00, 0x05, // Extensions length
            0x00, 0x0A, 0x00, 0x04, 0x00, // supported_groups, body cut short
        ];
        assert!(HelloExtensions::parse(&data).is_err());
    }

    #[test]
    fn unknown_extensions_are_skipped() {
        let data = [
            0x00, 0x09, // Extensions length
            0xAB, 0xCD, 0x00, 0x01, 0x00, // Unknown
            0x00, 0x17, 0x00, 0x00, // extended_master_secret
        ];

        let (rest, parsed) = HelloExtensions::parse(&data).unwrap();
        assert!(rest.is_empty());
        assert!(parsed.extended_master_secret);
        assert!(parsed.supported_groups.is_none());
    }
}
