/// An enum over an IANA registry of one or two byte code points.
///
/// Values without a name are kept as `Unknown` so they survive a parse and
/// serialize unchanged. Generates `From` in both directions, `parse`,
/// `serialize` and the `from_u8`/`as_u8` (or `u16`) pair.
macro_rules! code_point {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ident {
            $($variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown($repr),
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    _ => $name::Unknown(value),
                }
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $value,)+
                    $name::Unknown(value) => value,
                }
            }
        }

        impl $name {
            pub fn parse(input: &[u8]) -> nom::IResult<&[u8], $name> {
                nom::combinator::map(code_point!(@read $repr), $name::from)(input)
            }

            pub fn serialize(&self, output: &mut Vec<u8>) {
                output.extend_from_slice(&$repr::from(*self).to_be_bytes());
            }
        }

        code_point!(@accessors $name $repr);
    };

    (@read u8) => { nom::number::complete::be_u8 };
    (@read u16) => { nom::number::complete::be_u16 };

    (@accessors $name:ident u8) => {
        impl $name {
            pub fn from_u8(value: u8) -> Self {
                Self::from(value)
            }

            pub fn as_u8(&self) -> u8 {
                u8::from(*self)
            }
        }
    };
    (@accessors $name:ident u16) => {
        impl $name {
            pub fn from_u16(value: u16) -> Self {
                Self::from(value)
            }

            pub fn as_u16(&self) -> u16 {
                u16::from(*self)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    code_point! {
        pub enum Colour: u8 {
            Red = 1,
            Blue = 7,
        }
    }

    code_point! {
        pub enum Wide: u16 {
            Big = 0xFE01,
        }
    }

    #[test]
    fn unknown_values_are_kept() {
        assert_eq!(Colour::from_u8(7), Colour::Blue);
        assert_eq!(Colour::from_u8(9), Colour::Unknown(9));
        assert_eq!(Colour::Unknown(9).as_u8(), 9);
    }

    #[test]
    fn big_endian_on_the_wire() {
        let (rest, wide) = Wide::parse(&[0xFE, 0x01, 0xAA]).unwrap();
        assert_eq!(wide, Wide::Big);
        assert_eq!(rest, &[0xAA]);

        let mut out = Vec::new();
        Wide::Unknown(0x0102).serialize(&mut out);
        assert_eq!(out, [0x01, 0x02]);
    }
}
