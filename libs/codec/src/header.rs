//! # Header Codec
//!
//! Typed values are stored on a message as raw bytes keyed by header id.
//! Numbers use fixed-width little-endian encoding, booleans a single 0/1
//! byte, strings and byte blobs are stored verbatim. Peers depend on this
//! exact layout, so widths never change.
//!
//! [`HeaderValue`] is the tagged form used when building messages;
//! [`HeaderType`] drives typed decoding on the read side.

use crate::error::{ProtocolError, ProtocolResult};

/// A typed header value ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Byte(u8),
    Bool(bool),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// Wire encoding of this value
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HeaderValue::Byte(v) => v.encode(),
            HeaderValue::Bool(v) => v.encode(),
            HeaderValue::U16(v) => v.encode(),
            HeaderValue::U32(v) => v.encode(),
            HeaderValue::U64(v) => v.encode(),
            HeaderValue::Str(v) => v.encode(),
            HeaderValue::Bytes(v) => v.clone(),
        }
    }

    /// Fixed encoded width, `None` for variable-length values
    pub fn width(&self) -> Option<usize> {
        match self {
            HeaderValue::Byte(_) | HeaderValue::Bool(_) => Some(1),
            HeaderValue::U16(_) => Some(2),
            HeaderValue::U32(_) => Some(4),
            HeaderValue::U64(_) => Some(8),
            HeaderValue::Str(_) | HeaderValue::Bytes(_) => None,
        }
    }
}

impl From<u8> for HeaderValue {
    fn from(v: u8) -> Self {
        HeaderValue::Byte(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

impl From<u16> for HeaderValue {
    fn from(v: u16) -> Self {
        HeaderValue::U16(v)
    }
}

impl From<u32> for HeaderValue {
    fn from(v: u32) -> Self {
        HeaderValue::U32(v)
    }
}

impl From<u64> for HeaderValue {
    fn from(v: u64) -> Self {
        HeaderValue::U64(v)
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Str(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Str(v.to_string())
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(v: Vec<u8>) -> Self {
        HeaderValue::Bytes(v)
    }
}

impl From<&[u8]> for HeaderValue {
    fn from(v: &[u8]) -> Self {
        HeaderValue::Bytes(v.to_vec())
    }
}

/// Types that can be read back out of a raw header
pub trait HeaderType: Sized {
    const TYPE_NAME: &'static str;

    fn encode(&self) -> Vec<u8>;

    fn decode(header_id: i32, raw: &[u8]) -> ProtocolResult<Self>;
}

macro_rules! fixed_width_header {
    ($ty:ty, $width:expr) => {
        impl HeaderType for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn encode(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn decode(header_id: i32, raw: &[u8]) -> ProtocolResult<Self> {
                let bytes: [u8; $width] = raw.try_into().map_err(|_| {
                    ProtocolError::header_width(header_id, $width, raw.len(), Self::TYPE_NAME)
                })?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

fixed_width_header!(u8, 1);
fixed_width_header!(u16, 2);
fixed_width_header!(u32, 4);
fixed_width_header!(u64, 8);

impl HeaderType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn encode(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn decode(header_id: i32, raw: &[u8]) -> ProtocolResult<Self> {
        match raw {
            [b] => Ok(*b != 0),
            _ => Err(ProtocolError::header_width(header_id, 1, raw.len(), Self::TYPE_NAME)),
        }
    }
}

impl HeaderType for String {
    const TYPE_NAME: &'static str = "string";

    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(header_id: i32, raw: &[u8]) -> ProtocolResult<Self> {
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8 { header_id })
    }
}

impl HeaderType for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(_header_id: i32, raw: &[u8]) -> ProtocolResult<Self> {
        Ok(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(HeaderValue::U16(50).encode(), vec![50, 0]);
        assert_eq!(HeaderValue::U32(0x0403_0201).encode(), vec![1, 2, 3, 4]);
        assert_eq!(
            HeaderValue::U64(0x0807_0605_0403_0201).encode(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(HeaderValue::Bool(true).encode(), vec![1]);
        assert_eq!(HeaderValue::Bool(false).encode(), vec![0]);
        assert_eq!(HeaderValue::from("svc").encode(), b"svc".to_vec());
    }

    #[test]
    fn test_width_mismatch_is_error() {
        let err = u32::decode(1000, &[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::HeaderWidth {
                header_id: 1000,
                expected: 4,
                got: 3,
                type_name: "u32",
            }
        );
        assert!(bool::decode(1023, &[]).is_err());
        assert!(u16::decode(1004, &[1, 0, 0]).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(
            String::decode(1006, &[0xff, 0xfe]),
            Err(ProtocolError::InvalidUtf8 { header_id: 1006 })
        );
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        assert!(bool::decode(1, &[2]).unwrap());
        assert!(!bool::decode(1, &[0]).unwrap());
    }
}
