use super::DataIntegrityError;
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian, WriteBytesExt};

/// Byte order of the scalars in a method's embedded data
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PayloadEncoding {
    Little,
    Big,
}

impl PayloadEncoding {
    /// Byte order of the host
    pub fn native() -> PayloadEncoding {
        if cfg!(target_endian = "big") {
            PayloadEncoding::Big
        } else {
            PayloadEncoding::Little
        }
    }

    /// Do values read with the host byte order need their bytes reversed?
    pub fn needs_swap(self) -> bool {
        self != PayloadEncoding::native()
    }

    fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            PayloadEncoding::Little => LittleEndian::read_u16(bytes),
            PayloadEncoding::Big => BigEndian::read_u16(bytes),
        }
    }

    fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            PayloadEncoding::Little => LittleEndian::read_u32(bytes),
            PayloadEncoding::Big => BigEndian::read_u32(bytes),
        }
    }
}

/// Decoded header and raw data of a `fill-array-data-payload`
///
/// Layout: `u16` identifier (`0x0300`), `u16` element width, `u32` element count, then the
/// elements back to back. Everything is in the code's declared byte order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArrayDataPayload {
    element_width: u16,
    size: u32,
    data: Vec<u8>,
    encoding: PayloadEncoding,
}

impl ArrayDataPayload {
    pub const IDENT: u16 = 0x0300;
    const HEADER_LEN: usize = 8;

    /// Validate and decode the header of a payload
    ///
    /// Trailing bytes after the last element (padding) are ignored.
    pub fn parse(bytes: &[u8], encoding: PayloadEncoding) -> Result<Self, DataIntegrityError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(DataIntegrityError::TruncatedPayload {
                expected: Self::HEADER_LEN,
                found: bytes.len(),
            });
        }
        let ident = encoding.read_u16(&bytes[0..2]);
        if ident != Self::IDENT {
            return Err(DataIntegrityError::BadPayloadIdent(ident));
        }
        let element_width = encoding.read_u16(&bytes[2..4]);
        if !matches!(element_width, 1 | 2 | 4 | 8) {
            return Err(DataIntegrityError::BadElementWidth(element_width));
        }
        let size = encoding.read_u32(&bytes[4..8]);

        let data_len = (size as usize)
            .checked_mul(element_width as usize)
            .ok_or(DataIntegrityError::TruncatedPayload {
                expected: usize::MAX,
                found: bytes.len(),
            })?;
        let data = &bytes[Self::HEADER_LEN..];
        if data.len() < data_len {
            return Err(DataIntegrityError::TruncatedPayload {
                expected: Self::HEADER_LEN + data_len,
                found: bytes.len(),
            });
        }

        Ok(ArrayDataPayload {
            element_width,
            size,
            data: data[..data_len].to_vec(),
            encoding,
        })
    }

    /// Encode a payload with the given element width
    ///
    /// Values are truncated to the element width.
    pub fn encode(element_width: u16, values: &[i64], encoding: PayloadEncoding) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + values.len() * element_width as usize);
        let result = match encoding {
            PayloadEncoding::Little => Self::encode_to::<LittleEndian>(&mut bytes, element_width, values),
            PayloadEncoding::Big => Self::encode_to::<BigEndian>(&mut bytes, element_width, values),
        };
        result.expect("writing to a vector cannot fail");
        bytes
    }

    fn encode_to<B: ByteOrder>(
        bytes: &mut Vec<u8>,
        element_width: u16,
        values: &[i64],
    ) -> std::io::Result<()> {
        bytes.write_u16::<B>(Self::IDENT)?;
        bytes.write_u16::<B>(element_width)?;
        bytes.write_u32::<B>(values.len() as u32)?;
        for value in values {
            match element_width {
                1 => bytes.write_i8(*value as i8)?,
                2 => bytes.write_i16::<B>(*value as i16)?,
                4 => bytes.write_i32::<B>(*value as i32)?,
                _ => bytes.write_i64::<B>(*value)?,
            }
        }
        Ok(())
    }

    /// Width in bytes of each element
    pub fn element_width(&self) -> u16 {
        self.element_width
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    /// Raw bits of the element at some index, sign-extended from the element width
    ///
    /// Bytes are read in host order then swapped if the payload's declared order differs. Single
    /// byte elements never need swapping.
    pub fn element(&self, index: usize) -> Option<i64> {
        let width = self.element_width as usize;
        if index >= self.len() {
            return None;
        }
        let bytes = &self.data[index * width..(index + 1) * width];
        let swap = self.encoding.needs_swap();
        let value = match width {
            1 => bytes[0] as i8 as i64,
            2 => {
                let raw = NativeEndian::read_i16(bytes);
                (if swap { raw.swap_bytes() } else { raw }) as i64
            }
            4 => {
                let raw = NativeEndian::read_i32(bytes);
                (if swap { raw.swap_bytes() } else { raw }) as i64
            }
            8 => {
                let raw = NativeEndian::read_i64(bytes);
                if swap {
                    raw.swap_bytes()
                } else {
                    raw
                }
            }
            _ => return None,
        };
        Some(value)
    }

    /// All elements, in order
    pub fn elements(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).filter_map(move |index| self.element(index))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_ints() {
        let bytes = vec![
            0x03, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, // header
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, // data
        ];
        let payload = ArrayDataPayload::parse(&bytes, PayloadEncoding::Big).unwrap();
        assert_eq!(payload.element_width(), 4);
        assert_eq!(payload.elements().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn single_bytes_are_never_swapped() {
        for encoding in [PayloadEncoding::Little, PayloadEncoding::Big] {
            let bytes = ArrayDataPayload::encode(1, &[1, -2, 127], encoding);
            let payload = ArrayDataPayload::parse(&bytes, encoding).unwrap();
            assert_eq!(payload.elements().collect::<Vec<_>>(), vec![1, -2, 127]);
        }
    }

    #[test]
    fn sign_extension() {
        let bytes = ArrayDataPayload::encode(2, &[0xffff, 0x7fff], PayloadEncoding::Little);
        let payload = ArrayDataPayload::parse(&bytes, PayloadEncoding::Little).unwrap();
        assert_eq!(payload.element(0), Some(-1));
        assert_eq!(payload.element(1), Some(0x7fff));
        assert_eq!(payload.element(2), None);
    }

    #[test]
    fn malformed_payloads() {
        let mut bytes = ArrayDataPayload::encode(4, &[1, 2, 3], PayloadEncoding::Little);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(
            ArrayDataPayload::parse(&bytes, PayloadEncoding::Little),
            Err(DataIntegrityError::TruncatedPayload {
                expected: 20,
                found: 19
            })
        );

        let bytes = ArrayDataPayload::encode(3, &[], PayloadEncoding::Little);
        assert_eq!(
            ArrayDataPayload::parse(&bytes, PayloadEncoding::Little),
            Err(DataIntegrityError::BadElementWidth(3))
        );

        let bytes = ArrayDataPayload::encode(4, &[], PayloadEncoding::Big);
        assert_eq!(
            ArrayDataPayload::parse(&bytes, PayloadEncoding::Little),
            Err(DataIntegrityError::BadPayloadIdent(0x0003))
        );

        assert!(ArrayDataPayload::parse(&[0x00, 0x03], PayloadEncoding::Little).is_err());
    }
}
