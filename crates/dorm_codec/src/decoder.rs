//! Canonical CBOR decoder.

use crate::document::{cmp_key, Document};
use crate::encoder::TAG_EPOCH_DATETIME;
use crate::error::{CodecError, CodecResult};
use chrono::DateTime;
use std::cmp::Ordering;

/// Decode a document from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain
/// forbidden constructs (NaN, indefinite-length) or have trailing bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Document> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let document = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(document)
}

/// A canonical CBOR decoder.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Maximum allowed element count for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed text length in bytes.
const MAX_TEXT_LENGTH: u64 = 256 * 1024 * 1024;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next document.
    pub fn decode(&mut self) -> CodecResult<Document> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Document::Integer)
                    .map_err(|_| CodecError::unsupported_type("unsigned integer above i64::MAX"))
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(|n| Document::Integer(-n - 1))
                    .map_err(|_| CodecError::unsupported_type("negative integer below i64::MIN"))
            }
            2 => Err(CodecError::unsupported_type("byte string")),
            3 => self.decode_text(additional_info).map(Document::Text),
            4 => self.decode_array(additional_info),
            5 => self.decode_map(additional_info),
            6 => {
                let tag = self.decode_unsigned(additional_info)?;
                if tag == TAG_EPOCH_DATETIME {
                    self.decode_date()
                } else {
                    // Unknown tags are transparent
                    self.decode()
                }
            }
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let non_canonical =
            || CodecError::invalid_structure("non-canonical: value could be encoded in fewer bytes");
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => {
                let byte = self.read_byte()?;
                if byte < 24 {
                    return Err(non_canonical());
                }
                Ok(u64::from(byte))
            }
            25 => {
                let value = u16::from_be_bytes(self.read_array()?);
                if u8::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            26 => {
                let value = u32::from_be_bytes(self.read_array()?);
                if u16::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            27 => {
                let value = u64::from_be_bytes(self.read_array()?);
                if u32::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(value)
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            _ => Err(CodecError::IndefiniteLengthForbidden),
        }
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<String> {
        let len = self.decode_length(additional_info, MAX_TEXT_LENGTH)?;
        let bytes = self.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_string())
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Document> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Document::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Document> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs: Vec<(String, Document)> = Vec::with_capacity(len.min(1024));

        for _ in 0..len {
            let initial_byte = self.read_byte()?;
            if initial_byte >> 5 != 3 {
                return Err(CodecError::invalid_structure("map keys must be text"));
            }
            let key = self.decode_text(initial_byte & 0x1f)?;

            // Keys must be strictly increasing
            if let Some((prev, _)) = pairs.last() {
                if cmp_key(prev, &key) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Document::Map(pairs))
    }

    fn decode_date(&mut self) -> CodecResult<Document> {
        let millis = match self.decode()? {
            Document::Integer(seconds) => seconds
                .checked_mul(1000)
                .ok_or_else(|| CodecError::invalid_structure("date out of range"))?,
            #[allow(clippy::cast_possible_truncation)]
            Document::Float(seconds) => (seconds * 1000.0).round() as i64,
            other => {
                return Err(CodecError::invalid_structure(format!(
                    "date tag wraps {}",
                    other.type_name()
                )))
            }
        };
        DateTime::from_timestamp_millis(millis)
            .map(Document::Date)
            .ok_or_else(|| CodecError::invalid_structure("date out of range"))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Document> {
        match additional_info {
            20 => Ok(Document::Bool(false)),
            21 => Ok(Document::Bool(true)),
            // undefined reads as null
            22 | 23 => Ok(Document::Null),
            26 => {
                let value = f32::from_be_bytes(self.read_array()?);
                if value.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Document::Float(f64::from(value)))
            }
            27 => {
                let value = f64::from_be_bytes(self.read_array()?);
                if value.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Document::Float(value))
            }
            25 => Err(CodecError::unsupported_type("half-precision float")),
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}
