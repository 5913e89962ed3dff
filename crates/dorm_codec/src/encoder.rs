//! Canonical CBOR encoder.

use crate::document::{cmp_key, Document};
use crate::error::{CodecError, CodecResult};

/// CBOR tag for an epoch-based date/time (RFC 8949 section 3.4.2).
pub(crate) const TAG_EPOCH_DATETIME: u64 = 1;

/// Encode a document to canonical CBOR bytes.
///
/// The output is deterministic:
/// - Map keys are sorted by their encoded form (length-first, then bytewise)
/// - Integers use the shortest possible encoding
/// - Floats are always written as 64-bit
/// - Dates are tag 1 with integer seconds, or float seconds when they carry milliseconds
/// - No indefinite-length encoding
///
/// # Errors
///
/// Returns an error if the document contains a NaN.
pub fn to_canonical_cbor(document: &Document) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(document)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a document.
    pub fn encode(&mut self, document: &Document) -> CodecResult<()> {
        match document {
            Document::Null => self.buffer.push(0xf6),
            Document::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Document::Integer(n) => self.encode_integer(*n),
            Document::Float(f) => self.encode_float(*f)?,
            Document::Text(s) => self.encode_text(s),
            Document::Date(at) => {
                self.encode_unsigned(6, TAG_EPOCH_DATETIME);
                let millis = at.timestamp_millis();
                if millis % 1000 == 0 {
                    self.encode_integer(millis / 1000);
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let seconds = millis as f64 / 1000.0;
                    self.encode_float(seconds)?;
                }
            }
            Document::Array(items) => {
                self.encode_unsigned(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Document::Map(pairs) => self.encode_map(pairs)?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // CBOR negative integers carry -(n+1)
            let abs_minus_one = (-(n + 1)) as u64;
            self.encode_unsigned(1, abs_minus_one);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if f.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&f.to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_text(&mut self, text: &str) {
        self.encode_unsigned(3, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    fn encode_map(&mut self, pairs: &[(String, Document)]) -> CodecResult<()> {
        let mut sorted: Vec<&(String, Document)> = pairs.iter().collect();
        sorted.sort_by(|a, b| cmp_key(&a.0, &b.0));

        if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::encoding_failed("duplicate map key"));
        }

        self.encode_unsigned(5, pairs.len() as u64);
        for (key, value) in sorted {
            self.encode_text(key);
            self.encode(value)?;
        }
        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn encode_simple_values() {
        assert_eq!(to_canonical_cbor(&Document::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Document::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Document::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_encoding() {
        assert_eq!(to_canonical_cbor(&Document::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(
            to_canonical_cbor(&Document::Integer(255)).unwrap(),
            vec![0x18, 255]
        );
        assert_eq!(
            to_canonical_cbor(&Document::Integer(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Document::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(
            to_canonical_cbor(&Document::Integer(-100)).unwrap(),
            vec![0x38, 99]
        );
    }

    #[test]
    fn floats_are_always_double() {
        let bytes = to_canonical_cbor(&Document::Float(1.5)).unwrap();
        assert_eq!(bytes[0], 0xfb);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(
            to_canonical_cbor(&Document::Float(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn whole_second_dates_are_tagged_integers() {
        let at = DateTime::from_timestamp(100, 0).unwrap();
        let bytes = to_canonical_cbor(&Document::Date(at)).unwrap();
        assert_eq!(bytes, vec![0xc1, 0x18, 100]);
    }

    #[test]
    fn map_keys_sorted_regardless_of_input_order() {
        let map = Document::Map(vec![
            ("bb".to_string(), Document::Integer(2)),
            ("a".to_string(), Document::Integer(1)),
        ]);
        let bytes = to_canonical_cbor(&map).unwrap();
        assert_eq!(bytes, vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn duplicate_keys_fail() {
        let map = Document::Map(vec![
            (String::new(), Document::Integer(1)),
            (String::new(), Document::Integer(2)),
        ]);
        assert!(matches!(
            to_canonical_cbor(&map),
            Err(CodecError::EncodingFailed { .. })
        ));
    }
}
