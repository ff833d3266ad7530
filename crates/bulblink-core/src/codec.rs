//! Characteristic value codec
//!
//! Property values travel as fixed-width big-endian integers. Power and
//! brightness use a single byte; color temperature needs two. Text-oriented
//! transports carry the same bytes as standard base64, and diagnostics print
//! them as a `0x`-prefixed upper-case hex literal.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{BulbError, Result};

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Wire form of a characteristic value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// The transport delivered no value
    #[default]
    Empty,
    /// Raw characteristic bytes
    Bytes(Vec<u8>),
}

impl Payload {
    /// Raw bytes carried by this payload (empty for [`Payload::Empty`])
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Payload::Empty
        } else {
            Payload::Bytes(bytes)
        }
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::from(bytes.to_vec())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => write!(f, "<empty>"),
            Payload::Bytes(bytes) => write!(f, "{}", to_hex_literal(bytes)),
        }
    }
}

// ----------------------------------------------------------------------------
// Value Width
// ----------------------------------------------------------------------------

/// Number of bytes a property occupies on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueWidth {
    Byte,
    Word,
}

impl ValueWidth {
    pub const fn bytes(self) -> usize {
        match self {
            ValueWidth::Byte => 1,
            ValueWidth::Word => 2,
        }
    }

    /// Largest value representable at this width
    pub const fn max_value(self) -> u32 {
        match self {
            ValueWidth::Byte => u8::MAX as u32,
            ValueWidth::Word => u16::MAX as u32,
        }
    }
}

impl fmt::Display for ValueWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-byte", self.bytes())
    }
}

// ----------------------------------------------------------------------------
// Integer Encoding
// ----------------------------------------------------------------------------

/// Encode `value` as a big-endian payload of exactly `width` bytes
pub fn encode(value: u32, width: ValueWidth) -> Result<Payload> {
    if value > width.max_value() {
        return Err(BulbError::ValueOutOfRange { value, width });
    }

    let bytes = value.to_be_bytes();
    Ok(Payload::Bytes(bytes[bytes.len() - width.bytes()..].to_vec()))
}

/// Decode a big-endian payload of at most `width` bytes.
///
/// Shorter payloads are read as if left-padded with zeros.
pub fn decode(payload: &Payload, width: ValueWidth) -> Result<u32> {
    let bytes = payload.as_bytes();
    if bytes.is_empty() {
        return Err(BulbError::malformed("empty payload"));
    }
    if bytes.len() > width.bytes() {
        return Err(BulbError::malformed(format!(
            "{} bytes ({}) exceed a {} value",
            bytes.len(),
            to_hex_literal(bytes),
            width
        )));
    }

    Ok(bytes
        .iter()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
}

// ----------------------------------------------------------------------------
// Text Representations
// ----------------------------------------------------------------------------

/// Render bytes as `0x` followed by two upper-case hex digits per byte
pub fn to_hex_literal(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode_upper(bytes))
}

/// Parse a hex literal with an optional `0x` prefix and any digit count
pub fn parse_hex_literal(text: &str) -> Result<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() {
        return Err(BulbError::malformed("empty hex literal"));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BulbError::malformed(format!("not a hex literal: {text:?}")));
    }

    u32::from_str_radix(digits, 16)
        .map_err(|e| BulbError::malformed(format!("hex literal {text:?}: {e}")))
}

/// Encode a payload in the transport's text form (standard base64)
pub fn to_wire_text(payload: &Payload) -> String {
    STANDARD.encode(payload.as_bytes())
}

/// Decode the transport's text form back into a payload
pub fn from_wire_text(text: &str) -> Result<Payload> {
    STANDARD
        .decode(text.trim())
        .map(Payload::from)
        .map_err(|e| BulbError::malformed(format!("invalid base64 {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_byte_examples() {
        assert_eq!(encode(1, ValueWidth::Byte).unwrap(), Payload::Bytes(vec![0x01]));
        assert_eq!(encode(255, ValueWidth::Byte).unwrap(), Payload::Bytes(vec![0xFF]));
        assert_eq!(encode(0, ValueWidth::Byte).unwrap(), Payload::Bytes(vec![0x00]));
    }

    #[test]
    fn test_word_is_big_endian() {
        assert_eq!(
            encode(500, ValueWidth::Word).unwrap(),
            Payload::Bytes(vec![0x01, 0xF4])
        );
        assert_eq!(decode(&Payload::Bytes(vec![0x00, 0x99]), ValueWidth::Word).unwrap(), 153);
    }

    #[test]
    fn test_encode_rejects_values_wider_than_width() {
        let err = encode(256, ValueWidth::Byte).unwrap_err();
        assert_eq!(
            err,
            BulbError::ValueOutOfRange {
                value: 256,
                width: ValueWidth::Byte
            }
        );
    }

    #[test]
    fn test_decode_short_word_payload() {
        // Accessory firmware may send a single byte for small values
        assert_eq!(decode(&Payload::Bytes(vec![0x01]), ValueWidth::Word).unwrap(), 1);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode(&Payload::Empty, ValueWidth::Byte),
            Err(BulbError::MalformedPayload { .. })
        ));
        assert!(matches!(
            decode(&Payload::Bytes(Vec::new()), ValueWidth::Byte),
            Err(BulbError::MalformedPayload { .. })
        ));
        assert!(matches!(
            decode(&Payload::Bytes(vec![0x01, 0x02]), ValueWidth::Byte),
            Err(BulbError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(to_hex_literal(&[0x01]), "0x01");
        assert_eq!(to_hex_literal(&[0x01, 0xf4]), "0x01F4");
        assert_eq!(parse_hex_literal("0x1").unwrap(), 1);
        assert_eq!(parse_hex_literal("0x01").unwrap(), 1);
        assert_eq!(parse_hex_literal("FF").unwrap(), 255);
        assert_eq!(parse_hex_literal("0X1f4").unwrap(), 500);

        for bad in ["", "0x", "0xZZ", "+1", "0x-1"] {
            assert!(
                matches!(parse_hex_literal(bad), Err(BulbError::MalformedPayload { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_wire_text() {
        // The accessory reports power as "AQ==" (on) and "AA==" (off)
        assert_eq!(to_wire_text(&encode(1, ValueWidth::Byte).unwrap()), "AQ==");
        assert_eq!(to_wire_text(&encode(0, ValueWidth::Byte).unwrap()), "AA==");
        assert_eq!(from_wire_text("AQ==").unwrap(), Payload::Bytes(vec![0x01]));
        assert_eq!(from_wire_text("").unwrap(), Payload::Empty);
        assert!(matches!(
            from_wire_text("not base64!"),
            Err(BulbError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_payload_display() {
        assert_eq!(Payload::Bytes(vec![0x01]).to_string(), "0x01");
        assert_eq!(Payload::Empty.to_string(), "<empty>");
        assert_eq!(Payload::from(Vec::new()), Payload::Empty);
    }

    proptest! {
        #[test]
        fn prop_byte_round_trip(value in 0u32..=255) {
            let payload = encode(value, ValueWidth::Byte).unwrap();
            prop_assert_eq!(payload.as_bytes().len(), 1);
            prop_assert_eq!(decode(&payload, ValueWidth::Byte).unwrap(), value);
        }

        #[test]
        fn prop_color_temperature_round_trip(value in 153u32..=500) {
            let payload = encode(value, ValueWidth::Word).unwrap();
            prop_assert_eq!(decode(&payload, ValueWidth::Word).unwrap(), value);
            let text = to_wire_text(&payload);
            prop_assert_eq!(decode(&from_wire_text(&text).unwrap(), ValueWidth::Word).unwrap(), value);
        }

        #[test]
        fn prop_hex_literal_round_trip(bytes in proptest::collection::vec(any::<u8>(), 1..=2)) {
            let literal = to_hex_literal(&bytes);
            let expected = decode(&Payload::from(bytes), ValueWidth::Word).unwrap();
            prop_assert_eq!(parse_hex_literal(&literal).unwrap(), expected);
        }
    }
}
