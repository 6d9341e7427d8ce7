//! Payload codec
//!
//! Turns terminal text into the bytes written to the device. Two encodings
//! are supported:
//!
//! - [`SendEncoding::Raw`]: the UTF-8 bytes of the text, verbatim
//! - [`SendEncoding::NumericTokens`]: the text is split on whitespace runs and
//!   every token is read as an integer literal narrowed to one byte
//!
//! Integer literals accept an optional sign followed by `0x`/`0X`/`#` for
//! hexadecimal, a leading `0` for octal, or plain decimal digits. Values must
//! fit a 32-bit signed integer; only the low byte is kept.
//!
//! Incoming data is not decoded: frames are passed through as raw bytes.
//!
//! # Example
//!
//! ```
//! use protocol::{encode, SendEncoding};
//!
//! let encoded = encode("10 0x1F 255", SendEncoding::NumericTokens);
//! assert_eq!(encoded.bytes, vec![10, 31, 255]);
//! assert!(encoded.error.is_none());
//! ```

use crate::error::EncodingError;
use crate::types::SendEncoding;

/// Result of encoding one payload
///
/// When a numeric token fails to parse, `bytes` holds the tokens decoded
/// before it and `error` describes the failing token. Callers still transmit
/// `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub error: Option<EncodingError>,
}

impl EncodedPayload {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Encode terminal text for transmission
pub fn encode(payload: &str, encoding: SendEncoding) -> EncodedPayload {
    match encoding {
        SendEncoding::Raw => EncodedPayload {
            bytes: payload.as_bytes().to_vec(),
            error: None,
        },
        SendEncoding::NumericTokens => encode_tokens(payload),
    }
}

/// Incoming frames are delivered as-is
pub fn decode(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

fn encode_tokens(payload: &str) -> EncodedPayload {
    let mut bytes = Vec::new();

    for (position, token) in payload.split_whitespace().enumerate() {
        match parse_integer_literal(token) {
            Ok(value) => bytes.push(value as u8),
            Err(reason) => {
                return EncodedPayload {
                    bytes,
                    error: Some(EncodingError::InvalidToken {
                        token: token.to_string(),
                        position,
                        reason,
                    }),
                };
            }
        }
    }

    EncodedPayload { bytes, error: None }
}

/// Parse a signed integer literal with an optional radix prefix
pub fn parse_integer_literal(token: &str) -> Result<i32, String> {
    if token.is_empty() {
        return Err("empty token".to_string());
    }

    let (negative, unsigned) = match token.as_bytes()[0] {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };

    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
        .or_else(|| unsigned.strip_prefix('#'))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };

    if digits.is_empty() {
        return Err("missing digits".to_string());
    }
    if digits.starts_with('-') || digits.starts_with('+') {
        return Err("sign character in unexpected position".to_string());
    }

    let magnitude = i64::from_str_radix(digits, radix)
        .map_err(|e| format!("not a base-{} number: {}", radix, e))?;
    let value = if negative { -magnitude } else { magnitude };

    i32::try_from(value).map_err(|_| format!("{} is out of 32-bit range", value))
}

/// Render bytes as decimal tokens, the inverse of numeric encoding
pub fn format_numeric(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render bytes as space-separated hex pairs
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
