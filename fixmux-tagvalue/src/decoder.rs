/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! Field values are returned as references into the input buffer; nothing is
//! allocated per field. RawData (96) is read by the length announced in the
//! preceding RawDataLength (95), so its value may contain SOH or '='.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixmux_core::error::DecodeError;
use fixmux_core::field::FieldRef;
use fixmux_core::message::{MsgType, RawMessage};
use fixmux_core::tags;
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Number of leading fields searched for MsgType by [`scan_msg_type`].
const HEADER_SCAN_FIELDS: usize = 8;

/// Zero-copy FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    raw_data_len: Option<usize>,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            raw_data_len: None,
        }
    }

    /// Decodes one complete FIX message from the buffer.
    ///
    /// The message must start with BeginString (8), BodyLength (9) and
    /// MsgType (35), in that order.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start = self.offset;

        let begin_string = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }

        let body_length = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        body_length
            .as_str()?
            .parse::<usize>()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type = parse_msg_type(msg_type_field.as_str()?);

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string);
        fields.push(body_length);
        fields.push(msg_type_field);

        let mut checksum_field = None;
        while let Some(field) = self.next_field() {
            if field.tag == tags::CHECK_SUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        let checksum = checksum_field.ok_or(DecodeError::Incomplete)?;
        let declared =
            parse_checksum(checksum.value).ok_or_else(|| DecodeError::InvalidFieldValue {
                tag: tags::CHECK_SUM,
                reason: "invalid checksum format".to_string(),
            })?;

        // "10=" precedes the value
        let checksum_start = self.value_offset(checksum.value) - 3;
        let calculated = calculate_checksum(&self.input[start..checksum_start]);
        if calculated != declared {
            return Err(DecodeError::ChecksumMismatch {
                calculated,
                declared,
            });
        }

        Ok(RawMessage::new(
            &self.input[start..self.offset],
            msg_type,
            fields,
        ))
    }

    /// Parses the next field from the buffer.
    ///
    /// A RawData (96) field directly after RawDataLength (95) spans exactly
    /// the announced number of bytes and must be followed by SOH.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted or malformed.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        let remaining = self.input.get(self.offset..)?;
        if remaining.is_empty() {
            return None;
        }

        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let value_len = match self.raw_data_len.take() {
            Some(len) if tag == tags::RAW_DATA => {
                let value_end = value_start.checked_add(len)?;
                (*remaining.get(value_end)? == SOH).then_some(len)?
            }
            _ => memchr(SOH, &remaining[value_start..])?,
        };
        let value = &remaining[value_start..value_start + value_len];

        if tag == tags::RAW_DATA_LENGTH {
            self.raw_data_len = std::str::from_utf8(value).ok()?.parse().ok();
        }

        self.offset += value_start + value_len + 1;
        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn value_offset(&self, value: &[u8]) -> usize {
        value.as_ptr() as usize - self.input.as_ptr() as usize
    }
}

/// Finds MsgType (35) among the leading header fields without validating
/// the rest of the message.
///
/// # Returns
/// `None` when no readable tag 35 appears in the header.
#[must_use]
pub fn scan_msg_type(input: &[u8]) -> Option<MsgType> {
    let mut decoder = Decoder::new(input);
    for _ in 0..HEADER_SCAN_FIELDS {
        let field = decoder.next_field()?;
        if field.tag == tags::MSG_TYPE {
            let value = field.as_str().ok()?;
            if value.is_empty() {
                return None;
            }
            return Some(parse_msg_type(value));
        }
    }
    None
}

fn parse_msg_type(value: &str) -> MsgType {
    match value.parse() {
        Ok(msg_type) => msg_type,
        Err(never) => match never {},
    }
}

/// Parses a tag number from ASCII digits.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    fn heartbeat() -> Vec<u8> {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        encoder.put_str(49, "CLIENT");
        encoder.put_str(56, "VENUE");
        encoder.put_uint(34, 7);
        encoder.finish().to_vec()
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_next_field() {
        let mut decoder = Decoder::new(b"8=FIX.4.4\x019=5\x0135=0\x01");
        assert_eq!(decoder.next_field().unwrap().tag, 8);
        assert_eq!(decoder.next_field().unwrap().as_str().unwrap(), "5");
        assert_eq!(decoder.next_field().unwrap().tag, 35);
        assert!(decoder.next_field().is_none());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_encoded_message() {
        let bytes = heartbeat();
        let msg = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(*msg.msg_type(), MsgType::Heartbeat);
        assert_eq!(msg.get_field_str(49), Some("CLIENT"));
        assert_eq!(msg.get_field_as::<u64>(34).unwrap(), 7);
        assert_eq!(msg.len(), bytes.len());
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut bytes = heartbeat();
        let pos = bytes.windows(6).position(|w| w == b"CLIENT").unwrap();
        bytes[pos] = b'K';
        assert!(matches!(
            Decoder::new(&bytes).decode(),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_raw_data_spans_announced_length() {
        let payload = "key=abc\x01sig=x=y";
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "A");
        encoder.put_uint(95, payload.len() as u64);
        encoder.put_str(96, payload);
        encoder.put_str(108, "30");
        let bytes = encoder.finish().to_vec();

        let msg = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(*msg.msg_type(), MsgType::Logon);
        assert_eq!(msg.get_field_str(96), Some(payload));
        assert_eq!(msg.get_field_str(108), Some("30"));
    }

    #[test]
    fn test_raw_data_without_trailing_soh_is_rejected() {
        let mut decoder = Decoder::new(b"95=9\x0196=abc\x01108=30\x01");
        assert_eq!(decoder.next_field().unwrap().tag, 95);
        assert!(decoder.next_field().is_none());

        // Without a preceding length, SOH ends the value as usual.
        let mut decoder = Decoder::new(b"96=abc\x01108=30\x01");
        assert_eq!(decoder.next_field().unwrap().as_str().unwrap(), "abc");
        assert_eq!(decoder.next_field().unwrap().tag, 108);
    }

    #[test]
    fn test_decode_requires_msg_type_third() {
        let input = b"8=FIX.4.4\x019=5\x0149=X\x0110=000\x01";
        assert!(matches!(
            Decoder::new(input).decode(),
            Err(DecodeError::MissingMsgType)
        ));
    }

    #[test]
    fn test_scan_msg_type() {
        assert_eq!(scan_msg_type(&heartbeat()), Some(MsgType::Heartbeat));
        assert_eq!(
            scan_msg_type(b"8=FIX.4.4\x019=10\x0135=8\x01garbage"),
            Some(MsgType::ExecutionReport)
        );
        assert_eq!(scan_msg_type(b"8=FIX.4.4\x019=10\x0149=X\x01"), None);
        assert_eq!(scan_msg_type(b"not fix at all"), None);
        assert_eq!(scan_msg_type(b"8=FIX.4.4\x0135=\x01"), None);
    }
}
