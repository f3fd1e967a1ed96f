/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Execution extraction from ExecutionReport (35=8) messages.

use fixmux_core::error::DecodeError;
use fixmux_core::execution::ExecutionRecord;
use fixmux_core::field::FieldRef;
use fixmux_core::message::{MsgType, RawMessage};
use fixmux_core::tags;
use fixmux_core::types::Side;

/// Reads the nine execution fields of an ExecutionReport.
///
/// Extraction is all or nothing: the first absent, empty or ill-typed field
/// fails the whole call and no record is produced.
///
/// # Errors
/// - `DecodeError::InvalidFieldValue` (tag 35) if the message is not an
///   ExecutionReport
/// - `DecodeError::MissingRequiredField` if a field is absent
/// - `DecodeError::InvalidFieldValue` if a field is empty or ill-typed
pub fn extract_execution(message: &RawMessage<'_>) -> Result<ExecutionRecord, DecodeError> {
    if *message.msg_type() != MsgType::ExecutionReport {
        return Err(DecodeError::InvalidFieldValue {
            tag: tags::MSG_TYPE,
            reason: format!("expected ExecutionReport, got '{}'", message.msg_type()),
        });
    }

    let side_char = required(message, tags::SIDE)?.as_char()?;
    let side = Side::from_char(side_char).ok_or_else(|| DecodeError::InvalidFieldValue {
        tag: tags::SIDE,
        reason: format!("unknown side '{side_char}'"),
    })?;

    Ok(ExecutionRecord {
        exec_id: required(message, tags::EXEC_ID)?.as_str()?.to_string(),
        symbol: required(message, tags::SYMBOL)?.as_str()?.to_string(),
        side,
        order_qty: required(message, tags::ORDER_QTY)?.as_decimal()?,
        last_px: required(message, tags::LAST_PX)?.as_decimal()?,
        last_qty: required(message, tags::LAST_QTY)?.as_decimal()?,
        transact_time: required(message, tags::TRANSACT_TIME)?.as_str()?.to_string(),
        exec_type: required(message, tags::EXEC_TYPE)?.as_char()?,
        ord_status: required(message, tags::ORD_STATUS)?.as_char()?,
    })
}

fn required<'a>(message: &RawMessage<'a>, tag: u32) -> Result<FieldRef<'a>, DecodeError> {
    let field = *message.require(tag)?;
    if field.is_empty() {
        return Err(DecodeError::InvalidFieldValue {
            tag,
            reason: "empty value".to_string(),
        });
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmux_core::message::OutboundMessage;
    use fixmux_tagvalue::{Decoder, Encoder};

    const FIELDS: [(u32, &str); 9] = [
        (tags::EXEC_ID, "EX-7781"),
        (tags::SYMBOL, "BTC/USD"),
        (tags::SIDE, "2"),
        (tags::ORDER_QTY, "1.50000000"),
        (tags::LAST_PX, "64250.5"),
        (tags::LAST_QTY, "0.75"),
        (tags::TRANSACT_TIME, "20240301-09:15:42.318"),
        (tags::EXEC_TYPE, "F"),
        (tags::ORD_STATUS, "1"),
    ];

    fn report(skip: Option<u32>) -> Vec<u8> {
        let mut msg = OutboundMessage::new(MsgType::ExecutionReport);
        msg.set_header_field(tags::SENDER_COMP_ID, "VENUE");
        msg.set_header_field(tags::MSG_SEQ_NUM, "12");
        for (tag, value) in FIELDS {
            if Some(tag) != skip {
                msg.set_field(tag, value);
            }
        }
        Encoder::encode("FIX.4.4", &msg).to_vec()
    }

    #[test]
    fn test_extract_matches_wire_values() {
        let bytes = report(None);
        let msg = Decoder::new(&bytes).decode().unwrap();
        let record = extract_execution(&msg).unwrap();

        assert_eq!(record.exec_id, "EX-7781");
        assert_eq!(record.symbol, "BTC/USD");
        assert_eq!(record.side, Side::Sell);
        assert_eq!(record.order_qty.to_string(), "1.50000000");
        assert_eq!(record.last_px.to_string(), "64250.5");
        assert_eq!(record.last_qty.to_string(), "0.75");
        assert_eq!(record.transact_time, "20240301-09:15:42.318");
        assert_eq!(record.exec_type, 'F');
        assert_eq!(record.ord_status, '1');
    }

    #[test]
    fn test_any_missing_field_fails() {
        for (tag, _) in FIELDS {
            let bytes = report(Some(tag));
            let msg = Decoder::new(&bytes).decode().unwrap();
            assert_eq!(
                extract_execution(&msg).unwrap_err(),
                DecodeError::MissingRequiredField { tag },
                "tag {tag}"
            );
        }
    }

    #[test]
    fn test_multileg_and_financing_sides_extracted() {
        for (wire, side) in [("B", Side::AsDefined), ("C", Side::Opposite), ("G", Side::Borrow)] {
            let mut msg = OutboundMessage::new(MsgType::ExecutionReport);
            for (tag, value) in FIELDS {
                msg.set_field(tag, value);
            }
            msg.set_field(tags::SIDE, wire);
            let bytes = Encoder::encode("FIX.4.4", &msg);
            let decoded = Decoder::new(&bytes).decode().unwrap();

            let record = extract_execution(&decoded).unwrap();
            assert_eq!(record.side, side);
            assert_eq!(record.side.as_char().to_string(), wire);
        }
    }

    #[test]
    fn test_ill_typed_field_fails() {
        let mut msg = OutboundMessage::new(MsgType::ExecutionReport);
        for (tag, value) in FIELDS {
            msg.set_field(tag, value);
        }
        msg.set_field(tags::LAST_PX, "abc");
        let bytes = Encoder::encode("FIX.4.4", &msg);
        let decoded = Decoder::new(&bytes).decode().unwrap();
        assert!(matches!(
            extract_execution(&decoded),
            Err(DecodeError::InvalidFieldValue {
                tag: tags::LAST_PX,
                ..
            })
        ));
    }

    #[test]
    fn test_not_an_execution_report() {
        let bytes = Encoder::encode("FIX.4.4", &OutboundMessage::new(MsgType::Heartbeat));
        let decoded = Decoder::new(&bytes).decode().unwrap();
        assert!(extract_execution(&decoded).is_err());
    }
}
