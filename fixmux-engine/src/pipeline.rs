/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Message pipeline of one session.
//!
//! Every wire message, in either direction, is classified and written to the
//! durable log before anything else looks at it, then published as a
//! [`SessionEvent::Message`]. Inbound ExecutionReports are extracted and
//! their records logged. Failures along the way are contained: they become
//! [`SessionEvent`]s and processing continues.

use crate::events::{EventPublisher, SessionEvent};
use bytes::Bytes;
use fixmux_core::error::DecodeError;
use fixmux_core::message::{Classification, Direction, RawMessage, WireMessage};
use fixmux_session::{Classifier, extract_execution};
use fixmux_store::SessionLog;
use fixmux_tagvalue::Decoder;
use tracing::{debug, warn};

/// Classify, log and extract stages for one session.
#[derive(Debug)]
pub struct Pipeline {
    classifier: Classifier,
    log: SessionLog,
    events: EventPublisher,
}

impl Pipeline {
    /// Creates a pipeline writing to `log`.
    #[must_use]
    pub fn new(classifier: Classifier, log: SessionLog, events: EventPublisher) -> Self {
        Self {
            classifier,
            log,
            events,
        }
    }

    /// Logs and publishes an outbound wire message that has just been written.
    pub fn record_outbound(&mut self, raw: &Bytes) -> Classification {
        let classification = self.classifier.classify(raw);
        self.record(raw, Direction::Outbound, classification);
        classification
    }

    /// Runs an inbound wire message through the pipeline.
    ///
    /// The raw bytes are logged first, so a message that fails to decode or
    /// extract is still durable.
    ///
    /// # Errors
    /// Returns the `DecodeError` if the message cannot be decoded; the error
    /// has already been published as an event.
    pub fn process_inbound<'a>(
        &mut self,
        raw: &'a Bytes,
    ) -> Result<(Classification, RawMessage<'a>), DecodeError> {
        let classification = self.classifier.classify(raw);
        self.record(raw, Direction::Inbound, classification);

        let message = match Decoder::new(raw).decode() {
            Ok(message) => message,
            Err(error) => {
                self.malformed(error.clone());
                return Err(error);
            }
        };

        if classification == Classification::ExecutionReport {
            self.process_execution(&message);
        }
        Ok((classification, message))
    }

    fn process_execution(&mut self, message: &RawMessage<'_>) {
        let record = match extract_execution(message) {
            Ok(record) => record,
            Err(error) => {
                self.malformed(error);
                return;
            }
        };
        if let Err(error) = self.log.log_execution(&record) {
            warn!(session = %self.events.session(), %error, "execution log write failed");
            self.events
                .emit(|session| SessionEvent::LogWriteFailed { session, error });
        }
        self.events
            .emit(|session| SessionEvent::Execution { session, record });
    }

    fn record(&mut self, raw: &Bytes, direction: Direction, classification: Classification) {
        let message = WireMessage::new(raw.clone(), direction, classification);
        debug!(
            session = %self.events.session(),
            %direction,
            %classification,
            wire = %message.display_text(),
            "fix message"
        );
        if let Err(error) = self.log.log_raw(raw) {
            warn!(session = %self.events.session(), %error, "message log write failed");
            self.events
                .emit(|session| SessionEvent::LogWriteFailed { session, error });
        }
        self.events
            .emit(|session| SessionEvent::Message { session, message });
    }

    fn malformed(&self, error: DecodeError) {
        warn!(session = %self.events.session(), %error, "malformed inbound message");
        self.events
            .emit(|session| SessionEvent::MalformedMessage { session, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmux_core::message::{MsgType, OutboundMessage};
    use fixmux_core::tags;
    use fixmux_session::SessionId;
    use fixmux_store::CommunalLog;
    use fixmux_tagvalue::Encoder;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn pipeline_in(
        dir: &Path,
        session_dir: &Path,
    ) -> (Pipeline, broadcast::Receiver<SessionEvent>) {
        let communal = Arc::new(CommunalLog::open(dir).unwrap());
        let id = SessionId::new("FIX.4.4", "CLIENT", "VENUE");
        let (tx, rx) = broadcast::channel(64);
        let log = SessionLog::new(session_dir, id.file_key(), communal);
        (
            Pipeline::new(Classifier::new(""), log, EventPublisher::new(id, tx)),
            rx,
        )
    }

    fn pipeline(dir: &Path) -> (Pipeline, broadcast::Receiver<SessionEvent>) {
        pipeline_in(dir, dir)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn execution_report(exec_id: &str, skip: Option<u32>) -> Bytes {
        let mut msg = OutboundMessage::new(MsgType::ExecutionReport);
        msg.set_header_field(tags::MSG_SEQ_NUM, "2");
        for (tag, value) in [
            (tags::EXEC_ID, exec_id),
            (tags::SYMBOL, "ETH/USD"),
            (tags::SIDE, "1"),
            (tags::ORDER_QTY, "3"),
            (tags::LAST_PX, "3100.25"),
            (tags::LAST_QTY, "1"),
            (tags::TRANSACT_TIME, "20240301-10:00:00.000"),
            (tags::EXEC_TYPE, "F"),
            (tags::ORD_STATUS, "1"),
        ] {
            if Some(tag) != skip {
                msg.set_field(tag, value);
            }
        }
        Encoder::encode("FIX.4.4", &msg).freeze()
    }

    fn read_single(dir: &Path, suffix: &str) -> String {
        let entry = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| {
                let name = p.file_name().unwrap().to_string_lossy().into_owned();
                !name.starts_with("communal") && name.ends_with(suffix)
            })
            .unwrap();
        fs::read_to_string(entry).unwrap()
    }

    #[test]
    fn test_execution_report_logged_and_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, mut rx) = pipeline(dir.path());
        let raw = execution_report("E1", None);

        let (classification, message) = pipeline.process_inbound(&raw).unwrap();
        assert_eq!(classification, Classification::ExecutionReport);
        assert_eq!(message.get_field_str(tags::EXEC_ID), Some("E1"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        let SessionEvent::Message { message, .. } = &events[0] else {
            panic!("expected a message event");
        };
        assert_eq!(message.direction(), Direction::Inbound);
        assert_eq!(message.classification(), Classification::ExecutionReport);
        assert_eq!(message.raw(), &raw);
        let SessionEvent::Execution { record, .. } = &events[1] else {
            panic!("expected an execution event");
        };
        assert_eq!(record.symbol, "ETH/USD");

        let messages = read_single(dir.path(), ".messages.log");
        assert_eq!(messages.as_bytes(), [&raw[..], b"\n".as_slice()].concat());
        let executions = read_single(dir.path(), ".executions.log");
        assert!(executions.starts_with("Execution Report: ExecID=E1, Symbol=ETH/USD"));
    }

    #[test]
    fn test_incomplete_report_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, mut rx) = pipeline(dir.path());
        let raw = execution_report("E1", Some(tags::LAST_PX));

        assert!(pipeline.process_inbound(&raw).is_ok());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SessionEvent::Message { .. }));
        assert!(matches!(
            events[1],
            SessionEvent::MalformedMessage {
                error: DecodeError::MissingRequiredField { tag: tags::LAST_PX },
                ..
            }
        ));

        let messages = read_single(dir.path(), ".messages.log");
        assert!(messages.contains("17=E1"));
        assert!(
            fs::read_to_string(dir.path().join("communal.executions.log"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_undecodable_message_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, mut rx) = pipeline(dir.path());

        let raw = Bytes::from_static(b"8=FIX.4.4\x01garbage\x01");
        assert!(pipeline.process_inbound(&raw).is_err());
        let events = drain(&mut rx);
        assert!(matches!(events[0], SessionEvent::Message { .. }));
        assert!(matches!(events[1], SessionEvent::MalformedMessage { .. }));
        let communal = fs::read_to_string(dir.path().join("communal.messages.log")).unwrap();
        assert_eq!(communal, "8=FIX.4.4\x01garbage\x01\n");
    }

    #[test]
    fn test_outbound_classified_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, mut rx) = pipeline(dir.path());
        let raw = Encoder::encode("FIX.4.4", &OutboundMessage::new(MsgType::Logout)).freeze();
        assert_eq!(pipeline.record_outbound(&raw), Classification::Logout);

        let SessionEvent::Message { message, .. } = rx.try_recv().unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.direction(), Direction::Outbound);
        assert_eq!(message.classification(), Classification::Logout);
    }

    #[test]
    fn test_log_write_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the session directory should be.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, b"").unwrap();
        let (mut pipeline, mut rx) = pipeline_in(dir.path(), &blocked);

        let first = execution_report("E1", None);
        let second = execution_report("E2", None);
        assert!(pipeline.process_inbound(&first).is_ok());
        assert!(pipeline.process_inbound(&second).is_ok());

        let events = drain(&mut rx);
        let failures = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::LogWriteFailed { error, .. } if error.path.starts_with(&blocked)))
            .count();
        // raw message and execution line, for each report
        assert_eq!(failures, 4);
        let executed: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Execution { record, .. } => Some(record.exec_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(executed, ["E1", "E2"]);

        let communal = fs::read_to_string(dir.path().join("communal.messages.log")).unwrap();
        assert_eq!(communal.lines().count(), 2);
        let executions = fs::read_to_string(dir.path().join("communal.executions.log")).unwrap();
        assert_eq!(executions.lines().count(), 2);
    }
}
