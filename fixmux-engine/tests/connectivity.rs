/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

mod common;

use common::{Behaviour, MockVenue, dead_port, next_event, session};
use fixmux_core::error::SessionError;
use fixmux_core::message::{MsgType, OutboundMessage};
use fixmux_core::tags;
use fixmux_engine::{EngineBuilder, SessionEvent};
use fixmux_session::{EndpointRole, SessionState};
use std::time::Duration;

#[tokio::test]
async fn test_logon_sends_authenticated_logon() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::Normal).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();

    let report = coordinator.logon_all().await;
    assert!(report.is_complete());

    let logon = venue.wait_for_type(MsgType::Logon).await;
    assert_eq!(logon.field(tags::RAW_DATA), Some("A-secret"));
    assert_eq!(logon.field(tags::RAW_DATA_LENGTH), Some("8"));
    assert_eq!(logon.field(tags::ENCRYPT_METHOD), Some("0"));
    assert_eq!(logon.field(tags::HEART_BT_INT), Some("30"));
    assert_eq!(logon.field(tags::MSG_SEQ_NUM), Some("1"));
    assert_eq!(logon.field(tags::SENDER_COMP_ID), Some("A"));

    let session = &coordinator.sessions()[0];
    assert_eq!(session.state(), SessionState::LoggedOn);
    assert_eq!(session.endpoint().map(|e| e.port), Some(venue.port()));
}

#[tokio::test]
async fn test_failover_to_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let dead = dead_port().await;
    let venue = MockVenue::start(Behaviour::Normal).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session(
                "A",
                dir.path(),
                &[
                    (dead, EndpointRole::Primary),
                    (venue.port(), EndpointRole::Secondary),
                ],
            )
            .attempts_per_endpoint(2)
            .build()
            .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();
    let mut events = coordinator.subscribe();

    let endpoint = coordinator.sessions()[0].logon().await.unwrap();
    assert_eq!(endpoint.port, venue.port());
    assert_eq!(endpoint.role, EndpointRole::Secondary);

    for expected in 1..=2 {
        let event = next_event(&mut events, |e| {
            matches!(e, SessionEvent::LogonAttemptFailed { .. })
        })
        .await;
        let SessionEvent::LogonAttemptFailed {
            endpoint, attempt, ..
        } = event
        else {
            unreachable!()
        };
        assert_eq!(endpoint.port, dead);
        assert_eq!(attempt, expected);
    }
    assert_eq!(venue.connections(), 1);
}

#[tokio::test]
async fn test_all_endpoints_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let first = dead_port().await;
    let second = dead_port().await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session(
                "A",
                dir.path(),
                &[
                    (first, EndpointRole::Primary),
                    (second, EndpointRole::Secondary),
                ],
            )
            .build()
            .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();

    let err = coordinator.sessions()[0].logon().await.unwrap_err();
    match err.as_session() {
        Some(SessionError::LogonFailed { attempted }) => {
            assert_eq!(attempted.len(), 2);
            assert!(attempted[0].contains(&first.to_string()));
            assert!(attempted[1].contains(&second.to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(coordinator.sessions()[0].state(), SessionState::Faulted);
}

#[tokio::test]
async fn test_logon_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::RejectLogon).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();

    let report = coordinator.logon_all().await;
    let err = &report.failed[coordinator.sessions()[0].session_id()];
    match err.as_session() {
        Some(SessionError::LogonFailed { attempted }) => {
            assert_eq!(attempted.len(), 1);
            assert!(attempted[0].contains("invalid credentials"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(coordinator.sessions()[0].state(), SessionState::Faulted);
}

#[tokio::test]
async fn test_logout_all_bounded_by_hung_counterparty() {
    let dir = tempfile::tempdir().unwrap();
    let a = MockVenue::start(Behaviour::Normal).await;
    let b = MockVenue::start(Behaviour::Normal).await;
    let hung = MockVenue::start(Behaviour::IgnoreLogout).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(a.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .add_session(
            session("B", dir.path(), &[(b.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .add_session(
            session("C", dir.path(), &[(hung.port(), EndpointRole::Primary)])
                .logout_timeout(Duration::from_millis(300))
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();
    assert!(coordinator.logon_all().await.is_complete());

    let report = coordinator.logout_all().await;
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    let hung_id = coordinator.sessions()[2].session_id();
    assert!(matches!(
        report.failed[hung_id].as_session(),
        Some(SessionError::LogoutTimeout { .. })
    ));
    assert!(
        coordinator
            .states()
            .iter()
            .all(|(_, state)| *state == SessionState::Disconnected)
    );
    a.wait_for_type(MsgType::Logout).await;
    hung.wait_for_type(MsgType::Logout).await;
}

#[tokio::test]
async fn test_counterparty_logout() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::Normal).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();
    let mut events = coordinator.subscribe();
    assert!(coordinator.logon_all().await.is_complete());

    venue.push(OutboundMessage::new(MsgType::Logout).with_field(tags::TEXT, "end of day"));

    next_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::LoggedOut {
                by_counterparty: true,
                ..
            }
        )
    })
    .await;
    assert_eq!(coordinator.sessions()[0].state(), SessionState::Disconnected);
    venue.wait_for_type(MsgType::Logout).await;
}

#[tokio::test]
async fn test_transport_loss_triggers_failover() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::Normal).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();
    let mut events = coordinator.subscribe();
    assert!(coordinator.logon_all().await.is_complete());
    next_event(&mut events, |e| matches!(e, SessionEvent::LoggedOn { .. })).await;

    venue.drop_connection();

    next_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged {
                to: SessionState::Faulted,
                ..
            }
        )
    })
    .await;
    next_event(&mut events, |e| matches!(e, SessionEvent::TransportLost { .. })).await;
    next_event(&mut events, |e| matches!(e, SessionEvent::LoggedOn { .. })).await;

    assert_eq!(coordinator.sessions()[0].state(), SessionState::LoggedOn);
    assert_eq!(venue.connections(), 2);
}

#[tokio::test]
async fn test_transport_loss_without_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::Normal).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .reconnect_on_loss(false)
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();
    assert!(coordinator.logon_all().await.is_complete());
    let mut state = coordinator.sessions()[0].watch_state();

    venue.drop_connection();

    tokio::time::timeout(
        common::WAIT,
        state.wait_for(|s| *s == SessionState::Faulted),
    )
    .await
    .unwrap()
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(coordinator.sessions()[0].state(), SessionState::Faulted);
    assert_eq!(venue.connections(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_inflight_logon() {
    let dir = tempfile::tempdir().unwrap();
    let venue = MockVenue::start(Behaviour::Silent).await;
    let coordinator = EngineBuilder::new()
        .add_session(
            session("A", dir.path(), &[(venue.port(), EndpointRole::Primary)])
                .logon_timeout(Duration::from_secs(30))
                .build()
                .unwrap(),
        )
        .with_log_dir(dir.path())
        .build()
        .unwrap();

    let (report, _) = tokio::join!(coordinator.logon_all(), async {
        venue.wait_for_type(MsgType::Logon).await;
        coordinator.shutdown().await
    });

    let session = &coordinator.sessions()[0];
    assert_eq!(
        report.failed[session.session_id()].as_session(),
        Some(&SessionError::Cancelled)
    );
    assert_eq!(session.state(), SessionState::Faulted);
}
