//! Call flow integration tests over the loopback transport

mod common;

use common::{line, test_config, Harness};
use softphone_core::domain::events::CoreEvent;
use softphone_core::domain::line::LineState;
use softphone_core::domain::session::{Direction, EndReason, SessionState};
use softphone_core::domain::shared::value_objects::DtmfTone;
use softphone_core::domain::transport::{CallFailure, RejectReason, TransportError};
use softphone_core::infrastructure::transport::TransportCall;
use softphone_core::DomainError;

#[tokio::test]
async fn test_outbound_call_lifecycle() {
    let mut h = Harness::new().await;
    h.drain_events();

    let id = h.softphone.dial("200").await.unwrap();
    let session = h.session(id);
    assert_eq!(session.line(), Some(line(1)));
    assert_eq!(session.state(), SessionState::Dialing);
    assert_eq!(h.softphone.switchboard().line(line(1)).state(), LineState::Dialing);

    let handle = h.handle(id);
    h.transport.remote_progress(&handle);
    h.pump().await;
    // Remote alerting still shows as dialing on the key
    assert_eq!(h.session(id).state(), SessionState::Ringing);
    assert_eq!(h.softphone.switchboard().line(line(1)).state(), LineState::Dialing);

    h.transport.remote_answer(&handle);
    h.pump().await;
    assert_eq!(h.session(id).state(), SessionState::Active);
    assert_eq!(h.softphone.switchboard().line(line(1)).state(), LineState::Active);

    h.softphone.hang_up(None).await.unwrap();
    let ended = h.session(id);
    assert_eq!(ended.state(), SessionState::Terminated);
    assert_eq!(ended.end_reason(), Some(&EndReason::LocalHangup));
    assert!(h.softphone.switchboard().line(line(1)).is_idle());
    assert_eq!(h.softphone.switchboard().session_count(), 0);
    assert!(h.transport.calls().contains(&TransportCall::Terminate(handle)));

    let events = h.drain_events();
    assert!(matches!(events.first(), Some(CoreEvent::SessionCreated { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::SessionTerminated { session_id, .. } if *session_id == id)));
}

#[tokio::test]
async fn test_answer_without_provisional_response() {
    let mut h = Harness::new().await;
    let id = h.softphone.dial("200").await.unwrap();
    h.transport.remote_answer(&h.handle(id));
    h.pump().await;
    assert_eq!(h.session(id).state(), SessionState::Active);
}

#[tokio::test]
async fn test_inbound_rings_unassigned_and_keeps_focus() {
    let mut h = Harness::new().await;
    let first = h.connected_call("200").await;
    assert_eq!(h.softphone.switchboard().selected_line(), line(1));

    let inbound = h.ringing_call("555").await;
    let session = h.session(inbound);
    assert_eq!(session.direction(), Direction::Incoming);
    assert_eq!(session.state(), SessionState::Ringing);
    assert_eq!(session.line(), None);
    assert_eq!(h.softphone.switchboard().line(line(2)).state(), LineState::Ringing);
    assert_eq!(h.softphone.switchboard().selected_line(), line(1));
    assert_eq!(
        h.softphone.switchboard().selected_session().map(|s| s.id()),
        Some(first)
    );

    h.softphone.answer(Some(inbound)).await.unwrap();
    let session = h.session(inbound);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.line(), Some(line(2)));
    assert_eq!(h.softphone.switchboard().line(line(2)).state(), LineState::Active);
}

#[tokio::test]
async fn test_inbound_takes_idle_selected_line() {
    let mut h = Harness::new().await;
    h.softphone.select_line(line(3));

    let inbound = h.ringing_call("555").await;
    assert_eq!(h.softphone.switchboard().line_of(&inbound), Some(line(3)));

    h.softphone.answer(None).await.unwrap();
    assert_eq!(h.session(inbound).line(), Some(line(3)));
}

#[tokio::test]
async fn test_fourth_call_is_rejected_busy() {
    let mut h = Harness::new().await;
    for target in ["201", "202", "203"] {
        h.connected_call(target).await;
    }
    assert_eq!(h.softphone.switchboard().free_lines(), 0);
    h.drain_events();

    let handle = h.transport.remote_offer("555", Some("Caller"));
    h.pump().await;

    assert_eq!(h.softphone.switchboard().session_count(), 3);
    assert!(h
        .transport
        .calls()
        .contains(&TransportCall::Reject(handle, RejectReason::Busy)));
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        CoreEvent::InboundRejected {
            reason: RejectReason::Busy,
            ..
        }
    )));
}

#[tokio::test]
async fn test_outbound_with_all_lines_busy() {
    let mut h = Harness::new().await;
    for target in ["201", "202", "203"] {
        h.connected_call(target).await;
    }
    let result = h.softphone.dial("204").await;
    assert_eq!(result, Err(DomainError::AllLinesBusy));
    assert_eq!(h.softphone.switchboard().session_count(), 3);
}

#[tokio::test]
async fn test_line_is_stable_across_hold() {
    let mut h = Harness::new().await;
    h.connected_call("201").await;
    let id = h.connected_call("202").await;
    assert_eq!(h.session(id).line(), Some(line(2)));

    assert!(h.softphone.toggle_hold(Some(id)).await.unwrap());
    assert_eq!(h.session(id).state(), SessionState::Hold);
    assert_eq!(h.softphone.switchboard().line(line(2)).state(), LineState::Hold);

    assert!(!h.softphone.toggle_hold(Some(id)).await.unwrap());
    let session = h.session(id);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.line(), Some(line(2)));
    assert!(session.answered_at().is_some());
}

#[tokio::test]
async fn test_refused_hold_keeps_call_active() {
    let mut h = Harness::new().await;
    let id = h.connected_call("200").await;
    h.transport.reject_hold(true);

    let result = h.softphone.set_hold(Some(id), true).await;
    assert!(matches!(
        result,
        Err(DomainError::Transport(TransportError::Rejected { code: 488, .. }))
    ));
    let session = h.session(id);
    assert_eq!(session.state(), SessionState::Active);
    assert!(!session.is_on_hold());
}

#[tokio::test]
async fn test_refused_mute_keeps_flag() {
    let mut h = Harness::new().await;
    let id = h.connected_call("200").await;

    assert!(h.softphone.toggle_mute(None).await.unwrap());
    assert!(h.session(id).is_muted());
    assert!(!h.softphone.toggle_mute(None).await.unwrap());

    h.transport.reject_mute(true);
    assert!(h.softphone.toggle_mute(None).await.is_err());
    assert!(!h.session(id).is_muted());
}

#[tokio::test]
async fn test_remote_failure_frees_line_and_absorbs_late_events() {
    let mut h = Harness::new().await;
    let id = h.softphone.dial("200").await.unwrap();
    let handle = h.handle(id);

    h.transport.remote_fail(&handle, CallFailure::Busy);
    h.pump().await;
    let session = h.session(id);
    assert_eq!(session.state(), SessionState::Failed);
    assert!(h.softphone.switchboard().line(line(1)).is_idle());

    // A late answer must not resurrect the call
    h.transport.remote_answer(&handle);
    h.pump().await;
    assert_eq!(h.session(id).state(), SessionState::Failed);
    assert_eq!(h.softphone.switchboard().session_count(), 0);
}

#[tokio::test]
async fn test_outbound_rejected_by_transport() {
    let mut h = Harness::new().await;
    h.transport.reject_outbound(Some(404));

    let result = h.softphone.dial("999").await;
    assert!(result.is_err());
    let failed = h.softphone.switchboard().history().last().cloned().unwrap();
    assert_eq!(failed.state(), SessionState::Failed);
    assert_eq!(
        failed.end_reason(),
        Some(&EndReason::Failed(CallFailure::Rejected(404)))
    );
    assert!(h.softphone.switchboard().line(line(1)).is_idle());
}

#[tokio::test]
async fn test_ice_timeout_abandons_when_configured() {
    let mut config = test_config();
    config.timers.proceed_on_ice_timeout = false;
    let mut h = Harness::with_config(config).await;
    h.transport.stall_media(true);

    let result = h.softphone.dial("200").await;
    assert_eq!(result, Err(DomainError::Transport(TransportError::Timeout)));

    let failed = h.softphone.switchboard().history().last().cloned().unwrap();
    assert_eq!(failed.state(), SessionState::Failed);
    let handle = failed.handle().cloned().unwrap();
    assert!(h.transport.calls().contains(&TransportCall::Terminate(handle)));
    assert!(h.softphone.switchboard().line(line(1)).is_idle());
}

#[tokio::test]
async fn test_ice_timeout_proceeds_by_default() {
    let mut h = Harness::new().await;
    h.transport.stall_media(true);

    let id = h.softphone.dial("200").await.unwrap();
    assert_eq!(h.session(id).state(), SessionState::Dialing);
}

#[tokio::test]
async fn test_reject_and_hang_up_ringing_inbound() {
    let mut h = Harness::new().await;
    let first = h.ringing_call("555").await;
    h.softphone.reject(Some(first)).await.unwrap();
    assert_eq!(h.session(first).end_reason(), Some(&EndReason::Declined));

    let second = h.ringing_call("556").await;
    let handle = h.handle(second);
    h.softphone.hang_up(Some(second)).await.unwrap();
    assert_eq!(h.session(second).end_reason(), Some(&EndReason::Declined));
    assert!(h
        .transport
        .calls()
        .contains(&TransportCall::Reject(handle, RejectReason::Declined)));
    assert_eq!(h.softphone.switchboard().free_lines(), 3);
}

#[tokio::test]
async fn test_remote_hangup_while_ringing() {
    let mut h = Harness::new().await;
    let id = h.ringing_call("555").await;
    h.transport.remote_hangup(&h.handle(id));
    h.pump().await;

    assert_eq!(h.session(id).end_reason(), Some(&EndReason::RemoteHangup));
    assert_eq!(h.softphone.switchboard().free_lines(), 3);
}

#[tokio::test]
async fn test_dtmf_both_ways() {
    let mut h = Harness::new().await;
    let id = h.connected_call("200").await;
    let handle = h.handle(id);

    assert!(matches!(
        h.softphone.send_dtmf(None, 'x').await,
        Err(DomainError::ValidationError(_))
    ));
    h.softphone.send_dtmf(None, '#').await.unwrap();
    assert!(h
        .transport
        .calls()
        .contains(&TransportCall::Dtmf(handle.clone(), DtmfTone::new('#').unwrap())));

    h.drain_events();
    h.transport.remote_dtmf(&handle, DtmfTone::new('7').unwrap());
    h.pump().await;
    assert_eq!(
        h.drain_events(),
        vec![CoreEvent::DtmfReceived {
            session_id: id,
            tone: DtmfTone::new('7').unwrap()
        }]
    );
}

#[tokio::test]
async fn test_actions_need_a_session_on_the_selected_line() {
    let mut h = Harness::new().await;
    assert!(matches!(
        h.softphone.hang_up(None).await,
        Err(DomainError::NotFound(_))
    ));
    assert!(matches!(
        h.softphone.answer(None).await,
        Err(DomainError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reassign_moves_call_and_focus() {
    let mut h = Harness::new().await;
    let id = h.connected_call("200").await;

    h.softphone.reassign_line(id, line(3)).unwrap();
    assert_eq!(h.session(id).line(), Some(line(3)));
    assert!(h.softphone.switchboard().line(line(1)).is_idle());
    assert_eq!(h.softphone.switchboard().selected_line(), line(3));

    let other = h.connected_call("201").await;
    assert!(matches!(
        h.softphone.reassign_line(other, line(3)),
        Err(DomainError::LineOccupied { .. })
    ));
}
