//! BLF monitoring tests

mod common;

use common::{test_config, Harness};
use softphone_core::domain::events::CoreEvent;
use softphone_core::domain::presence::{Presence, SubscriptionStatus};
use softphone_core::domain::DomainError;
use softphone_core::infrastructure::transport::TransportCall;

#[tokio::test]
async fn test_notifications_drive_presence() {
    let mut h = Harness::new().await;
    h.softphone.subscribe("101", None).await.unwrap();
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Unknown));
    h.drain_events();

    h.transport.remote_notify("101", "early", Some("sip:555@pbx"));
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Ringing));

    h.transport.remote_notify("101", "confirmed", None);
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Busy));

    h.transport.remote_notify("101", "terminated", None);
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Available));

    let changes: Vec<Presence> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::BlfStateChanged {
                extension,
                presence,
            } if extension == "101" => Some(presence),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![Presence::Ringing, Presence::Busy, Presence::Available]
    );

    let subscription = h.softphone.presence().get("101").unwrap();
    assert_eq!(subscription.remote_target(), Some("sip:555@pbx"));
}

#[tokio::test]
async fn test_repeated_notification_publishes_once() {
    let mut h = Harness::new().await;
    h.softphone.subscribe("101", None).await.unwrap();
    h.drain_events();

    h.transport.remote_notify("101", "confirmed", None);
    h.transport.remote_notify("101", "confirmed", None);
    h.pump().await;

    let changes = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, CoreEvent::BlfStateChanged { .. }))
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn test_unknown_dialog_state() {
    let mut h = Harness::new().await;
    h.softphone.subscribe("101", None).await.unwrap();
    h.transport.remote_notify("101", "confirmed", None);
    h.transport.remote_notify("101", "proceeding", None);
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Unknown));
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let mut h = Harness::new().await;

    let first = h.softphone.subscribe("101", None).await.unwrap();
    let second = h
        .softphone
        .subscribe(" 101 ", Some("Reception".to_string()))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(h.softphone.presence().len(), 1);
    assert_eq!(
        h.softphone.presence().get("101").unwrap().display_name(),
        Some("Reception")
    );

    let sent = h
        .transport
        .calls()
        .into_iter()
        .filter(|c| matches!(c, TransportCall::Subscribe(_)))
        .count();
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn test_empty_extension_rejected() {
    let mut h = Harness::new().await;
    assert!(matches!(
        h.softphone.subscribe("  ", None).await,
        Err(DomainError::ValidationError(_))
    ));
    assert!(h.softphone.presence().is_empty());
}

#[tokio::test]
async fn test_rejected_subscription_goes_offline() {
    let mut h = Harness::new().await;
    h.transport.reject_subscriptions_for("666");

    let err = h.softphone.subscribe("666", None).await.unwrap_err();
    assert!(matches!(err, DomainError::Transport(_)));
    assert_eq!(h.softphone.presence_state("666"), Some(Presence::Offline));
    assert!(matches!(
        h.softphone.presence().get("666").unwrap().status(),
        SubscriptionStatus::Rejected(_)
    ));
    let events = h.drain_events();
    assert!(events.contains(&CoreEvent::BlfStateChanged {
        extension: "666".to_string(),
        presence: Presence::Offline,
    }));
}

#[tokio::test]
async fn test_server_terminates_subscription() {
    let mut h = Harness::new().await;
    h.softphone.subscribe("101", None).await.unwrap();
    h.transport.remote_notify("101", "confirmed", None);
    h.pump().await;

    h.transport.remote_reject_subscription("101", "noresource");
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Offline));

    // Late notifications for the dead dialog are dropped
    h.transport.remote_notify("101", "early", None);
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Offline));
}

#[tokio::test]
async fn test_explicit_resubscribe_after_rejection() {
    let mut h = Harness::new().await;
    h.softphone.subscribe("101", None).await.unwrap();
    h.transport.remote_reject_subscription("101", "timeout");
    h.pump().await;
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Offline));

    h.softphone.subscribe("101", None).await.unwrap();
    assert_eq!(h.softphone.presence_state("101"), Some(Presence::Unknown));
    assert!(h.softphone.presence().get("101").unwrap().is_accepted());
}

#[tokio::test]
async fn test_subscribe_while_unregistered_is_deferred() {
    let mut h = Harness::unstarted(test_config());
    let id = h.softphone.subscribe("101", None).await.unwrap();
    assert_eq!(
        *h.softphone.presence().get("101").unwrap().status(),
        SubscriptionStatus::Inactive
    );
    assert!(h.transport.calls().is_empty());

    h.softphone.start().await;
    h.pump().await;
    assert_eq!(h.softphone.presence().id_for("101"), Some(id));
    assert!(h.softphone.presence().get("101").unwrap().is_accepted());
    assert_eq!(h.transport.live_subscriptions(), 1);
}

#[tokio::test]
async fn test_unsubscribe_closes_dialog() {
    let mut h = Harness::new().await;
    let id = h.softphone.subscribe("101", None).await.unwrap();
    assert_eq!(h.transport.live_subscriptions(), 1);

    h.softphone.unsubscribe(id).await.unwrap();
    assert_eq!(h.transport.live_subscriptions(), 0);
    assert_eq!(h.softphone.presence_state("101"), None);
    assert!(matches!(
        h.softphone.unsubscribe(id).await,
        Err(DomainError::NotFound(_))
    ));
}
