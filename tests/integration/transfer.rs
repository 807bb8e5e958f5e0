use crate::*;

/// One owner, two receivers: both get bit-identical bytes and both owner
/// links reach Complete.
#[tokio::test]
async fn test_one_sender_two_receivers() {
    let hub = new_hub();
    let data = random_bytes(300_000);
    let source = FileSource::new("report.pdf", "application/pdf", data.clone());
    let settings = settings(131_072, 2);
    let transport = transport_for(&settings);

    let mut owner = Owner::start(&hub, source.clone(), settings.clone(), transport.clone(), true);
    let mut a = Receiver::start(&hub, owner.share_id, settings.clone(), transport.clone()).await;
    let mut b = Receiver::start(&hub, owner.share_id, settings, transport).await;

    assert!(a.join.success);
    assert_eq!(a.join.file_metadata.as_ref().map(|m| m.size), Some(300_000));

    let file_a = a.delivered().await;
    let file_b = b.delivered().await;
    assert_eq!(file_a.data.as_ref(), data.as_slice());
    assert_eq!(file_b.data.as_ref(), data.as_slice());
    assert_eq!(file_a.digest(), source.digest());
    assert_eq!(file_a.name, "report.pdf");
    assert_eq!(file_b.mime_type, "application/pdf");

    owner.wait_state(a.id, LinkState::Complete).await;
    owner.wait_state(b.id, LinkState::Complete).await;
    assert_eq!(owner.session.progress(&a.id), Some(100));
    assert_eq!(owner.session.overall_progress(), Some(100));
    assert_eq!(a.session.state().await, LinkState::Complete);
}

/// Receivers that join before the owner publishes learn the metadata from
/// the fan-out and then download.
#[tokio::test]
async fn test_join_before_publish() {
    let hub = new_hub();
    let data = random_bytes(10_000);
    let source = FileSource::new("notes.txt", "text/plain", data.clone());
    let settings = settings(1024, 0);
    let transport = transport_for(&settings);

    let owner = Owner::start(&hub, source, settings.clone(), transport.clone(), false);
    let mut receiver = Receiver::start(&hub, owner.share_id, settings, transport).await;
    assert!(receiver.join.success);
    assert!(receiver.join.file_metadata.is_none());
    assert_eq!(receiver.session.state().await, LinkState::Joined);

    assert_eq!(owner.publish(), Reply::Accepted);
    wait_for(&mut receiver.events, |e| matches!(e, ReceiveEvent::MetadataReceived(_))).await;

    let file = receiver.delivered().await;
    assert_eq!(file.data.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_empty_file() {
    let hub = new_hub();
    let source = FileSource::new("empty.bin", "application/octet-stream", Vec::new());
    let settings = settings(1024, 4);
    let transport = transport_for(&settings);

    let mut owner = Owner::start(&hub, source, settings.clone(), transport.clone(), true);
    let mut receiver = Receiver::start(&hub, owner.share_id, settings, transport).await;

    let file = receiver.delivered().await;
    assert!(file.data.is_empty());
    owner.wait_state(receiver.id, LinkState::Complete).await;
}

/// A transport that cannot connect errors the link on both sides.
#[tokio::test]
async fn test_transport_failure() {
    let hub = new_hub();
    let source = FileSource::new("a.bin", "", random_bytes(5000));
    let settings = settings(1024, 0);
    let transport = transport_for(&settings);
    transport.fail_links(true);

    let mut owner = Owner::start(&hub, source, settings.clone(), transport.clone(), true);
    let mut receiver = Receiver::start(&hub, owner.share_id, settings, transport).await;

    let failed = wait_for(&mut receiver.events, |e| matches!(e, ReceiveEvent::Failed(_))).await;
    assert!(matches!(
        failed,
        ReceiveEvent::Failed(ferry_services::TransferError::Transport(_))
    ));
    assert_eq!(receiver.session.state().await, LinkState::Errored);

    owner.wait_state(receiver.id, LinkState::Errored).await;
    wait_for(&mut owner.events, |e| matches!(e, TransferEvent::Failed { .. })).await;

    // The share itself survives a failed link.
    assert!(hub.registry().lookup(&owner.share_id).is_ok());
}

/// Owner leaving ends the share for every receiver.
#[tokio::test]
async fn test_owner_disconnect_mid_transfer() {
    let hub = new_hub();
    let source = FileSource::new("big.bin", "", random_bytes(4_000_000));
    // A one-chunk window keeps the transfer in flight.
    let settings = settings(1024, 1);
    let transport = transport_for(&settings);

    let owner = Owner::start(&hub, source, settings.clone(), transport.clone(), true);
    let share_id = owner.share_id;
    let mut receiver = Receiver::start(&hub, share_id, settings, transport).await;

    wait_for(&mut receiver.events, |e| matches!(e, ReceiveEvent::Progress { .. })).await;

    let report = owner.disconnect();
    assert_eq!(report.removal.ended, vec![(share_id, vec![receiver.id])]);

    let gone = wait_for(&mut receiver.events, |e| {
        matches!(e, ReceiveEvent::CounterpartGone { .. })
    })
    .await;
    assert_eq!(
        gone,
        ReceiveEvent::CounterpartGone {
            message: "File sender disconnected".into()
        }
    );
    assert!(receiver.session.state().await.is_terminal());
    assert!(hub.registry().lookup(&share_id).is_err());
}

/// Receiver leaving closes only its own link.
#[tokio::test]
async fn test_receiver_disconnect() {
    let hub = new_hub();
    let data = random_bytes(4096);
    let source = FileSource::new("a.bin", "", data.clone());
    let settings = settings(512, 0);
    let transport = transport_for(&settings);

    let mut owner = Owner::start(&hub, source, settings.clone(), transport.clone(), true);
    let leaver = Receiver::start(&hub, owner.share_id, settings.clone(), transport.clone()).await;
    let mut stayer = Receiver::start(&hub, owner.share_id, settings, transport).await;
    let leaver_id = leaver.id;

    let report = leaver.disconnect();
    assert_eq!(report.removal.left, vec![(owner.share_id, 1)]);

    wait_for(&mut owner.events, |e| {
        *e == TransferEvent::CounterpartGone { peer: leaver_id }
    })
    .await;
    // The leaver may have finished first; either way its link is over.
    assert!(owner
        .session
        .link_state(&leaver_id)
        .is_some_and(|s| s.is_terminal()));

    let file = stayer.delivered().await;
    assert_eq!(file.data.as_ref(), data.as_slice());
    assert_eq!(
        hub.registry().lookup(&owner.share_id).unwrap().receivers,
        vec![stayer.id]
    );
}
