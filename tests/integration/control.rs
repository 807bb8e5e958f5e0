use crate::*;

use ferry_core::{ErrorKind, FileMetadata};
use serde_json::json;

fn metadata(size: u64) -> FileMetadata {
    FileMetadata {
        name: "photo.jpg".into(),
        size,
        mime_type: "image/jpeg".into(),
    }
}

#[tokio::test]
async fn test_owner_sees_joins_in_order() {
    let hub = new_hub();
    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();

    let mut receivers: Vec<Client> = (0..3).map(|_| Client::connect(&hub)).collect();
    for r in receivers.iter_mut() {
        assert!(r.join(share_id).success);
    }

    let pushes = owner.drain();
    let joined: Vec<(ConnectionId, usize)> = pushes
        .iter()
        .map(|p| match p {
            ServerMessage::ReceiverJoined {
                receiver_id,
                total_receivers,
                ..
            } => (*receiver_id, *total_receivers),
            other => panic!("unexpected push {other:?}"),
        })
        .collect();
    let expected: Vec<(ConnectionId, usize)> = receivers
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i + 1))
        .collect();
    assert_eq!(joined, expected);

    // A repeat join keeps one entry; the owner just hears the same count.
    assert!(receivers[0].join(share_id).success);
    assert_eq!(
        owner.drain(),
        vec![ServerMessage::ReceiverJoined {
            share_id,
            receiver_id: receivers[0].id,
            total_receivers: 3
        }]
    );
    assert_eq!(hub.registry().lookup(&share_id).unwrap().receivers.len(), 3);
}

#[tokio::test]
async fn test_metadata_fans_out_and_is_returned_on_join() {
    let hub = new_hub();
    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();
    let mut early = Client::connect(&hub);
    assert!(early.join(share_id).file_metadata.is_none());

    let published = owner.request(ClientRequest::PublishMetadata {
        share_id,
        metadata: metadata(2048),
    });
    assert_eq!(published, Reply::Accepted);
    assert_eq!(
        early.drain(),
        vec![ServerMessage::FileMetadata {
            share_id,
            metadata: metadata(2048)
        }]
    );

    let mut late = Client::connect(&hub);
    assert_eq!(late.join(share_id).file_metadata, Some(metadata(2048)));
    assert!(late.drain().is_empty());
}

#[tokio::test]
async fn test_join_unknown_share() {
    let hub = new_hub();
    let mut receiver = Client::connect(&hub);
    let result = receiver.join(ShareId::generate());
    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("Share not found or expired"));
    assert_eq!(result.error, Some(ErrorKind::NotFound));
    assert!(hub.registry().is_empty());

    // Ids from other clients may not even be hex; the answer is the same.
    let text = r#"{"id":7,"request":{"type":"join_share","share_id":"123"}}"#;
    match hub.handle_text(receiver.id, text) {
        ServerMessage::Reply {
            id: 7,
            reply: Reply::Joined(result),
        } => assert_eq!(result.error, Some(ErrorKind::NotFound)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_only_owner_publishes_and_only_members_request() {
    let hub = new_hub();
    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();
    let mut member = Client::connect(&hub);
    member.join(share_id);
    let mut stranger = Client::connect(&hub);
    owner.drain();

    let reply = member.request(ClientRequest::PublishMetadata {
        share_id,
        metadata: metadata(1),
    });
    assert!(matches!(
        reply,
        Reply::Failed {
            error: ErrorKind::Unauthorized,
            ..
        }
    ));
    assert!(hub.registry().lookup(&share_id).unwrap().metadata.is_none());

    let reply = stranger.request(ClientRequest::RequestDownload { share_id });
    assert!(matches!(
        reply,
        Reply::Failed {
            error: ErrorKind::Unauthorized,
            ..
        }
    ));
    assert!(owner.drain().is_empty());

    assert_eq!(
        member.request(ClientRequest::RequestDownload { share_id }),
        Reply::Accepted
    );
    assert_eq!(
        owner.drain(),
        vec![ServerMessage::DownloadRequested {
            share_id,
            receiver_id: member.id
        }]
    );
}

#[tokio::test]
async fn test_signal_relay_is_opaque() {
    let hub = new_hub();
    let mut a = Client::connect(&hub);
    let mut b = Client::connect(&hub);
    let payload = json!({"kind": "offer", "sdp": "v=0\r\n", "nested": [1, {"x": null}]});

    let reply = a.request(ClientRequest::Signal {
        to: b.id,
        payload: payload.clone(),
    });
    assert_eq!(reply, Reply::Accepted);
    assert_eq!(
        b.drain(),
        vec![ServerMessage::Signal {
            from: a.id,
            payload
        }]
    );

    // Unknown target: still accepted, nothing delivered anywhere.
    let reply = a.request(ClientRequest::Signal {
        to: ConnectionId::generate(),
        payload: json!(1),
    });
    assert_eq!(reply, Reply::Accepted);
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let hub = new_hub();
    let mut client = Client::connect(&hub);

    match hub.handle_text(client.id, "{not json") {
        ServerMessage::Reply {
            id: 0,
            reply:
                Reply::Failed {
                    error: ErrorKind::InvalidRequest,
                    ..
                },
        } => {}
        other => panic!("unexpected {other:?}"),
    }

    let text = r#"{"id":9,"request":{"type":"create_share"}}"#;
    match hub.handle_text(client.id, text) {
        ServerMessage::Reply {
            id: 9,
            reply: Reply::ShareCreated { .. },
        } => {}
        other => panic!("unexpected {other:?}"),
    }
    assert!(client.drain().is_empty());
    assert_eq!(hub.registry().len(), 1);
}

#[tokio::test]
async fn test_disconnect_pushes() {
    let hub = new_hub();
    let mut owner = Client::connect(&hub);
    let share_id = owner.create_share();
    let mut a = Client::connect(&hub);
    let mut b = Client::connect(&hub);
    a.join(share_id);
    b.join(share_id);
    owner.drain();

    hub.disconnect(a.id);
    assert_eq!(
        owner.drain(),
        vec![ServerMessage::ReceiverDisconnected {
            share_id,
            receiver_id: a.id,
            total_receivers: 1
        }]
    );

    let report = hub.disconnect(owner.id);
    assert_eq!(report.removal.ended, vec![(share_id, vec![b.id])]);
    assert_eq!(
        b.drain(),
        vec![ServerMessage::ShareEnded {
            share_id,
            message: "File sender disconnected".into()
        }]
    );
    assert!(hub.registry().is_empty());

    // Second teardown of the same connection is a no-op.
    let again = hub.disconnect(owner.id);
    assert!(!again.was_registered);
    assert!(again.removal.is_empty());
}
