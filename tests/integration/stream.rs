//! Stream (TCP) end-to-end: handshake, routing semantics, whole binary
//! payloads, voice, kick.

use bytes::Bytes;

use parley_client::{ClientError, ClientEvent, StreamClient};
use parley_core::{BinaryKind, Destination, Frame, VoiceFormat};
use parley_relay::StreamRelay;

use crate::{next_event, wait_for, wait_for_roster};

async fn start_relay() -> (StreamRelay, u16) {
    let relay = StreamRelay::new();
    let port = relay.start(0).await.unwrap();
    (relay, port)
}

#[tokio::test]
async fn join_yields_roster_and_duplicate_name_is_rejected() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;

    match StreamClient::connect(("127.0.0.1", port), "alice").await {
        Err(ClientError::HandshakeRejected(body)) => assert_eq!(body, "Name already in use"),
        Err(other) => panic!("expected HandshakeRejected, got {other:?}"),
        Ok(_) => panic!("duplicate name was accepted"),
    }

    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}

#[tokio::test]
async fn unicast_text_reaches_target_and_echoes_to_sender() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (_bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    alice
        .send_text(Destination::Name("bob".into()), "hi bob")
        .await
        .unwrap();

    let delivered = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Text { .. })).await;
    assert_eq!(
        delivered,
        ClientEvent::Text {
            from: "alice".into(),
            to: Destination::Name("bob".into()),
            body: "hi bob".into(),
        }
    );

    // The sender observes its own unicast.
    let echoed = wait_for(&mut alice_rx, |e| matches!(e, ClientEvent::Text { .. })).await;
    assert_eq!(delivered, echoed);
    relay.stop();
}

#[tokio::test]
async fn broadcast_is_not_echoed_to_the_sender() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    alice
        .send_text(Destination::All, "hello everyone")
        .await
        .unwrap();
    let broadcast = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Text { .. })).await;
    assert!(matches!(
        broadcast,
        ClientEvent::Text { ref body, .. } if body == "hello everyone"
    ));

    // A marker unicast back to alice must be her next text event — the
    // broadcast never came back to her.
    bob.send_text(Destination::Name("alice".into()), "marker")
        .await
        .unwrap();
    let next = wait_for(&mut alice_rx, |e| matches!(e, ClientEvent::Text { .. })).await;
    assert!(matches!(
        next,
        ClientEvent::Text { ref body, .. } if body == "marker"
    ));
    relay.stop();
}

#[tokio::test]
async fn unicast_to_absent_name_yields_exactly_one_server_notice() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;

    alice
        .send_text(Destination::Name("ghost".into()), "anyone there?")
        .await
        .unwrap();

    let notice = next_event(&mut alice_rx).await;
    assert_eq!(
        notice,
        ClientEvent::Notice {
            from: "SERVER".into(),
            body: "User 'ghost' not online.".into(),
        }
    );
    relay.stop();
}

#[tokio::test]
async fn whole_binary_payload_is_delivered_intact() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (_bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    alice
        .send_binary(
            BinaryKind::Image,
            Destination::Name("bob".into()),
            "cat.png",
            Bytes::from(payload.clone()),
        )
        .await
        .unwrap();

    let received = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Binary { .. })).await;
    match received {
        ClientEvent::Binary {
            kind,
            from,
            filename,
            bytes,
            ..
        } => {
            assert_eq!(kind, BinaryKind::Image);
            assert_eq!(from, "alice");
            assert_eq!(filename, "cat.png");
            assert_eq!(bytes.as_ref(), payload.as_slice());
        }
        other => panic!("expected Binary, got {other:?}"),
    }
    relay.stop();
}

#[tokio::test]
async fn voice_message_accumulates_into_full_clip() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (_bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    // 3000 bytes of PCM, spanning several 1024-byte chunks.
    let pcm: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
    let format = VoiceFormat::default();
    alice
        .send_voice(Destination::Name("bob".into()), format, &pcm)
        .await
        .unwrap();

    let start = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::VoiceStart { .. })).await;
    assert!(matches!(
        start,
        ClientEvent::VoiceStart { ref from, format: f, .. } if from == "alice" && f == format
    ));

    let end = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::VoiceEnd { .. })).await;
    match end {
        ClientEvent::VoiceEnd { pcm: clip, .. } => assert_eq!(clip.as_ref(), pcm.as_slice()),
        other => panic!("expected VoiceEnd, got {other:?}"),
    }
    relay.stop();
}

#[tokio::test]
async fn kick_removes_participant_and_notifies_them_once() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (_bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    assert!(relay.kick("bob", "being a nuisance").await);
    assert!(!relay.kick("bob", "again").await);

    let kicked = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Kicked { .. })).await;
    assert_eq!(
        kicked,
        ClientEvent::Kicked {
            reason: "being a nuisance".into()
        }
    );

    wait_for_roster(&mut alice_rx, &["alice"]).await;
    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}

#[tokio::test]
async fn kicked_session_cannot_send_even_if_it_ignores_the_notice() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;

    // A wire-level "bob" that will not honor the kick.
    let mut bob = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    parley_core::stream::write_frame(&mut bob, &Frame::Hello { name: "bob".into() })
        .await
        .unwrap();
    let first = parley_core::stream::read_frame(&mut bob).await.unwrap().unwrap();
    assert!(matches!(first, Frame::Roster { .. }));
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;

    assert!(relay.kick("bob", "enough").await);
    let kick = parley_core::stream::read_frame(&mut bob).await.unwrap().unwrap();
    assert!(matches!(kick, Frame::Kick { .. }));

    // Bob ignores the notice and keeps broadcasting.
    let _ = parley_core::stream::write_frame(
        &mut bob,
        &Frame::Text {
            from: "bob".into(),
            to: Destination::All,
            body: "still here".into(),
        },
    )
    .await;

    wait_for_roster(&mut alice_rx, &["alice"]).await;

    // A marker proves the rogue broadcast never reached alice.
    alice
        .send_text(Destination::Name("alice".into()), "marker")
        .await
        .unwrap();
    let next = wait_for(&mut alice_rx, |e| matches!(e, ClientEvent::Text { .. })).await;
    assert!(matches!(
        next,
        ClientEvent::Text { ref body, .. } if body == "marker"
    ));

    // And the relay has hung up on bob.
    loop {
        match parley_core::stream::read_frame(&mut bob).await {
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    relay.stop();
}

#[tokio::test]
async fn disconnect_updates_the_roster_for_everyone_else() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = StreamClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let (bob, mut bob_rx) = StreamClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    bob.disconnect().await;
    wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Disconnected)).await;
    assert!(bob
        .send_text(Destination::All, "too late")
        .await
        .is_err());

    wait_for_roster(&mut alice_rx, &["alice"]).await;
    relay.stop();
}

#[tokio::test]
async fn raw_hello_gets_roster_as_first_frame() {
    // Wire-level check of the handshake contract without the client layer.
    let (relay, port) = start_relay().await;

    let mut socket = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    parley_core::stream::write_frame(
        &mut socket,
        &Frame::Hello {
            name: "wire".into(),
        },
    )
    .await
    .unwrap();

    let first = parley_core::stream::read_frame(&mut socket)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first,
        Frame::Roster {
            names: vec!["wire".into()]
        }
    );
    relay.stop();
}
