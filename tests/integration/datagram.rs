//! Datagram (UDP) end-to-end: optimistic join, chunked transfer with
//! reassembly, voice accumulation, leave, kick. Loopback does not drop
//! packets, so transfers are expected to complete.

use parley_client::{ClientEvent, DatagramClient};
use parley_core::{BinaryKind, Destination, VoiceFormat};
use parley_relay::DatagramRelay;

use crate::{wait_for, wait_for_roster};

async fn start_relay() -> (DatagramRelay, u16) {
    let relay = DatagramRelay::new();
    let port = relay.start(0).await.unwrap();
    (relay, port)
}

#[tokio::test]
async fn join_is_optimistic_and_roster_arrives_as_event() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;

    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}

#[tokio::test]
async fn duplicate_name_from_second_socket_gets_a_notice() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;

    let (_imposter, mut imposter_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    let notice = wait_for(&mut imposter_rx, |e| {
        matches!(e, ClientEvent::Notice { .. })
    })
    .await;
    assert_eq!(
        notice,
        ClientEvent::Notice {
            from: "SERVER".into(),
            body: "Name already in use".into(),
        }
    );

    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}

#[tokio::test]
async fn chunked_file_transfer_reassembles_to_the_original() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    let (_bob, mut bob_rx) = DatagramClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    // 1000 bytes → three 400-byte chunks (400, 400, 200).
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    alice
        .send_binary(
            BinaryKind::File,
            Destination::Name("bob".into()),
            "data.bin",
            &payload,
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
            assert_eq!(kind, BinaryKind::File);
            assert_eq!(from, "alice");
            assert_eq!(filename, "data.bin");
            assert_eq!(bytes.as_ref(), payload.as_slice());
        }
        other => panic!("expected Binary, got {other:?}"),
    }
    relay.stop();
}

#[tokio::test]
async fn broadcast_transfer_reaches_everyone_but_the_sender() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    let (_bob, mut bob_rx) = DatagramClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;
    let (_carol, mut carol_rx) = DatagramClient::connect(("127.0.0.1", port), "carol")
        .await
        .unwrap();
    wait_for_roster(&mut carol_rx, &["alice", "bob", "carol"]).await;

    let payload = vec![42u8; 900];
    alice
        .send_binary(BinaryKind::Generic, Destination::All, "blob", &payload)
        .await
        .unwrap();

    for rx in [&mut bob_rx, &mut carol_rx] {
        let received = wait_for(rx, |e| matches!(e, ClientEvent::Binary { .. })).await;
        assert!(matches!(
            received,
            ClientEvent::Binary { ref bytes, .. } if bytes.as_ref() == payload.as_slice()
        ));
    }

    // A marker unicast proves the broadcast never echoed back to alice.
    alice
        .send_text(Destination::Name("alice".into()), "marker")
        .await
        .unwrap();
    let next = wait_for(&mut alice_rx, |e| {
        matches!(e, ClientEvent::Text { .. } | ClientEvent::Binary { .. })
    })
    .await;
    assert!(matches!(
        next,
        ClientEvent::Text { ref body, .. } if body == "marker"
    ));
    relay.stop();
}

#[tokio::test]
async fn voice_clip_accumulates_across_chunks() {
    let (relay, port) = start_relay().await;

    let (alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    let (_bob, mut bob_rx) = DatagramClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    let pcm: Vec<u8> = (0..1500u32).map(|i| (i % 256) as u8).collect();
    let format = VoiceFormat::default();
    alice
        .send_voice(Destination::Name("bob".into()), format, &pcm)
        .await
        .unwrap();

    let start = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::VoiceStart { .. })).await;
    assert!(matches!(
        start,
        ClientEvent::VoiceStart { format: f, .. } if f == format
    ));

    let end = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::VoiceEnd { .. })).await;
    match end {
        ClientEvent::VoiceEnd {
            format: f,
            pcm: clip,
            ..
        } => {
            assert_eq!(f, format);
            assert_eq!(clip.as_ref(), pcm.as_slice());
        }
        other => panic!("expected VoiceEnd, got {other:?}"),
    }
    relay.stop();
}

#[tokio::test]
async fn leave_removes_participant_from_the_roster() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    let (bob, mut bob_rx) = DatagramClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    bob.disconnect().await;
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}

#[tokio::test]
async fn kick_notifies_the_target_and_updates_the_roster() {
    let (relay, port) = start_relay().await;

    let (_alice, mut alice_rx) = DatagramClient::connect(("127.0.0.1", port), "alice")
        .await
        .unwrap();
    wait_for_roster(&mut alice_rx, &["alice"]).await;
    let (_bob, mut bob_rx) = DatagramClient::connect(("127.0.0.1", port), "bob")
        .await
        .unwrap();
    wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

    assert!(relay.kick("bob", "flooding").await);

    let kicked = wait_for(&mut bob_rx, |e| matches!(e, ClientEvent::Kicked { .. })).await;
    assert_eq!(
        kicked,
        ClientEvent::Kicked {
            reason: "flooding".into()
        }
    );

    wait_for_roster(&mut alice_rx, &["alice"]).await;
    assert_eq!(relay.participants(), vec!["alice".to_string()]);
    relay.stop();
}
