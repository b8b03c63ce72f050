//! Live room integration tests over real WebSocket connections.
//!
//! Covers the join frame sequence, chat fan-out and persistence, signaling
//! relay, admission enforcement, disconnect handling and meeting end.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use meet_service::models::MeetingInfoResponse;
use meet_test_utils::{TestMeetServer, TestMeeting, ALICE, BOB, HOST};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct LiveClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveClient {
    async fn connect(server: &TestMeetServer, identity: &str) -> Self {
        let (ws, _) = connect_async(server.live_url(identity))
            .await
            .expect("WebSocket connect failed");
        Self { ws }
    }

    async fn send(&mut self, event: Value) {
        self.ws
            .send(Message::Text(event.to_string()))
            .await
            .expect("send failed");
    }

    /// Next JSON event, or None once the server closes the socket.
    async fn next_event(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(EVENT_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for an event");
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(&text).expect("event is JSON"))
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Skip events until one of type `kind` arrives.
    async fn expect(&mut self, kind: &str) -> Value {
        loop {
            match self.next_event().await {
                Some(event) if event["type"] == kind => return event,
                Some(_) => {}
                None => panic!("connection closed while waiting for {kind}"),
            }
        }
    }

    /// Join `room_id` and consume the three join frames.
    async fn join(&mut self, room_id: &str) -> (Value, Value, Value) {
        self.send(json!({"type": "join-room", "roomId": room_id}))
            .await;
        let joined = self.next_event().await.expect("room-joined");
        let members = self.next_event().await.expect("room-members");
        let history = self.next_event().await.expect("chat-history");
        (joined, members, history)
    }
}

/// Create a meeting and admit `identities` through the HTTP API.
async fn admitted_meeting(server: &TestMeetServer, identities: &[&str]) -> (String, String) {
    let created = server.create_meeting(TestMeeting::new(HOST)).await.unwrap();
    for identity in identities {
        let response = server
            .join(created.meeting_id.as_str(), identity, None)
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    (
        created.meeting_id.as_str().to_string(),
        created.room_id.as_str().to_string(),
    )
}

async fn current_participants(server: &TestMeetServer, meeting_id: &str) -> u32 {
    let info: MeetingInfoResponse = server
        .get(&format!("/api/v1/meetings/{meeting_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    info.current_participants
}

#[tokio::test]
async fn test_join_sends_snapshot_members_then_history() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    let (joined, members, history) = host.join(&room_id).await;
    assert_eq!(joined["type"], "room-joined");
    assert_eq!(joined["roomId"], room_id.as_str());
    assert_eq!(joined["snapshot"]["meetingId"], meeting_id.as_str());
    assert_eq!(joined["snapshot"]["status"], "active");
    assert!(joined["snapshot"].get("passwordHash").is_none());
    assert_eq!(members["type"], "room-members");
    assert_eq!(members["participants"].as_array().unwrap().len(), 1);
    assert_eq!(history["type"], "chat-history");

    let mut alice = LiveClient::connect(&server, ALICE).await;
    let (_, members, history) = alice.join(&room_id).await;
    let identities: Vec<&str> = members["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["identity"].as_str().unwrap())
        .collect();
    assert_eq!(identities, vec![HOST, ALICE]);
    // Host's join notice is replayed
    assert!(history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["kind"] == "system" && m["senderIdentity"] == HOST));

    let event = host.expect("member-joined").await;
    assert_eq!(event["participant"]["identity"], ALICE);
    assert_eq!(event["participant"]["isAudioMuted"], false);

    Ok(())
}

#[tokio::test]
async fn test_join_requires_admission() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (_, room_id) = admitted_meeting(&server, &[HOST]).await;

    let mut bob = LiveClient::connect(&server, BOB).await;
    bob.send(json!({"type": "join-room", "roomId": room_id}))
        .await;
    let event = bob.next_event().await.unwrap();
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "NOT_ADMITTED");

    // Still connected and able to report further errors
    bob.send(json!({"type": "chat", "body": "hi"})).await;
    let event = bob.next_event().await.unwrap();
    assert_eq!(event["code"], "NOT_IN_ROOM");

    Ok(())
}

#[tokio::test]
async fn test_live_endpoint_rejects_invalid_identity() -> Result<()> {
    let server = TestMeetServer::spawn().await?;

    let result = connect_async(server.live_url("short")).await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_get_error_events() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let mut client = LiveClient::connect(&server, ALICE).await;

    client.ws.send(Message::Text("{not json".into())).await?;
    let event = client.next_event().await.unwrap();
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], "BAD_REQUEST");

    client.send(json!({"type": "dance"})).await;
    let event = client.next_event().await.unwrap();
    assert_eq!(event["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_chat_fans_out_and_persists() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;

    alice
        .send(json!({"type": "chat", "body": "  hello everyone  "}))
        .await;

    // Sender receives its own message too
    for client in [&mut host, &mut alice] {
        let event = client.expect("chat").await;
        assert_eq!(event["message"]["body"], "hello everyone");
        assert_eq!(event["message"]["senderIdentity"], ALICE);
        assert_eq!(event["message"]["kind"], "text");
    }

    host.send(json!({"type": "chat", "body": "welcome"})).await;
    alice.expect("chat").await;

    // Ending the meeting flushes chat before the response
    let response = server
        .post(
            &format!("/api/v1/meetings/{meeting_id}/end"),
            &json!({"requesterIdentity": HOST}),
        )
        .await?;
    assert_eq!(response.status(), 200);

    let history: Vec<Value> = server
        .get(&format!("/api/v1/meetings/{meeting_id}/chat"))
        .await?
        .json()
        .await?;
    let texts: Vec<&str> = history
        .iter()
        .filter(|m| m["kind"] == "text")
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    // Newest first
    assert_eq!(texts, vec!["welcome", "hello everyone"]);

    let limited: Vec<Value> = server
        .get(&format!("/api/v1/meetings/{meeting_id}/chat?limit=1"))
        .await?
        .json()
        .await?;
    assert_eq!(limited.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_chat_disabled_is_rejected() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let created = server
        .create_meeting(TestMeeting::new(HOST).without_chat())
        .await?;
    server.join(created.meeting_id.as_str(), HOST, None).await?;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(created.room_id.as_str()).await;

    host.send(json!({"type": "chat", "body": "anyone?"})).await;
    let event = host.expect("error").await;
    assert_eq!(event["code"], "CHAT_DISABLED");

    Ok(())
}

#[tokio::test]
async fn test_signal_reaches_only_target() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (_, room_id) = admitted_meeting(&server, &[HOST, ALICE, BOB]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;
    let mut bob = LiveClient::connect(&server, BOB).await;
    bob.join(&room_id).await;
    host.expect("member-joined").await;
    host.expect("member-joined").await;
    alice.expect("member-joined").await;

    let payload = json!({"sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0", "nested": [1, 2, 3]});
    alice
        .send(json!({
            "type": "signal",
            "kind": "offer",
            "targetIdentity": BOB,
            "payload": payload,
        }))
        .await;

    let event = bob.expect("signal").await;
    assert_eq!(event["kind"], "offer");
    assert_eq!(event["senderIdentity"], ALICE);
    assert_eq!(event["payload"], payload);
    assert!(event["timestamp"].is_string());

    // Host saw nothing; a chat marker proves ordering
    alice.send(json!({"type": "chat", "body": "marker"})).await;
    let event = host.next_event().await.unwrap();
    assert_eq!(event["type"], "chat");
    assert_eq!(event["message"]["body"], "marker");

    Ok(())
}

#[tokio::test]
async fn test_presence_changes_reach_others() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (_, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;
    host.expect("member-joined").await;

    alice
        .send(json!({"type": "set-presence", "flag": "handRaised", "value": true}))
        .await;
    let event = host.expect("presence-changed").await;
    assert_eq!(event["identity"], ALICE);
    assert_eq!(event["flag"], "handRaised");
    assert_eq!(event["value"], true);

    Ok(())
}

#[tokio::test]
async fn test_disconnect_leaves_room_and_roster() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;
    host.expect("member-joined").await;

    alice.ws.close(None).await?;
    drop(alice);

    let event = host.expect("member-left").await;
    assert_eq!(event["identity"], ALICE);

    // Roster write completes shortly after the broadcast
    let mut remaining = 0;
    for _ in 0..50 {
        remaining = current_participants(&server, &meeting_id).await;
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 1);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_releases_live_members_from_roster() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;
    assert_eq!(current_participants(&server, &meeting_id).await, 2);

    assert!(server.state().rooms.shutdown(EVENT_TIMEOUT).await);

    // Leaves are written before the rooms report stopped
    assert_eq!(current_participants(&server, &meeting_id).await, 0);

    // Both sockets are closed by the server
    while host.next_event().await.is_some() {}
    while alice.next_event().await.is_some() {}

    let info: MeetingInfoResponse = server
        .get(&format!("/api/v1/meetings/{meeting_id}"))
        .await?
        .json()
        .await?;
    assert!(info.is_joinable);

    Ok(())
}

#[tokio::test]
async fn test_meeting_end_notifies_and_closes_connections() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;

    let response = server
        .post(
            &format!("/api/v1/meetings/{meeting_id}/end"),
            &json!({"requesterIdentity": HOST}),
        )
        .await?;
    assert_eq!(response.status(), 200);

    for client in [&mut host, &mut alice] {
        let event = client.expect("meeting-ended").await;
        assert_eq!(event["roomId"], room_id.as_str());
        // Then the server closes the socket
        let mut closed = false;
        for _ in 0..10 {
            if client.next_event().await.is_none() {
                closed = true;
                break;
            }
        }
        assert!(closed);
    }

    assert_eq!(current_participants(&server, &meeting_id).await, 0);

    Ok(())
}

#[tokio::test]
async fn test_explicit_leave_via_http_drops_live_session() -> Result<()> {
    let server = TestMeetServer::spawn().await?;
    let (meeting_id, room_id) = admitted_meeting(&server, &[HOST, ALICE]).await;

    let mut host = LiveClient::connect(&server, HOST).await;
    host.join(&room_id).await;
    let mut alice = LiveClient::connect(&server, ALICE).await;
    alice.join(&room_id).await;
    host.expect("member-joined").await;

    let response = server
        .post(
            &format!("/api/v1/meetings/{meeting_id}/leave"),
            &json!({"identity": ALICE}),
        )
        .await?;
    assert_eq!(response.status(), 204);

    let event = host.expect("member-left").await;
    assert_eq!(event["identity"], ALICE);
    // The removed session is told it left
    let event = alice.expect("member-left").await;
    assert_eq!(event["identity"], ALICE);

    // And may no longer chat there
    alice.send(json!({"type": "chat", "body": "still here?"})).await;
    let event = alice.expect("error").await;
    assert_eq!(event["code"], "NOT_IN_ROOM");

    assert_eq!(current_participants(&server, &meeting_id).await, 1);

    Ok(())
}
