//! End-to-end tests driving a `ChatSession` against an in-process assistant.
//!
//! Each test binds a local WebSocket server that plays a scripted reply, so
//! no external service is needed.

use std::time::Duration;

use dhan_saathi_chat::session::{CONNECTION_LOST_NOTICE, SERVICE_UNAVAILABLE_NOTICE};
use dhan_saathi_chat::{
    ChatConfig, ChatSession, ConnectionState, PrivilegeTier, Profile, RevealConfig, SessionChange, TurnFailure,
};
use dhan_saathi_core::{MessageId, UserId};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Upper bound for any single scenario.
const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Test Helpers
// =============================================================================

fn config(ws_url: String) -> ChatConfig {
    ChatConfig {
        ws_url,
        welcome_message: String::new(),
        connect_timeout_seconds: 2,
        response_timeout_seconds: 5,
        reply_idle_seconds: 1,
        reveal: RevealConfig {
            tick_interval_ms: 5,
            chars_per_tick: 3,
            catch_up_threshold: 60,
            catch_up_divisor: 4,
        },
        ..ChatConfig::default()
    }
}

/// Accept one connection, report the first request, then send `frames`.
/// Closes the socket afterwards when `close` is set, otherwise stays open.
async fn serve_once(listener: &TcpListener, frames: Vec<String>, close: bool, request_tx: oneshot::Sender<Value>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let request = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break serde_json::from_str::<Value>(&text).unwrap(),
            _ => continue,
        }
    };
    let _ = request_tx.send(request);

    for frame in frames {
        ws.send(Message::Text(frame)).await.unwrap();
    }

    if close {
        ws.close(None).await.unwrap();
    } else {
        // Hold the connection open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    }
}

/// Start a server that handles one connection per entry in `scripts`.
async fn spawn_assistant(scripts: Vec<(Vec<&'static str>, bool)>) -> (String, Vec<oneshot::Receiver<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/interact", listener.local_addr().unwrap());

    let mut receivers = Vec::new();
    let mut senders = Vec::new();
    for _ in &scripts {
        let (tx, rx) = oneshot::channel();
        senders.push(tx);
        receivers.push(rx);
    }

    tokio::spawn(async move {
        for ((frames, close), tx) in scripts.into_iter().zip(senders) {
            let frames = frames.into_iter().map(String::from).collect();
            serve_once(&listener, frames, close, tx).await;
        }
    });

    (url, receivers)
}

/// Drive the session until the turn for `id` ends. Returns every revealed
/// snapshot and the terminal change.
async fn run_turn(session: &mut ChatSession, id: MessageId) -> (Vec<String>, SessionChange) {
    let mut revealed = Vec::new();
    timeout(SCENARIO_TIMEOUT, async {
        loop {
            match session.next_change().await {
                SessionChange::Revealed(changed) if changed == id => {
                    revealed.push(session.message(id).unwrap().content.clone());
                }
                change @ (SessionChange::Finalized(_) | SessionChange::TurnFailed { .. }) => {
                    return (revealed, change);
                }
                _ => {}
            }
        }
    })
    .await
    .expect("turn did not finish in time")
}

fn assert_growing_prefixes(snapshots: &[String], final_text: &str) {
    for pair in snapshots.windows(2) {
        assert!(pair[1].starts_with(&pair[0]), "{:?} is not a prefix of {:?}", pair[0], pair[1]);
    }
    for snapshot in snapshots {
        assert!(final_text.starts_with(snapshot.as_str()));
    }
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn streamed_reply_is_revealed_and_finalized() {
    let (url, mut requests) = spawn_assistant(vec![(
        vec!["Hel", "lo, ", r#"{"content":"world"}"#, "[DONE]"],
        false,
    )])
    .await;
    let mut session = ChatSession::new(config(url), Profile::default());

    let id = session.submit("Say hello").await.unwrap();
    assert!(!session.input_enabled());

    let (snapshots, end) = run_turn(&mut session, id).await;
    assert_eq!(end, SessionChange::Finalized(id));
    assert_growing_prefixes(&snapshots, "Hello, world");

    let reply = session.message(id).unwrap();
    assert_eq!(reply.content, "Hello, world");
    assert!(!reply.streaming);
    assert!(session.input_enabled());
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    let request = requests.remove(0).await.unwrap();
    assert_eq!(request["message"], "Say hello");
    assert_eq!(request["userId"], "guest");
    assert_eq!(request["mode"], "normal");
}

#[tokio::test]
async fn request_carries_identity_and_tier() {
    let (url, mut requests) = spawn_assistant(vec![(vec![r#"{"reply":"ok","status":"complete"}"#], false)]).await;
    let profile = Profile::new(Some(UserId::new("user_42").unwrap()), PrivilegeTier::Super);
    let mut session = ChatSession::new(config(url), profile);

    let id = session.submit("  Where can I invest?  ").await.unwrap();
    let (_, end) = run_turn(&mut session, id).await;
    assert_eq!(end, SessionChange::Finalized(id));
    assert_eq!(session.message(id).unwrap().content, "ok");

    let request = requests.remove(0).await.unwrap();
    assert_eq!(request["message"], "Where can I invest?");
    assert_eq!(request["userId"], "user_42");
    assert_eq!(request["mode"], "super");
}

#[tokio::test]
async fn plain_reply_without_sentinel_completes_when_quiet() {
    let reply = "Your savings rate this month is 36.2%. Consider moving the surplus into a liquid fund.";
    let (url, _requests) = spawn_assistant(vec![(vec![reply], false)]).await;
    let mut session = ChatSession::new(config(url), Profile::default());

    let id = session.submit("How am I doing?").await.unwrap();
    let (snapshots, end) = run_turn(&mut session, id).await;

    assert_eq!(end, SessionChange::Finalized(id));
    assert_growing_prefixes(&snapshots, reply);
    assert_eq!(session.message(id).unwrap().content, reply);
}

#[tokio::test]
async fn follow_up_turn_reuses_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/interact", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut turn = 0;
        while let Some(Ok(Message::Text(_))) = ws.next().await {
            turn += 1;
            ws.send(Message::Text(format!("answer {turn}"))).await.unwrap();
            ws.send(Message::Text("[DONE]".into())).await.unwrap();
        }
    });

    let mut session = ChatSession::new(config(url), Profile::default());
    for expected in ["answer 1", "answer 2"] {
        let id = session.submit("next").await.unwrap();
        let (_, end) = run_turn(&mut session, id).await;
        assert_eq!(end, SessionChange::Finalized(id));
        assert_eq!(session.message(id).unwrap().content, expected);
    }
    assert_eq!(session.messages().len(), 4);
    assert_eq!(session.messages().iter().filter(|m| m.streaming).count(), 0);
}

#[tokio::test]
async fn slow_fragment_is_kept_when_reply_idle_is_off() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/interact", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.next().await.unwrap().unwrap();
        ws.send(Message::Text("Hel".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        ws.send(Message::Text("lo".into())).await.unwrap();
        ws.send(Message::Text("[DONE]".into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut session = ChatSession::new(
        ChatConfig {
            reply_idle_seconds: 0,
            ..config(url)
        },
        Profile::default(),
    );
    let id = session.submit("Say hello").await.unwrap();
    let (snapshots, end) = run_turn(&mut session, id).await;

    assert_eq!(end, SessionChange::Finalized(id));
    assert_growing_prefixes(&snapshots, "Hello");
    assert_eq!(session.message(id).unwrap().content, "Hello");
}

#[tokio::test]
async fn late_frames_after_quiet_reply_stay_out_of_next_turn() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/interact", listener.local_addr().unwrap());
    tokio::spawn(async move {
        // First request: a fragment, then the rest after the idle window.
        let (stream, _) = listener.accept().await.unwrap();
        let mut first = tokio_tungstenite::accept_async(stream).await.unwrap();
        first.next().await.unwrap().unwrap();
        first.send(Message::Text("Hel".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = first.send(Message::Text("lo".into())).await;
        let _ = first.send(Message::Text("[DONE]".into())).await;

        let (stream, _) = listener.accept().await.unwrap();
        let mut second = tokio_tungstenite::accept_async(stream).await.unwrap();
        second.next().await.unwrap().unwrap();
        second.send(Message::Text("second".into())).await.unwrap();
        second.send(Message::Text("[DONE]".into())).await.unwrap();
        while let Some(Ok(_)) = second.next().await {}
    });

    let mut session = ChatSession::new(config(url), Profile::default());

    let first_id = session.submit("Say hello").await.unwrap();
    let (_, end) = run_turn(&mut session, first_id).await;
    assert_eq!(end, SessionChange::Finalized(first_id));
    assert_eq!(session.message(first_id).unwrap().content, "Hel");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    // Let the tail of the first reply reach the old socket.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let second_id = session.submit("And again").await.unwrap();
    let (snapshots, end) = run_turn(&mut session, second_id).await;
    assert_eq!(end, SessionChange::Finalized(second_id));
    assert_growing_prefixes(&snapshots, "second");
    assert_eq!(session.message(second_id).unwrap().content, "second");
    assert_eq!(session.message(first_id).unwrap().content, "Hel");
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn close_mid_stream_shows_connection_lost_then_retry_works() {
    let (url, _requests) = spawn_assistant(vec![
        (vec!["Partial ans"], true),
        (vec!["Full answer", "[DONE]"], false),
    ])
    .await;
    let mut session = ChatSession::new(config(url), Profile::default());

    let id = session.submit("Tell me everything").await.unwrap();
    let (_, end) = run_turn(&mut session, id).await;
    assert_eq!(
        end,
        SessionChange::TurnFailed {
            message_id: id,
            failure: TurnFailure::RemoteClosed,
        }
    );
    let failed = session.message(id).unwrap();
    assert_eq!(failed.content, CONNECTION_LOST_NOTICE);
    assert!(!failed.streaming);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.input_enabled());

    let retry_id = session.submit("Tell me everything").await.unwrap();
    let (_, end) = run_turn(&mut session, retry_id).await;
    assert_eq!(end, SessionChange::Finalized(retry_id));
    assert_eq!(session.message(retry_id).unwrap().content, "Full answer");
    assert_eq!(session.message(id).unwrap().content, CONNECTION_LOST_NOTICE);
}

#[tokio::test]
async fn refused_connection_shows_service_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/interact", listener.local_addr().unwrap());
    drop(listener);

    let mut session = ChatSession::new(config(url), Profile::default());
    let id = session.submit("hello?").await.unwrap();
    let (_, end) = run_turn(&mut session, id).await;

    assert_eq!(
        end,
        SessionChange::TurnFailed {
            message_id: id,
            failure: TurnFailure::RemoteError,
        }
    );
    assert_eq!(session.message(id).unwrap().content, SERVICE_UNAVAILABLE_NOTICE);
    assert_eq!(session.connection_state(), ConnectionState::Error);

    assert_eq!(session.reconnect(), ConnectionState::Connecting);
}

#[tokio::test]
async fn shutdown_stops_everything() {
    let (url, _requests) = spawn_assistant(vec![(vec!["Some text that is still being revealed"], false)]).await;
    let mut session = ChatSession::new(config(url), Profile::default());

    let id = session.submit("Explain SIPs").await.unwrap();
    timeout(SCENARIO_TIMEOUT, async {
        while !matches!(session.next_change().await, SessionChange::Revealed(_)) {}
    })
    .await
    .unwrap();

    session.shutdown();
    let reply = session.message(id).unwrap();
    assert!(!reply.streaming);
    assert_eq!(reply.content, "Some text that is still being revealed");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.input_enabled());

    // Nothing is left to wake the session up.
    let idle = timeout(Duration::from_millis(200), async {
        while session.next_change().await == SessionChange::None {}
    })
    .await;
    assert!(idle.is_err());
}
