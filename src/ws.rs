use crate::client::{SendError, SendMsg, Sender};
use crate::clock::TICK;
use crate::command::Command;
use crate::registry::RegistryError;
use crate::state::AppState;
use common::{decode_value, ValueError};
use futures::{FutureExt, Stream, StreamExt};
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

// Why a session ended. A peer closing the connection is not an error.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] ValueError),
    #[error("Error receiving websocket message: {0}")]
    Transport(String),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("Error encoding snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub async fn client_connection(ws: WebSocket, remote_addr: Option<SocketAddr>, state: AppState) {
    let id = Uuid::new_v4().as_simple().to_string();
    let (client_ws_sender, client_ws_rcv) = ws.split();
    let (client_sender, client_rcv) = mpsc::unbounded_channel();

    let client_rcv = UnboundedReceiverStream::new(client_rcv);
    tokio::task::spawn(client_rcv.forward(client_ws_sender).map(|result| {
        if let Err(e) = result {
            error!("error sending websocket msg: {}", e);
        }
    }));

    // Dropping the sender after the session closes the socket
    let sender = Sender(client_sender);
    if let Err(e) = session(&id, remote_addr, client_ws_rcv, &sender, &state, TICK).await {
        warn!("session {} ended: {}", id, e);
    }
}

/// Runs one connection until either its read loop or its write loop ends.
///
/// The connection is registered for exactly the lifetime of this future; the
/// loop that is still running when the other finishes is dropped at its current
/// await point.
pub async fn session<S, E>(
    id: &str,
    remote_addr: Option<SocketAddr>,
    stream: S,
    sender: &impl SendMsg,
    state: &AppState,
    period: Duration,
) -> Result<(), SessionError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let registration = state.registry.register(id, remote_addr).await?;
    info!("{} connected from {:?}", id, remote_addr);

    let result = tokio::select! {
        biased;
        result = read_loop(id, stream, state) => result,
        result = write_loop(id, sender, state, period) => result,
    };

    registration.release().await;
    result
}

async fn read_loop<S, E>(id: &str, mut stream: S, state: &AppState) -> Result<(), SessionError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(result) = stream.next().await {
        let msg = result.map_err(|e| SessionError::Transport(e.to_string()))?;
        if msg.is_close() {
            debug!("{} sent close", id);
            break;
        }
        if msg.is_ping() || msg.is_pong() {
            continue;
        }
        client_msg(id, &msg, state).await?;
    }
    Ok(())
}

#[tracing::instrument(skip(state))]
async fn client_msg(id: &str, msg: &Message, state: &AppState) -> Result<(), SessionError> {
    let value = decode_value(msg.as_bytes())?;
    info!("received message from {}: {}", id, value);

    let role = state.registry.role_of(id).await;
    match Command::interpret(value, role) {
        Some(command) => command.apply(id, &state.clock, &state.registry).await,
        None => debug!("ignoring {} from {} as {:?}", value, id, role),
    }
    Ok(())
}

async fn write_loop(
    id: &str,
    sender: &impl SendMsg,
    state: &AppState,
    period: Duration,
) -> Result<(), SessionError> {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let snapshot = state.snapshot_for(id).await;
        let msg = serde_json::to_string(&snapshot)?;
        sender.send(&msg)?;
        debug!("sent to {}: {}", id, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Role;
    use crate::clock::Ticker;
    use common::messages::Snapshot;
    use common::Slot;
    use futures::channel::mpsc as test_mpsc;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockSender(Arc<Mutex<Vec<String>>>);

    impl MockSender {
        fn snapshots(&self) -> Vec<Snapshot> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|m| serde_json::from_str(m).unwrap())
                .collect()
        }
    }

    impl SendMsg for MockSender {
        fn send(&self, msg: &str) -> Result<(), SendError> {
            self.0.lock().unwrap().push(msg.to_string());
            Ok(())
        }
    }

    struct FailingSender;
    impl SendMsg for FailingSender {
        fn send(&self, _msg: &str) -> Result<(), SendError> {
            Err(SendError)
        }
    }

    fn text(msg: &str) -> Result<Message, io::Error> {
        Ok(Message::text(msg))
    }

    fn snapshot(time: u32, is_turn: bool) -> Snapshot {
        Snapshot { time, is_turn }
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_turn_and_end_turn() {
        let state = AppState::default();
        let _ticker = Ticker::spawn(state.clock.clone(), TICK);
        let _x = state.registry.register("x", None).await.unwrap();
        let _y = state.registry.register("y", None).await.unwrap();

        client_msg("x", &Message::text("42"), &state).await.unwrap();
        client_msg("y", &Message::text("1"), &state).await.unwrap();
        assert_eq!(state.registry.role_of("x").await, Role::Admin);
        assert_eq!(
            state.registry.role_of("y").await,
            Role::Player(Slot::new(1).unwrap())
        );

        client_msg("x", &Message::text("1"), &state).await.unwrap();
        {
            let clock = state.clock.read().await;
            assert_eq!(clock.time_remaining(), 30);
            assert_eq!(clock.active_turns(), &[1]);
        }

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(state.clock.read().await.time_remaining(), 27);
        assert_eq!(state.snapshot_for("y").await, snapshot(27, true));
        assert_eq!(state.snapshot_for("x").await, snapshot(27, false));

        client_msg("y", &Message::text("99"), &state).await.unwrap();
        {
            let clock = state.clock.read().await;
            assert_eq!(clock.time_remaining(), 30);
            assert_eq!(clock.active_turns(), &[2]);
        }
        assert_eq!(state.snapshot_for("y").await, snapshot(30, false));
    }

    #[tokio::test]
    async fn test_role_claims_are_one_shot() {
        let state = AppState::default();
        let _x = state.registry.register("x", None).await.unwrap();
        let _y = state.registry.register("y", None).await.unwrap();

        client_msg("x", &Message::text("42"), &state).await.unwrap();
        client_msg("x", &Message::text("3"), &state).await.unwrap();
        assert_eq!(state.registry.role_of("x").await, Role::Admin);

        client_msg("y", &Message::text("2"), &state).await.unwrap();
        client_msg("y", &Message::text("42"), &state).await.unwrap();
        client_msg("y", &Message::text("4"), &state).await.unwrap();
        assert_eq!(
            state.registry.role_of("y").await,
            Role::Player(Slot::new(2).unwrap())
        );
        // Player commands never touch the clock beyond ending their own turn
        assert_eq!(state.clock.read().await.active_turns(), &[1]);
    }

    #[tokio::test]
    async fn test_binary_payload_is_decoded() {
        let state = AppState::default();
        let _x = state.registry.register("x", None).await.unwrap();
        client_msg("x", &Message::binary(b"42".to_vec()), &state)
            .await
            .unwrap();
        assert_eq!(state.registry.role_of("x").await, Role::Admin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mulligan_decrements_once_per_tick() {
        let state = AppState::default();
        let _ticker = Ticker::spawn(state.clock.clone(), TICK);
        let _x = state.registry.register("x", None).await.unwrap();
        client_msg("x", &Message::text("42"), &state).await.unwrap();
        client_msg("x", &Message::text("200"), &state).await.unwrap();

        // Offset the sessions from the ticker so snapshot order is deterministic
        time::sleep(Duration::from_millis(500)).await;

        let mut inbound = Vec::new();
        let mut senders = Vec::new();
        let mut handles = Vec::new();
        for num in 1..=4 {
            let (tx, rx) = test_mpsc::unbounded();
            tx.unbounded_send(text(&num.to_string())).unwrap();
            inbound.push(tx);
            let sender = MockSender::default();
            senders.push(sender.clone());
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                session(&format!("p{}", num), None, rx, &sender, &state, TICK).await
            }));
        }

        time::sleep(Duration::from_millis(1200)).await;
        {
            let clock = state.clock.read().await;
            assert_eq!(clock.time_remaining(), 89);
            assert_eq!(clock.active_turns(), &[1, 2, 3, 4]);
        }
        for sender in &senders {
            assert_eq!(
                sender.snapshots(),
                vec![snapshot(90, true), snapshot(89, true)]
            );
        }

        // Player 1 disconnects mid-turn; the others keep ticking
        drop(inbound.remove(0));
        let first = handles.remove(0);
        assert!(first.await.unwrap().is_ok());
        assert!(!state.registry.contains("p1").await);
        assert_eq!(state.registry.len().await, 4);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(state.clock.read().await.time_remaining(), 88);
        assert_eq!(senders[0].snapshots().len(), 2);
        for sender in &senders[1..] {
            assert_eq!(sender.snapshots().last(), Some(&snapshot(88, true)));
        }

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_decode_error_ends_session() {
        let state = AppState::default();
        let sender = MockSender::default();
        let stream = futures::stream::iter(vec![text("hello")]);
        let result = session("a", None, stream, &sender, &state, TICK).await;
        assert!(matches!(result, Err(SessionError::Decode(_))));
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_integer_is_ignored() {
        let state = AppState::default();
        let sender = MockSender::default();
        let (tx, rx) = test_mpsc::unbounded();
        tx.unbounded_send(text("99999999999999999999")).unwrap();
        tx.unbounded_send(text("-99999999999999999999")).unwrap();
        tx.unbounded_send(text("42")).unwrap();
        let handle = {
            let state = state.clone();
            let sender = sender.clone();
            tokio::spawn(async move { session("a", None, rx, &sender, &state, TICK).await })
        };

        time::sleep(Duration::from_millis(100)).await;
        assert!(state.registry.contains("a").await);
        assert_eq!(state.registry.role_of("a").await, Role::Admin);

        drop(tx);
        assert!(handle.await.unwrap().is_ok());
        assert!(!state.registry.contains("a").await);
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        let state = AppState::default();
        let sender = MockSender::default();
        let stream = futures::stream::iter(vec![Err::<Message, _>(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))]);
        let result = session("a", None, stream, &sender, &state, TICK).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_ends_session() {
        let state = AppState::default();
        let stream = futures::stream::pending::<Result<Message, io::Error>>();
        let result = session("a", None, stream, &FailingSender, &state, TICK).await;
        assert!(matches!(result, Err(SessionError::Send(_))));
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_close_frame_ends_session_cleanly() {
        let state = AppState::default();
        let sender = MockSender::default();
        let stream = futures::stream::iter(vec![
            Ok(Message::ping(Vec::new())),
            text("42"),
            Ok(Message::close()),
            text("not reached"),
        ]);
        let result = session("a", None, stream, &sender, &state, TICK).await;
        assert!(result.is_ok());
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_session_is_rejected() {
        let state = AppState::default();
        let _a = state.registry.register("a", None).await.unwrap();
        let sender = MockSender::default();
        let stream = futures::stream::pending::<Result<Message, io::Error>>();
        let result = session("a", None, stream, &sender, &state, TICK).await;
        assert!(matches!(result, Err(SessionError::Registry(_))));
        assert!(sender.snapshots().is_empty());
        assert!(state.registry.contains("a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_session_unregisters() {
        let state = AppState::default();
        let sender = MockSender::default();
        let handle = {
            let state = state.clone();
            let sender = sender.clone();
            tokio::spawn(async move {
                let stream = futures::stream::pending::<Result<Message, io::Error>>();
                session("a", None, stream, &sender, &state, TICK).await
            })
        };
        time::sleep(Duration::from_millis(1500)).await;
        assert!(state.registry.contains("a").await);
        assert_eq!(sender.snapshots().len(), 2);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!state.registry.contains("a").await);
    }
}
